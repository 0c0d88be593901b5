//! # Sprite Engine
//!
//! Core of a 2D sprite game engine: a scene graph of game objects, animated
//! sequences with frame-bound sounds, pooled GPU and audio resources, and
//! region based path following and path finding.
//!
//! ## Features
//!
//! - **Scene Graph**: hierarchical transforms with scoped push/pop
//! - **Sequences**: static, animated and streamed sprites plus debug overlays
//! - **Resource Pools**: deduplicated, reference-counted textures, quads and sounds
//!   with budget-driven eviction
//! - **Regions and Paths**: polygon containment, keypoint speed profiles, A* path finding
//! - **Scripting Hooks**: per-state callbacks injected as plain closures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sprite_engine::prelude::*;
//!
//! struct MyGame;
//!
//! impl Application for MyGame {
//!     fn on_init(&mut self, ctx: &mut EngineContext) -> EngineResult<()> {
//!         let root = GameObject::location("hall").into_ref();
//!         let marker = GameObject::gizmo(&mut ctx.sequences, 16.0, 16.0, Color::WHITE);
//!         root.borrow_mut()?.add_object("marker", marker.into_ref());
//!         ctx.set_root(Some(root));
//!         Ok(())
//!     }
//!
//!     fn on_frame(&mut self, _ctx: &mut EngineContext, _frame: &FrameInput) -> EngineResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     sprite_engine::foundation::logging::init();
//!     let ctx = EngineContext::new(
//!         EngineConfig::default(),
//!         Box::new(HeadlessDevice::new()),
//!         Box::new(NullAudioBackend::new()),
//!         Box::new(DirectoryLoader::new("data")),
//!     )?;
//!     Engine::new(ctx).run(&mut MyGame)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod core;
pub mod config;
pub mod foundation;

// Collaborator boundaries
pub mod assets;
pub mod audio;
pub mod backend;
pub mod script;

// Resources and drawing
pub mod render;
pub mod sequence;

// World
pub mod scene;
pub mod spatial;

// Frame driver
pub mod application;
pub mod engine;
pub mod input;

pub use application::{Application, FrameInput};
pub use core::{EngineConfig, EngineError, EngineResult};
pub use engine::{Engine, EngineContext};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        application::{Application, FrameInput},
        assets::{DirectoryLoader, FileManager, MemoryLoader, ResourceLoader},
        audio::{AudioBackend, NullAudioBackend, SoundId, SoundManager},
        backend::{Color, GraphicsDevice, HeadlessDevice},
        core::{EngineConfig, EngineError, EngineResult},
        engine::{Engine, EngineContext},
        foundation::math::{Mat3, Vec2},
        input::{KeyCode, MouseButtons},
        scene::{GameObject, ObjectKind, ObjectRef, State},
        script::{Hook, ScriptHooks, ScriptValue},
        sequence::{SequenceId, SequenceManager},
        spatial::{KeyPoint, PathFlags, PointContainer},
    };
}
