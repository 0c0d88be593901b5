//! # Rendering System
//!
//! GPU-facing resource management for sprites. Everything here talks to the
//! device through [`crate::backend::GraphicsDevice`] and never sees a
//! backend-specific handle.
//!
//! ## Architecture
//!
//! - **ResourcePool**: reference-counted, budget-evicted storage shared by the
//!   texture, vertex and sound managers
//! - **TextureManager**: file, dynamic and render-target textures with lazy
//!   device allocation and video memory collection
//! - **VertexManager**: sprite quads packed into shared vertex buffers
//! - **TransformStack**: world transforms pushed by the scene graph while it
//!   updates

pub mod pool;
pub mod texture_manager;
pub mod transform;
pub mod vertex_manager;

pub use pool::{CollectStats, PoolHandle, ResourceKey, ResourcePool};
pub use texture_manager::{BoundTexture, TextureHandle, TextureInfo, TextureManager, TextureSource};
pub use transform::{TransformGuard, TransformStack};
pub use vertex_manager::{QuadHandle, QuadSlot, VertexManager, VERTICES_PER_BUFFER};
