//! # Audio System
//!
//! Sound playback for scene objects and animated sequences.
//!
//! ## Organization
//!
//! - **Backend**: the [`AudioBackend`] buffer interface and the in-memory
//!   [`NullAudioBackend`]
//! - **SoundManager**: instance lifecycle, render queue, stale detection
//! - **Spatial**: screen-relative pan and distance fade

pub mod backend;
pub mod sound_manager;
pub mod spatial;

pub use backend::{AudioBackend, AudioBuffer, AudioError, NullAudioBackend};
pub use sound_manager::{SoundFlags, SoundId, SoundManager};
pub use spatial::Listener;
