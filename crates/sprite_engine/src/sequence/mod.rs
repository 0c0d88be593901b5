//! # Sequences
//!
//! Everything a scene object can draw: single images, frame animations
//! (resident or streamed, optionally with frame-bound sounds) and debug
//! primitives.
//!
//! ## Organization
//!
//! - **Animation**: the [`Playback`] frame state machine and [`SequenceFlags`]
//! - **SoundTrack**: sounds bound to frame indices
//! - **Manager**: the [`SequenceManager`] arena and render queue

pub mod animation;
pub mod manager;
pub mod sound_track;

pub use animation::{Playback, SequenceFlags};
pub use manager::{
    FrameAnimation, Outline, OutlineMode, Sequence, SequenceId, SequenceKind, SequenceManager, SequenceResources,
    SpriteFrame, StreamedAnimation,
};
pub use sound_track::SoundTrack;
