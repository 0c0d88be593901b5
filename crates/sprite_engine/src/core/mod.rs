//! # Core Engine Module
//!
//! Shared abstractions used by every subsystem.
//!
//! ## Organization
//!
//! - **Config**: Configuration structures for all engine subsystems
//! - **Error**: The engine error taxonomy and result alias

pub mod config;
pub mod error;

pub use config::{Config, ConfigError, DisplayConfig, EngineConfig, FileConfig, SoundConfig, TextureConfig};
pub use error::{EngineError, EngineResult};
