//! # Engine Configuration
//!
//! Configuration structures for every subsystem of the sprite engine core.
//! All structs are serializable so a game can ship an `engine.toml` (or
//! `engine.ron`) next to its data and load it through the [`Config`] trait.
//!
//! ## Configuration Categories
//!
//! - **File Config**: file cache behaviour and system-memory pressure threshold
//! - **Texture Config**: video memory budget and eviction tuning
//! - **Sound Config**: mixer format and global volumes
//! - **Display Config**: logical screen size and presentation flags

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// # File Manager Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Disable all load caches (files, textures, sounds are reloaded every time)
    pub disable_file_cache: bool,
    /// Free system memory (MB) below which cached files are purged; 0 means total/7
    pub free_sysmem_threshold_mb: u32,
    /// Interval between system-memory checks in milliseconds
    pub check_interval_ms: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            disable_file_cache: false,
            free_sysmem_threshold_mb: 0,
            check_interval_ms: 10_000,
        }
    }
}

/// # Texture Manager Configuration
///
/// Memory figures are in kilobytes, ages in milliseconds since the texture
/// was last bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    /// Percent of the budget to free during a collection (hysteresis)
    pub vmem_hyst: u32,
    /// Hard video memory limit in KB; 0 queries the device
    pub video_memory_limit_kb: u32,
    /// Referenced textures idle longer than this are unloaded by a collection
    pub collect_age_ms: u32,
    /// Unreferenced textures idle longer than this are dropped by periodic updates
    pub idle_unload_age_ms: u32,
    /// Rows per block row shift for block-compressed textures (4x4 blocks)
    pub compression_height_shift: u32,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            vmem_hyst: 20,
            video_memory_limit_kb: 0,
            collect_age_ms: 70,
            idle_unload_age_ms: 10_000,
            compression_height_shift: 2,
        }
    }
}

/// # Sound Manager Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    /// Mixer sample rate
    pub sample_rate: u32,
    /// Mixer bits per sample
    pub bits_per_sample: u16,
    /// Global effect volume multiplier
    pub sound_volume: f32,
    /// Global music volume multiplier
    pub music_volume: f32,
    /// A playing sound not rendered for this long is considered stale
    pub stale_after_ms: u32,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            bits_per_sample: 16,
            sound_volume: 1.0,
            music_volume: 1.0,
            stale_after_ms: 200,
        }
    }
}

/// # Display Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Logical screen width
    pub width: u32,
    /// Logical screen height
    pub height: u32,
    /// Run in a window instead of full screen
    pub windowed: bool,
    /// Wait for vertical retrace when presenting
    pub vertical_sync: bool,
    /// Orthographic zoom factor
    pub zoom: f32,
    /// Clear color as 0xAARRGGBB
    pub clear_color: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            windowed: true,
            vertical_sync: true,
            zoom: 1.0,
            clear_color: 0xFF00_0000,
        }
    }
}

impl DisplayConfig {
    /// Screen centre used as the listener position for sound panning
    pub fn center(&self) -> (f32, f32) {
        (self.width as f32 / 2.0, self.height as f32 / 2.0)
    }
}

/// # Engine Configuration
///
/// Top-level configuration handed to [`crate::Engine::new`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// File manager settings
    pub file: FileConfig,
    /// Texture manager settings
    pub texture: TextureConfig,
    /// Sound manager settings
    pub sound: SoundConfig,
    /// Display settings
    pub display: DisplayConfig,
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable or enable load caching
    pub fn with_file_cache_disabled(mut self, disabled: bool) -> Self {
        self.file.disable_file_cache = disabled;
        self
    }

    /// Set the video memory limit in kilobytes
    pub fn with_video_memory_limit_kb(mut self, limit: u32) -> Self {
        self.texture.video_memory_limit_kb = limit;
        self
    }

    /// Set the collection hysteresis percentage
    pub fn with_vmem_hyst(mut self, percent: u32) -> Self {
        self.texture.vmem_hyst = percent;
        self
    }

    /// Set the display size
    pub fn with_display_size(mut self, width: u32, height: u32) -> Self {
        self.display.width = width;
        self.display.height = height;
        self
    }

    /// Set global volumes
    pub fn with_volumes(mut self, sound: f32, music: f32) -> Self {
        self.sound.sound_volume = sound;
        self.sound.music_volume = music;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.texture.vmem_hyst > 100 {
            return Err(format!("vmem_hyst must be a percentage, got {}", self.texture.vmem_hyst));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err("Display size must be non-zero".to_string());
        }
        if self.display.zoom <= 0.0 {
            return Err(format!("Zoom must be positive, got {}", self.display.zoom));
        }
        if !(8..=32).contains(&self.sound.bits_per_sample) || self.sound.bits_per_sample % 8 != 0 {
            return Err(format!("Unsupported bits per sample: {}", self.sound.bits_per_sample));
        }
        for (name, volume) in [("sound", self.sound.sound_volume), ("music", self.sound.music_volume)] {
            if !(0.0..=1.0).contains(&volume) {
                return Err(format!("{name} volume must be within 0..=1, got {volume}"));
            }
        }
        Ok(())
    }

    /// Load, then validate
    pub fn load_validated(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config = Self::load_or_default(path)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}
