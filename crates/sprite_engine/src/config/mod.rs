//! Loading and saving settings files
//!
//! The file extension picks the format: `.toml` or `.ron`.

use std::path::Path;

pub use serde::{Deserialize, Serialize};

/// File formats a configuration can be stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML document
    Toml,
    /// Rusty Object Notation document
    Ron,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Settings that round-trip through a TOML or RON file
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Parse `contents` as `format`
    fn from_str_as(contents: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        match format {
            ConfigFormat::Toml => toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string())),
            ConfigFormat::Ron => ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Render as `format` text
    fn to_string_as(&self, format: ConfigFormat) -> Result<String, ConfigError> {
        match format {
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
            }
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string())),
        }
    }

    /// Read and parse `path`
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;
        Self::from_str_as(&contents, format)
    }

    /// Like [`Config::load_from_file`], but a missing file yields the defaults
    fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            log::info!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write to `path` in the format its extension names
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = self.to_string_as(ConfigFormat::from_path(path)?)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Why a settings file could not be used
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("settings file access failed: {0}")]
    Io(#[from] std::io::Error),
    /// Text is not valid for the format
    #[error("malformed settings: {0}")]
    Parse(String),
    /// Values could not be rendered
    #[error("cannot write settings: {0}")]
    Serialize(String),
    /// Extension is neither `.toml` nor `.ron`
    #[error("unknown settings format: {0}")]
    UnsupportedFormat(String),
    /// Parsed values are out of range
    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("engine.toml")).ok(), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_path(Path::new("engine.ron")).ok(), Some(ConfigFormat::Ron));
        assert!(matches!(
            ConfigFormat::from_path(Path::new("engine.ini")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
