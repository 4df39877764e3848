//! Configuration management for protolens
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (protolens.toml)
//! - Environment variables (PROTOLENS__*)
//!
//! ## Example config file (protolens.toml):
//! ```toml
//! [store]
//! dir = "./.protolens"
//!
//! [decoder]
//! max_depth = 64
//! unknown_ratio = 0.5
//! auto_match = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtolensConfig {
    /// Snapshot storage
    #[serde(default)]
    pub store: StoreConfig,

    /// Decoder and auto-match tuning
    #[serde(default)]
    pub decoder: DecoderConfig,
}

/// Where registry snapshots live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Deepest message nesting the decoder follows
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Share of unknown or conflicting bytes above which a candidate is
    /// treated as mostly unknown
    #[serde(default = "default_unknown_ratio")]
    pub unknown_ratio: f64,

    /// Fall back to auto-match when no mapping covers a URL
    #[serde(default = "default_true")]
    pub auto_match: bool,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(".protolens")
}

fn default_max_depth() -> usize {
    64
}

fn default_unknown_ratio() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            unknown_ratio: default_unknown_ratio(),
            auto_match: true,
        }
    }
}

impl ProtolensConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["protolens.toml", ".protolens.toml", "config/protolens.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "protolens", "protolens") {
            let xdg_config = dirs.config_dir().join("protolens.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("PROTOLENS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Store directory, resolved against the working directory
    pub fn store_dir(&self) -> PathBuf {
        if self.store.dir.is_absolute() {
            self.store.dir.clone()
        } else {
            std::env::current_dir().unwrap_or_default().join(&self.store.dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProtolensConfig::default();
        assert_eq!(config.decoder.max_depth, 64);
        assert!(config.decoder.auto_match);
        assert_eq!(config.store.dir, PathBuf::from(".protolens"));
    }

    #[test]
    fn test_serialize_config() {
        let config = ProtolensConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[decoder]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[decoder]\nmax_depth = 8\n").unwrap();
        let config = ProtolensConfig::load_from(path.to_str()).unwrap();
        assert_eq!(config.decoder.max_depth, 8);
        assert_eq!(config.decoder.unknown_ratio, 0.5);
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.toml");
        let mut config = ProtolensConfig::default();
        config.decoder.auto_match = false;
        config.save(path.to_str().unwrap()).unwrap();
        let loaded = ProtolensConfig::load_from(path.to_str()).unwrap();
        assert!(!loaded.decoder.auto_match);
    }
}
