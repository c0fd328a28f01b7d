//! Configuration management for xdna-graph.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (XDNA_GRAPH_DEVICE_INDEX, XDNA_GRAPH_XCLBIN_DIR)
//! 2. Project-local config file (`./xdna-graph.toml`)
//! 3. User config file (`~/.config/xdna-graph/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # xdna-graph.toml
//!
//! # Device opened by Device::open_default() and by C callers passing
//! # the default-device sentinel index
//! device_index = 0
//!
//! # Directory a driver backend may search when resolving a hardware
//! # image by UUID
//! xclbin_dir = "/lib/firmware/amdnpu"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// xdna-graph configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Index of the device used when none is named explicitly.
    pub device_index: Option<u32>,

    /// Directory searched by driver backends when resolving a hardware
    /// image by UUID.
    pub xclbin_dir: Option<String>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `xdna-graph.toml`
    /// 3. User config `~/.config/xdna-graph/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Get the default device index, 0 when unset.
    pub fn device_index(&self) -> u32 {
        self.device_index.unwrap_or(0)
    }

    /// Get the hardware-image search directory, if configured.
    pub fn xclbin_dir(&self) -> Option<&str> {
        self.xclbin_dir.as_deref()
    }

    /// Load user configuration from ~/.config/xdna-graph/config.toml
    fn load_user_config() -> Option<Self> {
        let config_dir = dirs::config_dir()?;
        let config_path = config_dir.join("xdna-graph").join("config.toml");
        Self::load_from_file(&config_path)
    }

    /// Load project-local configuration from ./xdna-graph.toml
    fn load_local_config() -> Option<Self> {
        let local_path = Path::new("xdna-graph.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("xdna-graph.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.device_index.is_some() {
            self.device_index = other.device_index;
        }
        if other.xclbin_dir.is_some() {
            self.xclbin_dir = other.xclbin_dir;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(index) = std::env::var("XDNA_GRAPH_DEVICE_INDEX") {
            match index.parse() {
                Ok(index) => {
                    log::info!("Using XDNA_GRAPH_DEVICE_INDEX from environment: {}", index);
                    self.device_index = Some(index);
                }
                Err(_) => {
                    log::warn!("Ignoring non-numeric XDNA_GRAPH_DEVICE_INDEX: {}", index);
                }
            }
        }
        if let Ok(dir) = std::env::var("XDNA_GRAPH_XCLBIN_DIR") {
            log::info!("Using XDNA_GRAPH_XCLBIN_DIR from environment: {}", dir);
            self.xclbin_dir = Some(dir);
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("xdna-graph").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# xdna-graph configuration
# Place this file at ~/.config/xdna-graph/config.toml or ./xdna-graph.toml

# Device opened when no index is named explicitly
device_index = 0

# Directory a driver backend may search when resolving a hardware image
# xclbin_dir = "/lib/firmware/amdnpu"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.device_index(), 0);
        assert!(config.xclbin_dir().is_none());
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            device_index: Some(1),
            xclbin_dir: None,
        };

        let overlay = Config {
            device_index: None,
            xclbin_dir: Some("/overlay/firmware".to_string()),
        };

        base.merge(overlay);

        // device_index unchanged (overlay was None)
        assert_eq!(base.device_index, Some(1));
        // xclbin_dir set from overlay
        assert_eq!(base.xclbin_dir.as_deref(), Some("/overlay/firmware"));
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.device_index, Some(0));
    }
}
