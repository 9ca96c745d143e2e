//! Configuration system for Unihook
//!
//! Two layers live here:
//! - [`CoreConfig`]: framework settings in TOML (`core.toml`), loaded once at attach
//! - [`ConfigStore`]: the per-profile JSON document every feature field reads and writes
//!
//! # Example
//!
//! ```ignore
//! use unihook_core::config::{paths, ConfigStore, CoreConfig};
//!
//! let dir = paths::base_dir(None)?;
//! let core = CoreConfig::load(&dir).unwrap_or_default();
//!
//! let store = ConfigStore::new(dir, bus.clone());
//! store.load();
//! let fov: f64 = store.get_feature_value("Player", "Fov", "value", 90.0);
//! ```

pub mod document;
pub mod paths;
mod store;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use store::{ConfigStore, LoadOutcome};

/// Configuration system errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or serialize a JSON profile document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to parse TOML content
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize config to TOML
    #[error("Failed to serialize config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Could not determine the application data directory
    #[error("Config directory not available - no override, env var, or platform config dir")]
    NoConfigDirectory,

    #[error("Invalid profile name: '{0}'")]
    InvalidProfileName(String),

    #[error("Profile '{0}' already exists")]
    ProfileExists(String),

    #[error("Profile '{0}' does not exist")]
    ProfileNotFound(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Module + offset of a native function to hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookTarget {
    /// Module name, e.g. `UnityPlayer.dll`
    pub module: String,
    /// Offset from the module base
    pub offset: usize,
}

/// Core framework configuration.
///
/// Loaded from `<config dir>/core.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Config version for future migration support
    pub version: u32,

    /// Enable debug logging
    pub debug: bool,

    /// Log filter directive used when `UNIHOOK_LOG` is unset
    pub log_level: String,

    /// Also write logs to `<config dir>/unihook.log`
    pub log_to_file: bool,

    /// Debounce applied to field-triggered saves
    pub save_debounce_ms: u64,

    /// Location of `MonoBehaviour::CallUpdateMethod`
    pub update_hook: Option<HookTarget>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            version: 1,
            debug: false,
            log_level: "info".to_string(),
            log_to_file: false,
            save_debounce_ms: 250,
            update_hook: None,
        }
    }
}

impl CoreConfig {
    /// Load core config from `dir`, creating default if missing.
    pub fn load(dir: &Path) -> ConfigResult<Self> {
        let path = paths::core_config_path(dir);

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::debug!("Loaded core config from {:?}", path);
            Ok(config)
        } else {
            let default = Self::default();
            default.save(dir)?;
            tracing::info!("Created default core config at {:?}", path);
            Ok(default)
        }
    }

    /// Save core config to `dir`.
    pub fn save(&self, dir: &Path) -> ConfigResult<()> {
        let path = paths::core_config_path(dir);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        tracing::debug!("Saved core config to {:?}", path);
        Ok(())
    }

    /// Reload core config from `dir`.
    pub fn reload(&mut self, dir: &Path) -> ConfigResult<()> {
        let path = paths::core_config_path(dir);
        let content = std::fs::read_to_string(&path)?;
        *self = toml::from_str(&content)?;
        tracing::debug!("Reloaded core config from {:?}", path);
        Ok(())
    }

    /// Effective log filter: `debug` forces at least debug level
    pub fn log_filter(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }

    pub fn save_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.save_debounce_ms)
    }

    pub fn log_file(&self, dir: &Path) -> Option<PathBuf> {
        self.log_to_file.then(|| paths::log_file_path(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_config_default() {
        let config = CoreConfig::default();
        assert_eq!(config.version, 1);
        assert!(!config.debug);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.save_debounce_ms, 250);
        assert!(config.update_hook.is_none());
    }

    #[test]
    fn test_core_config_serialize() {
        let config = CoreConfig {
            version: 2,
            debug: true,
            update_hook: Some(HookTarget {
                module: "UnityPlayer.dll".to_string(),
                offset: 0x1234,
            }),
            ..Default::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("version = 2"));
        assert!(toml_str.contains("debug = true"));
        assert!(toml_str.contains("[update_hook]"));
        assert!(toml_str.contains("module = \"UnityPlayer.dll\""));
    }

    #[test]
    fn test_core_config_partial_file_uses_defaults() {
        let config: CoreConfig = toml::from_str("log_to_file = true").unwrap();
        assert!(config.log_to_file);
        assert_eq!(config.save_debounce_ms, 250);
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn test_core_config_load_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::load(dir.path()).unwrap();
        assert_eq!(config.version, 1);
        assert!(paths::core_config_path(dir.path()).exists());
    }

    #[test]
    fn test_core_config_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CoreConfig::load(dir.path()).unwrap();

        std::fs::write(
            paths::core_config_path(dir.path()),
            "debug = true\nsave_debounce_ms = 10\n",
        )
        .unwrap();

        config.reload(dir.path()).unwrap();
        assert!(config.debug);
        assert_eq!(config.log_filter(), "debug");
        assert_eq!(config.save_debounce().as_millis(), 10);
    }

    #[test]
    fn test_core_config_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(paths::core_config_path(dir.path()), "version = [").unwrap();
        assert!(matches!(
            CoreConfig::load(dir.path()),
            Err(ConfigError::TomlParse(_))
        ));
    }
}
