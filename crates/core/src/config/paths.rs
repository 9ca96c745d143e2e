//! Config path resolution
//!
//! Everything lives under one application data directory:
//!
//! ```text
//! <base>/core.toml            framework settings
//! <base>/config.json          "default" profile
//! <base>/config.<name>.json   named profiles
//! <base>/unihook.log          optional log file
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::{ConfigError, ConfigResult};

/// Environment variable overriding the data directory
pub const CONFIG_DIR_ENV: &str = "UNIHOOK_CONFIG_DIR";

/// Directory name under the platform config dir
const APP_DIR_NAME: &str = "Unihook";

/// Name of the profile stored in `config.json`
pub const DEFAULT_PROFILE: &str = "default";

/// Returns the application data directory.
///
/// Resolution order: `dir_override`, then `$UNIHOOK_CONFIG_DIR`, then
/// `<platform config dir>/Unihook` (`%APPDATA%\Unihook` on Windows).
pub fn base_dir(dir_override: Option<&Path>) -> ConfigResult<PathBuf> {
    if let Some(dir) = dir_override {
        return Ok(dir.to_path_buf());
    }

    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or(ConfigError::NoConfigDirectory)
}

/// Returns the core framework config path.
///
/// Path: `<base>/core.toml`
pub fn core_config_path(base: &Path) -> PathBuf {
    base.join("core.toml")
}

/// Returns the log file path.
///
/// Path: `<base>/unihook.log`
pub fn log_file_path(base: &Path) -> PathBuf {
    base.join("unihook.log")
}

/// Returns the JSON document path for a profile.
pub fn profile_file(base: &Path, profile: &str) -> PathBuf {
    if profile == DEFAULT_PROFILE {
        base.join("config.json")
    } else {
        base.join(format!("config.{}.json", profile))
    }
}

/// Profile name for a file in the data directory, if it is a profile document
pub fn profile_from_file_name(file_name: &str) -> Option<String> {
    if file_name == "config.json" {
        return Some(DEFAULT_PROFILE.to_string());
    }

    let name = file_name.strip_prefix("config.")?.strip_suffix(".json")?;
    if name.is_empty() || name.contains('.') {
        return None;
    }
    Some(name.to_string())
}

/// Appends `suffix` to the full file name: `config.json` -> `config.json.backup`
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
