//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the recordings root folder
pub const ROOT_FOLDER_ENV: &str = "FREC_ROOT_FOLDER";

/// Service configuration, read from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Recordings root folder (session directories, lost quarantine, staging)
    pub root_folder: Option<PathBuf>,
    /// SQLite database file; defaults to `<root_folder>/frec.db`
    pub database_path: Option<PathBuf>,
    pub bind_address: String,
    /// Public path prefix under which session recordings are served
    pub public_recordings_base: String,
    /// Seed recording excluded from the Random evaluation pool; `0` or a
    /// negative id disables the exclusion
    pub placeholder_recording_id: Option<i64>,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_path: None,
            bind_address: "127.0.0.1:5740".to_string(),
            public_recordings_base: "/recs".to_string(),
            placeholder_recording_id: Some(1),
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from an explicit path, or the platform default location.
    ///
    /// A missing file is not an error: defaults are used and a warning is logged.
    /// A file that exists but does not parse is an error.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_file(),
        };

        let Some(path) = path else {
            warn!("No config file location available, using defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!("Config file not found: {} (using defaults)", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config file: {}", path.display());
        Ok(config)
    }

    /// Placeholder recording id, if the exclusion is enabled
    pub fn placeholder_recording(&self) -> Option<i64> {
        self.placeholder_recording_id.filter(|id| *id > 0)
    }

    /// Database path, falling back to `<root>/frec.db`
    pub fn database_path_for(&self, root_folder: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| root_folder.join("frec.db"))
    }
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config value
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config: &ServiceConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// `~/.config/frec/config.toml` (or the platform equivalent)
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("frec").join("config.toml"))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("frec").join("recordings"))
        .unwrap_or_else(|| PathBuf::from("./frec_data/recordings"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = ServiceConfig::from_toml_str("bind_address = \"0.0.0.0:8080\"").unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.public_recordings_base, "/recs");
        assert_eq!(config.placeholder_recording_id, Some(1));
        assert!(config.root_folder.is_none());
    }

    #[test]
    fn test_zero_placeholder_disables_exclusion() {
        let config = ServiceConfig::from_toml_str("placeholder_recording_id = 0").unwrap();
        assert_eq!(config.placeholder_recording(), None);

        let config = ServiceConfig::from_toml_str("placeholder_recording_id = -1").unwrap();
        assert_eq!(config.placeholder_recording(), None);

        assert_eq!(ServiceConfig::default().placeholder_recording(), Some(1));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ServiceConfig::from_toml_str("bind_address = [").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_database_path_defaults_under_root() {
        let config = ServiceConfig::default();
        let root = PathBuf::from("/srv/frec");
        assert_eq!(config.database_path_for(&root), root.join("frec.db"));
    }
}
