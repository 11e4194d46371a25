//! Configuration.
//!
//! Read from `~/.config/tributary/config.toml` at startup. A missing
//! file means defaults; a file that exists but fails to parse is an
//! error. Missing fields fall back to their defaults.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_SYNC_BATCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Override for the database location. Defaults to the platform
    /// data directory.
    pub database_path: Option<PathBuf>,
    /// Account the store writes under when no sync service is involved.
    pub account_id: String,
    /// Maximum rows a single ledger claim hands to an upload pass.
    pub sync_batch_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            account_id: "local".into(),
            sync_batch_limit: DEFAULT_SYNC_BATCH_LIMIT,
        }
    }
}

impl Config {
    /// Load configuration from the default path, creating a commented
    /// default file on first run.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;
        Self::parse(&content, config_path)
    }

    fn parse(content: &str, path: PathBuf) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse { path, source: e })
    }

    /// `~/.config/tributary/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("tributary").join("config.toml"))
    }

    fn create_default_config(path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;
        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
        Ok(())
    }

    fn default_config_content() -> String {
        r#"# Tributary configuration
#
# database_path: where the article database lives. Defaults to the
# platform data directory when unset.
# database_path = "/path/to/tributary.db"

# Account the store writes under.
account_id = "local"

# Maximum pending status changes claimed per sync upload pass.
sync_batch_limit = 100
"#
        .to_string()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not find the user config directory")]
    NoConfigDir,

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
