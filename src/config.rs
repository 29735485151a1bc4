use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::schema::{DB_NAME, DB_VERSION};
use crate::error::{AppError, Result};
use crate::notify::UPDATE_CHANNEL;
use crate::store::{DatabaseConfig, DatabaseLocation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_db_name")]
    pub db_name: String,

    #[serde(default = "default_db_version")]
    pub db_version: u32,

    #[serde(default = "default_update_channel")]
    pub update_channel: String,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("backlog-keeper");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("bookmarks.db").to_string_lossy().to_string()
}

fn default_db_name() -> String {
    DB_NAME.to_string()
}

fn default_db_version() -> u32 {
    DB_VERSION
}

fn default_update_channel() -> String {
    UPDATE_CHANNEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            db_name: default_db_name(),
            db_version: default_db_version(),
            update_channel: default_update_channel(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Reads `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("backlog-keeper")
            .join("config.toml")
    }

    pub fn database(&self) -> DatabaseConfig {
        let location = if self.db_path == ":memory:" {
            DatabaseLocation::Memory
        } else {
            DatabaseLocation::File(PathBuf::from(&self.db_path))
        };
        DatabaseConfig {
            name: self.db_name.clone(),
            version: self.db_version,
            location,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.db_version == 0 {
            return Err(AppError::Config("db_version must be at least 1".into()));
        }
        if self.update_channel.trim().is_empty() {
            return Err(AppError::Config("update_channel must not be empty".into()));
        }
        Ok(())
    }
}
