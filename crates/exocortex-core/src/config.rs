use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_TODAY_FORMAT: &str = "%B %d %Y";
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;
const DATABASE_FILE: &str = "exocortex.db";

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Serde(serde_json::Error),
    ProjectDir,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "{err}"),
            ConfigError::Serde(err) => write!(f, "invalid config file: {err}"),
            ConfigError::ProjectDir => write!(f, "no config directory for this platform"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExoConfig {
    /// Explicit database location; the platform data directory is used when unset.
    pub database_path: Option<PathBuf>,
    pub busy_timeout_ms: u32,
    /// chrono format string used to name the "today" tag.
    pub today_format: String,
    pub log_filter: Option<String>,
}

impl Default for ExoConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            today_format: DEFAULT_TODAY_FORMAT.to_string(),
            log_filter: None,
        }
    }
}

pub struct ConfigStore {
    config_path: PathBuf,
    data_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(config_path: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_path,
            data_dir,
        }
    }

    pub fn default_store() -> Result<Self, ConfigError> {
        let project_dirs = ProjectDirs::from("app", "exocortex", "Exocortex")
            .ok_or(ConfigError::ProjectDir)?;
        Ok(Self::new(
            project_dirs.config_dir().join("config.json"),
            project_dirs.data_dir().to_path_buf(),
        ))
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    pub fn load(&self) -> Result<ExoConfig, ConfigError> {
        if !self.config_path.exists() {
            return Ok(ExoConfig::default());
        }
        let raw = fs::read_to_string(&self.config_path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, config: &ExoConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(config)?;
        fs::write(&self.config_path, data)?;
        Ok(())
    }

    pub fn database_path(&self, config: &ExoConfig) -> PathBuf {
        config
            .database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(DATABASE_FILE))
    }
}
