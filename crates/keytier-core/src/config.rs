use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KeytierError, KeytierResult};
use crate::types::Tier;

/// Top-level configuration (loaded from keytier.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeytierConfig {
    pub store: StoreConfig,
    pub log: LogConfig,
}

impl KeytierConfig {
    pub fn from_toml(text: &str) -> KeytierResult<Self> {
        toml::from_str(text).map_err(|e| KeytierError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the slot documents (created if missing)
    pub dir: PathBuf,
    /// Master slot document, relative to `dir`
    pub master_file: PathBuf,
    /// User slot document, relative to `dir`
    pub user_file: PathBuf,
}

impl StoreConfig {
    pub fn slot_path(&self, tier: Tier) -> PathBuf {
        let file: &Path = match tier {
            Tier::Master => &self.master_file,
            Tier::User => &self.user_file,
        };
        self.dir.join(file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("keys"),
            master_file: PathBuf::from("master_key.json"),
            user_file: PathBuf::from("user_keys.json"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
