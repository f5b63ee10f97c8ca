use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::gesture::SwipeSettings;

const APP_NAME: &str = "magicmail";
const CONFIG_FILE: &str = "config.toml";

/// Swipe tuning, in pixels and milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwipeConfig {
    pub threshold: f32,
    pub exit_offset: f32,
    pub settle_delay_ms: u64,
}

impl Default for SwipeConfig {
    fn default() -> Self {
        Self {
            threshold: 100.0,
            exit_offset: -500.0,
            settle_delay_ms: 200,
        }
    }
}

/// Contents of config.toml. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the mail backend, e.g. http://localhost:8000/api/v1
    pub api_base_url: String,
    /// Account the backend associates with this client
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub page_size: u32,
    /// How many messages to import whenever the view changes
    pub background_import_limit: u32,
    /// How many messages the sync command imports
    pub sync_limit: u32,
    pub notice_duration_ms: u64,
    pub search_debounce_ms: u64,
    pub swipe: SwipeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/v1".to_string(),
            user_id: None,
            page_size: 100,
            background_import_limit: 500,
            sync_limit: 50,
            notice_duration_ms: 4000,
            search_debounce_ms: 500,
            swipe: SwipeConfig::default(),
        }
    }
}

impl Config {
    /// Loads config.toml from the config directory, falling back to defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Failed to write config to {:?}", path))
    }

    /// Remembers the account so later runs don't need `--user`
    pub fn save_user_id(&mut self, user_id: &str) -> Result<()> {
        self.user_id = Some(user_id.to_string());
        ensure_config_dir()?;
        self.save_to(&config_path()?)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            page_size: self.page_size.max(1),
            background_import_limit: self.background_import_limit,
            sync_limit: self.sync_limit,
            notice_duration: Duration::from_millis(self.notice_duration_ms),
        }
    }

    pub fn swipe_settings(&self) -> SwipeSettings {
        SwipeSettings {
            threshold: self.swipe.threshold.abs(),
            exit_offset: self.swipe.exit_offset,
            settle_delay: Duration::from_millis(self.swipe.settle_delay_ms),
        }
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

/// Returns the configuration directory path
pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .context("Failed to determine config directory")
}

/// Returns the path to the config file
pub fn config_path() -> Result<PathBuf> {
    config_dir().map(|p| p.join(CONFIG_FILE))
}

/// Ensures the config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir()?;
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
    }
    Ok(dir)
}
