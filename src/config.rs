use crate::constants::{DEFAULT_EVENT_CAPACITY, DEFAULT_LOG_LEVEL, DEFAULT_POLL_TIMEOUT};
use crate::player::EngineSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Options applied to every engine instance before initialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_true")]
    pub hardware_acceleration: bool,

    /// Hold the last frame at end of file instead of going idle
    #[serde(default = "default_true")]
    pub keep_open: bool,

    #[serde(default = "default_languages")]
    pub audio_languages: String,

    #[serde(default = "default_languages")]
    pub subtitle_languages: String,

    #[serde(default = "default_cache_size_mb")]
    pub cache_size_mb: u32,

    #[serde(default = "default_cache_backbuffer_mb")]
    pub cache_backbuffer_mb: u32,

    #[serde(default = "default_cache_secs")]
    pub cache_secs: u32,

    #[serde(default)]
    pub verbose_logging: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Minimum engine log level forwarded as events
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Config {
    /// Load the user config, writing the defaults first if there is none.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        info!("Config loaded successfully");
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("reel").join("engine.toml"))
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            hardware_acceleration: true,
            keep_open: true,
            audio_languages: default_languages(),
            subtitle_languages: default_languages(),
            cache_size_mb: default_cache_size_mb(),
            cache_backbuffer_mb: default_cache_backbuffer_mb(),
            cache_secs: default_cache_secs(),
            verbose_logging: false,
        }
    }
}

impl PlaybackConfig {
    /// Engine options in the order they are applied
    pub fn engine_options(&self) -> Vec<(&'static str, String)> {
        let flag = |value: bool| if value { "yes" } else { "no" }.to_string();
        vec![
            ("terminal", flag(self.verbose_logging)),
            (
                "msg-level",
                if self.verbose_logging { "all=debug" } else { "all=info" }.to_string(),
            ),
            (
                "hwdec",
                if self.hardware_acceleration { "auto-safe" } else { "no" }.to_string(),
            ),
            ("keep-open", flag(self.keep_open)),
            ("input-default-bindings", flag(false)),
            ("input-vo-keyboard", flag(false)),
            ("osc", flag(false)),
            ("ytdl", flag(false)),
            ("load-scripts", flag(false)),
            ("alang", self.audio_languages.clone()),
            ("slang", self.subtitle_languages.clone()),
            ("cache", flag(true)),
            ("cache-secs", self.cache_secs.to_string()),
            ("demuxer-max-bytes", format!("{}MiB", self.cache_size_mb)),
            ("demuxer-max-back-bytes", format!("{}MiB", self.cache_backbuffer_mb)),
        ]
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
            log_level: default_log_level(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            poll_timeout: Duration::from_millis(self.poll_timeout_ms.max(1)),
            log_level: self.log_level.clone(),
            event_capacity: self.event_capacity.max(1),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_languages() -> String {
    "eng,en".to_string()
}

fn default_cache_size_mb() -> u32 {
    1500
}

fn default_cache_backbuffer_mb() -> u32 {
    500
}

fn default_cache_secs() -> u32 {
    1800
}

fn default_poll_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT.as_millis() as u64
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}
