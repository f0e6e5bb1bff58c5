use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::Deserialize;
use tracing::{Level, info, warn};

use crate::core::persona::Persona;
use crate::core::queue::TaskPriority;

pub const BASE_URL_ENV: &str = "MACHINA_GEMINI_BASE_URL";
const FALLBACK_KEY_ENV: &str = "API_KEY";
/// One day. Finished tasks are never meant to linger longer than that.
const MAX_EVICTION_SECS: u64 = 86_400;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub console: ConsoleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where the values came from. None means built-in defaults.
    #[serde(skip)]
    pub source: Option<PathBuf>,

    /// Values replaced during validation, reported once logging is up.
    #[serde(skip)]
    pub fallbacks: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_image_model")]
    pub image_model: String,

    #[serde(default = "default_search_model")]
    pub search_model: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Seconds a finished task stays listed.
    #[serde(default = "default_eviction_secs")]
    pub eviction_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default = "default_priority")]
    pub default_priority: String,

    #[serde(default = "default_persona")]
    pub persona: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_chat_model() -> String {
    "gemini-3-flash-preview".to_string()
}
fn default_image_model() -> String {
    "gemini-2.5-flash-image".to_string()
}
fn default_search_model() -> String {
    "gemini-3-pro-preview".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_thinking_budget() -> u32 {
    1024
}
fn default_eviction_secs() -> u64 {
    5
}
fn default_sweep_interval() -> u64 {
    500
}
fn default_priority() -> String {
    "medium".to_string()
}
fn default_persona() -> String {
    "general".to_string()
}
fn default_level() -> String {
    "info".to_string()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            image_model: default_image_model(),
            search_model: default_search_model(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout(),
            thinking_budget: default_thinking_budget(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            eviction_secs: default_eviction_secs(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            default_priority: default_priority(),
            persona: default_persona(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

/// `<config_dir>/machina/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("machina").join("config.toml"))
}

impl AppConfig {
    /// Load from `explicit` or the default location, then apply environment
    /// overrides. A missing default file is not an error; a missing explicit
    /// one is. Runs before logging is installed; see [`AppConfig::log_summary`].
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(anyhow!("Config file not found: {:?}", path));
                }
                Self::from_file(path).await?
            }
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path).await?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut config: AppConfig = toml::from_str(&content)
            .map_err(|e| anyhow!("Invalid config {:?}: {}", path, e))?;
        config.source = Some(path.to_path_buf());
        config.validate();
        Ok(config)
    }

    pub fn log_summary(&self) {
        match &self.source {
            Some(path) => info!(
                "Loaded config from {:?}: chat_model={}, persona={}, priority={}",
                path, self.gemini.chat_model, self.console.persona, self.console.default_priority
            ),
            None => info!("No config.toml found, using defaults."),
        }
        for fallback in &self.fallbacks {
            warn!("{}", fallback);
        }
    }

    /// Replace unusable values with defaults instead of refusing to start.
    fn validate(&mut self) {
        if TaskPriority::from_str(&self.console.default_priority).is_err() {
            self.fallbacks.push(format!(
                "Unknown default_priority '{}', using medium",
                self.console.default_priority
            ));
            self.console.default_priority = default_priority();
        }
        if Persona::from_str(&self.console.persona).is_err() {
            self.fallbacks
                .push(format!("Unknown persona '{}', using general", self.console.persona));
            self.console.persona = default_persona();
        }
        if Level::from_str(&self.logging.level).is_err() {
            self.fallbacks
                .push(format!("Unknown log level '{}', using info", self.logging.level));
            self.logging.level = default_level();
        }
        if self.queue.eviction_secs > MAX_EVICTION_SECS {
            self.fallbacks.push(format!(
                "eviction_secs {} is out of range, using 5",
                self.queue.eviction_secs
            ));
            self.queue.eviction_secs = default_eviction_secs();
        }
        if self.queue.sweep_interval_ms == 0 {
            self.fallbacks
                .push("sweep_interval_ms must be positive, using 500".to_string());
            self.queue.sweep_interval_ms = default_sweep_interval();
        }
        if self.gemini.request_timeout_secs == 0 {
            self.fallbacks
                .push("request_timeout_secs must be positive, using 120".to_string());
            self.gemini.request_timeout_secs = default_request_timeout();
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.gemini.base_url = url;
        }
    }

    /// The API key from the configured variable, falling back to `API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_from(|key| std::env::var(key).ok())
    }

    fn api_key_from(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        [self.gemini.api_key_env.as_str(), FALLBACK_KEY_ENV]
            .into_iter()
            .filter_map(lookup)
            .find(|k| !k.trim().is_empty())
    }

    pub fn default_priority(&self) -> TaskPriority {
        self.console
            .default_priority
            .parse()
            .unwrap_or(TaskPriority::Medium)
    }

    pub fn persona(&self) -> Persona {
        self.console.persona.parse().unwrap_or_default()
    }

    pub fn log_level(&self) -> Level {
        self.logging.level.parse().unwrap_or(Level::INFO)
    }

    pub fn eviction_delay(&self) -> chrono::Duration {
        let secs = match self.queue.eviction_secs {
            secs if secs <= MAX_EVICTION_SECS => secs,
            _ => default_eviction_secs(),
        };
        chrono::Duration::seconds(secs as i64)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.queue.sweep_interval_ms)
    }
}
