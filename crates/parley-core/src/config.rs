use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};

/// Environment variable overriding the intent classifier endpoint.
pub const ENV_CLASSIFIER_URL: &str = "RASA_NLU_URL";
/// Environment variable overriding the exchange log directory.
pub const ENV_LOG_DIR: &str = "LOG_DIR";
/// Environment variable overriding the generation endpoint.
pub const ENV_GENERATION_URL: &str = "PARLEY_GENERATION_URL";
/// Environment variable holding the generation basic-auth user.
pub const ENV_GENERATION_USER: &str = "PARLEY_GENERATION_USER";
/// Environment variable holding the generation basic-auth password.
pub const ENV_GENERATION_PASSWORD: &str = "PARLEY_GENERATION_PASSWORD";

/// Top-level configuration for Parley.
///
/// Loaded from `~/.parley/config.toml` by default, then overlaid with
/// environment overrides via [`ParleyConfig::apply_env_overrides`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub exchange_log: ExchangeLogConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ParleyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary lookup (the process environment in
    /// production, a map in tests). Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_CLASSIFIER_URL) {
            self.classifier.url = url;
        }
        if let Some(dir) = get(ENV_LOG_DIR) {
            self.exchange_log.log_dir = dir;
        }
        if let Some(url) = get(ENV_GENERATION_URL) {
            self.generation.url = url;
        }
        if let Some(user) = get(ENV_GENERATION_USER) {
            self.generation.username = Some(user);
        }
        if let Some(password) = get(ENV_GENERATION_PASSWORD) {
            self.generation.password = Some(password);
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// HTTP port for `parley serve`.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            port: 5000,
        }
    }
}

/// Intent classifier (NLU) endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Parse endpoint of the NLU service.
    pub url: String,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5005/model/parse".to_string(),
            timeout_secs: 10,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Streaming text-generation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Streaming generate endpoint.
    pub url: String,
    /// HTTP basic-auth user. Auth is only sent when this is set.
    pub username: Option<String>,
    /// HTTP basic-auth password.
    pub password: Option<String>,
    /// TCP/TLS connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Maximum idle time between two upstream chunks, in seconds.
    pub chunk_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/generate_stream".to_string(),
            username: None,
            password: None,
            connect_timeout_secs: 10,
            chunk_timeout_secs: 60,
        }
    }
}

impl GenerationConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }
}

/// Append-only exchange log destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeLogConfig {
    /// Directory holding the log file. Created on first write.
    pub log_dir: String,
    /// File name inside `log_dir`.
    pub file_name: String,
}

impl Default for ExchangeLogConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            file_name: "chat_log.text".to_string(),
        }
    }
}

impl ExchangeLogConfig {
    /// Full path of the log file.
    pub fn path(&self) -> PathBuf {
        Path::new(&self.log_dir).join(&self.file_name)
    }
}
