//! Configuration for the webhook intake service.
//!
//! Loads configuration from TOML files with environment variable
//! substitution.
//!
//! # Example
//!
//! ```toml
//! [webhook]
//! root_secret = "${HOOKFOLD_ROOT_SECRET}"
//!
//! [aggregation]
//! timeout_ms = 1000
//!
//! [delivery]
//! mode = "http"
//! url = "${HOOKFOLD_RENDERER_URL}"
//! ```

use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::aggregation::DEFAULT_WINDOW;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,
}

/// Listen address configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// Secrets for verifying inbound deliveries
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    /// Root secret every per-subscription secret is derived from.
    #[serde(default)]
    pub root_secret: String,

    /// Secret for the shared intake route; absent disables that route.
    #[serde(default)]
    pub global_secret: Option<String>,
}

/// Burst-coalescing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AggregationConfig {
    /// Quiet window in milliseconds. Negative disables coalescing.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> i64 {
    DEFAULT_WINDOW.as_millis() as i64
}

impl AggregationConfig {
    /// Coalescing window, or `None` when disabled by a negative timeout.
    pub fn window(&self) -> Option<Duration> {
        if self.timeout_ms < 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms as u64))
        }
    }
}

/// Subscription persistence configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// Directory for the subscription file; absent keeps everything
    /// in memory only.
    #[serde(default)]
    pub data_dir: Option<String>,
}

/// Notice delivery configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    /// "log" (default) or "http"
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Rendering service endpoint, required for "http" mode.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_delivery_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            url: None,
            timeout_ms: default_delivery_timeout_ms(),
            retries: default_retries(),
        }
    }
}

fn default_mode() -> String {
    "log".to_string()
}

fn default_delivery_timeout_ms() -> u64 {
    10000
}

fn default_retries() -> u32 {
    2
}

impl Config {
    /// Load configuration from the default path or HOOKFOLD_CONFIG env var.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var("HOOKFOLD_CONFIG").unwrap_or_else(|_| "config/hookfold.toml".to_string());

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let content = substitute_env_vars(&content);

        debug!("Parsing TOML configuration");
        let config: Config = toml::from_str(&content)?;

        config.validate()?;

        info!(
            aggregation_ms = config.aggregation.timeout_ms,
            delivery = %config.delivery.mode,
            global_intake = config.webhook.global_secret.is_some(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.delivery.mode != "log" && self.delivery.mode != "http" {
            return Err(ConfigError::ValidationError(format!(
                "Delivery mode must be 'log' or 'http', got '{}'",
                self.delivery.mode
            )));
        }

        if self.delivery.mode == "http" {
            let url = match &self.delivery.url {
                Some(url) => url,
                None => return Err(ConfigError::MissingField("delivery.url".to_string())),
            };

            // Check for unsubstituted env vars
            if url.contains("${") {
                warn!(
                    url = %url,
                    "Delivery URL contains unsubstituted environment variable"
                );
            }

            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::ValidationError(
                    "Delivery URL must start with http:// or https://".to_string(),
                ));
            }
        }

        if self.webhook.root_secret.contains("${") {
            warn!("Root secret contains unsubstituted environment variable");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                caps[0].to_string()
            }
        }
    })
    .to_string()
}
