//! Configuration system
//!
//! Provides configuration management with:
//! - Built-in defaults for every setting
//! - Optional TOML config file (partial files are fine, missing keys keep defaults)
//! - Environment variable overrides
//! - Validation before anything touches the network
//!
//! ## Load Order
//!
//! 1. [`Config::default`]
//! 2. The explicit `--config` path, else the first existing of `./langchurn.toml`,
//!    `./.langchurn.toml`, `<config dir>/langchurn/config.toml`
//! 3. Environment overrides ([`Config::apply_env_overrides`])
//! 4. Command-line flags, applied by the binary
//! 5. [`Config::validate`]

use crate::language::{LanguageClassifier, DEFAULT_EXTENSIONS};
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const MAX_CONCURRENCY: usize = 256;
/// The forge caps `per_page` at this value.
pub const MAX_PER_PAGE: u32 = 100;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Remote API configuration
    pub api: ApiConfig,

    /// Commit fetch pool configuration
    pub fanout: FanOutConfig,

    /// Retry and rate-limit configuration
    pub retry: RetryConfig,

    /// Paths configuration
    pub paths: PathsConfig,

    /// Extension table configuration
    pub languages: LanguagesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub user_agent: String,
    pub per_page: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanOutConfig {
    pub concurrency: usize,
    pub fail_fast: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_directory: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguagesConfig {
    /// Use only `extensions` instead of layering them over the built-in table
    pub replace_defaults: bool,
    pub extensions: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARN".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            user_agent: concat!("langchurn/", env!("CARGO_PKG_VERSION")).to_string(),
            per_page: MAX_PER_PAGE,
            request_timeout_secs: 30,
        }
    }
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            fail_fast: false,
            run_timeout_secs: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_wait_secs: 60,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("logs"),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }
}

impl LanguagesConfig {
    pub fn classifier(&self) -> LanguageClassifier {
        let mut table: HashMap<String, String> = if self.replace_defaults {
            HashMap::new()
        } else {
            DEFAULT_EXTENSIONS
                .iter()
                .map(|(ext, lang)| (ext.to_string(), lang.to_string()))
                .collect()
        };
        table.extend(self.extensions.clone());
        LanguageClassifier::new(table)
    }
}

impl Config {
    /// Load configuration from defaults, file, and environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => Self::discover()?,
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    fn discover() -> Result<Self> {
        let config_paths = [
            PathBuf::from("langchurn.toml"),
            PathBuf::from(".langchurn.toml"),
            dirs::config_dir()
                .map(|d| d.join("langchurn").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &config_paths {
            if path.is_file() {
                info!(config_file = %path.display(), "Loading configuration from file");
                return Self::load_from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        // Logging overrides
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // API overrides
        if let Ok(val) = env::var("LANGCHURN_API_URL") {
            self.api.base_url = val;
        }
        if let Ok(val) = env::var("LANGCHURN_PER_PAGE") {
            self.api.per_page = val.parse().context("Invalid LANGCHURN_PER_PAGE")?;
        }

        // Fan-out overrides
        if let Ok(val) = env::var("LANGCHURN_CONCURRENCY") {
            self.fanout.concurrency = val.parse().context("Invalid LANGCHURN_CONCURRENCY")?;
        }
        if let Ok(val) = env::var("LANGCHURN_RUN_TIMEOUT_SECS") {
            self.fanout.run_timeout_secs =
                Some(val.parse().context("Invalid LANGCHURN_RUN_TIMEOUT_SECS")?);
        }

        // Retry overrides
        if let Ok(val) = env::var("LANGCHURN_MAX_RETRIES") {
            self.retry.max_retries = val.parse().context("Invalid LANGCHURN_MAX_RETRIES")?;
        }

        // Path overrides
        if let Ok(val) = env::var("LANGCHURN_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid API base URL: {}", self.api.base_url))?;

        if self.api.per_page == 0 || self.api.per_page > MAX_PER_PAGE {
            return Err(anyhow::anyhow!(
                "per_page must be between 1 and {}, got {}",
                MAX_PER_PAGE,
                self.api.per_page
            ));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Request timeout must be greater than 0"));
        }

        if self.fanout.concurrency == 0 || self.fanout.concurrency > MAX_CONCURRENCY {
            return Err(anyhow::anyhow!(
                "Concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY,
                self.fanout.concurrency
            ));
        }

        if self.fanout.run_timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("Run timeout must be greater than 0"));
        }

        if self.retry.max_retries > 10 {
            warn!(
                max_retries = self.retry.max_retries,
                "High retry count may stall runs against a throttled API"
            );
        }

        if self.languages.replace_defaults && self.languages.extensions.is_empty() {
            return Err(anyhow::anyhow!(
                "languages.replace_defaults is set but no extensions are configured"
            ));
        }

        if self.logging.output != "console" && !self.paths.log_directory.exists() {
            fs::create_dir_all(&self.paths.log_directory)
                .context("Failed to create log directory")?;
        }

        Ok(())
    }
}
