use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_NAMESPACE: &str = "prodboard";
const CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "PRODBOARD";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Remote document store URL. Absent means local-only mode.
    #[serde(default)]
    pub remote_url: Option<String>,

    #[serde(default = "default_remote_max_connections")]
    #[validate(range(min = 1, max = 100))]
    pub remote_max_connections: u32,

    #[serde(default = "default_remote_connect_timeout_secs")]
    pub remote_connect_timeout_secs: u64,

    /// Directory for the local cache. Absent means in-memory.
    #[serde(default)]
    pub local_dir: Option<String>,

    /// Prefix of every local cache key
    #[serde(default = "default_namespace")]
    #[validate(length(min = 1), custom = "validate_namespace")]
    pub storage_namespace: String,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Advance an order to `ready` once all its fragments are completed
    #[serde(default)]
    pub auto_advance_fragments: bool,

    #[serde(default = "default_order_number_attempts")]
    #[validate(range(min = 1, max = 50))]
    pub order_number_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            remote_max_connections: default_remote_max_connections(),
            remote_connect_timeout_secs: default_remote_connect_timeout_secs(),
            local_dir: None,
            storage_namespace: default_namespace(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            event_channel_capacity: default_event_channel_capacity(),
            auto_advance_fragments: false,
            order_number_attempts: default_order_number_attempts(),
        }
    }
}

impl AppConfig {
    /// In-memory, local-only configuration.
    pub fn local_only() -> Self {
        Self::default()
    }

    pub fn has_remote(&self) -> bool {
        self.remote_url
            .as_deref()
            .map_or(false, |url| !url.trim().is_empty())
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_remote_max_connections() -> u32 {
    5
}

fn default_remote_connect_timeout_secs() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_order_number_attempts() -> u32 {
    10
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_namespace(namespace: &str) -> Result<(), ValidationError> {
    if namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        Ok(())
    } else {
        let mut err = ValidationError::new("storage_namespace");
        err.message = Some("Only letters, digits and '-' are allowed".into());
        Err(err)
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter.
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("prodboard={},sea_orm=warn", level));

    let builder = fmt()
        .with_env_filter(EnvFilter::new(filter_directive))
        .with_writer(std::io::stderr);
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{RUN_ENV}.toml)
/// 4. Environment variables (PRODBOARD__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.into());
    load_config_from(CONFIG_DIR, &run_env)
}

pub fn load_config_from(config_dir: &str, run_env: &str) -> Result<AppConfig, AppConfigError> {
    let config = Config::builder()
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("storage_namespace", DEFAULT_NAMESPACE)?
        .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
        .add_source(File::with_name(&format!("{}/{}", config_dir, run_env)).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!(
        environment = %app_config.environment,
        remote = app_config.has_remote(),
        "Configuration loaded successfully"
    );
    Ok(app_config)
}
