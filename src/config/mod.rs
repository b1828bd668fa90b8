//! Application configuration.
//!
//! Aggregates the settings for both halves of the pipeline into a single
//! Config struct that can be loaded from YAML files or environment
//! variables.

use std::time::Duration;

use serde::Deserialize;

use crate::resilience::{CircuitBreaker, RetryConfig};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "ORDERFLOW_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "ORDERFLOW";
/// Environment variable for the broker bootstrap address.
pub const KAFKA_BOOTSTRAP_ENV_VAR: &str = "KAFKA_BOOTSTRAP_SERVERS";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event log connection and topic settings.
    pub messaging: MessagingConfig,
    /// Client-credentials settings for the products service.
    pub auth: AuthConfig,
    /// Products service HTTP endpoint.
    pub products_api: ProductsApiConfig,
    /// Retry and circuit-breaker settings for outbound calls.
    pub resilience: ResilienceConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `ORDERFLOW_CONFIG` environment variable (if set)
    /// 4. Environment variables with `ORDERFLOW` prefix
    /// 5. `KAFKA_BOOTSTRAP_SERVERS` (recognized unprefixed for deployments
    ///    that already export it)
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let loaded = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let mut config: Config = loaded
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        if let Ok(servers) = std::env::var(KAFKA_BOOTSTRAP_ENV_VAR) {
            config.messaging.bootstrap_servers = servers;
        }

        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

/// Event log configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Broker bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Topic carrying order-placement facts.
    pub topic: String,
    /// Consumer group shared by inventory service instances.
    pub group_id: String,
    /// Bound on the wait for broker acknowledgment of a publish, in seconds.
    pub ack_timeout_secs: u64,
}

impl MessagingConfig {
    /// Publish acknowledgment bound as a duration.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            topic: crate::bus::ORDERS_TOPIC.to_string(),
            group_id: "products-service-group".to_string(),
            ack_timeout_secs: 10,
        }
    }
}

/// Client-credentials grant configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OpenID Connect authority base URL.
    pub authority: String,
    /// Client identifier for the client-credentials grant.
    pub client_id: String,
    /// Client secret for the client-credentials grant.
    pub client_secret: String,
    /// Audience the issued token must target.
    pub audience: String,
    /// A token with less than this many seconds of validity left is
    /// refreshed before use.
    pub refresh_buffer_secs: u64,
}

impl AuthConfig {
    /// Refresh buffer as a duration.
    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authority: "http://localhost:8080/realms/orderflow".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            audience: "products-api".to_string(),
            refresh_buffer_secs: 30,
        }
    }
}

/// Products service endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProductsApiConfig {
    /// Base URL of the products service.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl ProductsApiConfig {
    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProductsApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Retry and circuit-breaker configuration for the product lookup call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Maximum retry attempts after the initial call.
    pub retry_max_attempts: u32,
    /// Base backoff delay in seconds; attempt n waits base * 2^n.
    pub retry_base_secs: u64,
    /// Consecutive qualifying failures before the circuit opens.
    pub breaker_failure_threshold: u32,
    /// How long an open circuit rejects calls before probing, in seconds.
    pub breaker_open_secs: u64,
}

impl ResilienceConfig {
    /// Build the retry policy from this configuration.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            base_delay: Duration::from_secs(self.retry_base_secs),
            max_delay: Duration::from_secs(30),
            max_retries: self.retry_max_attempts,
        }
    }

    /// Build the circuit breaker from this configuration.
    pub fn breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(
            self.breaker_failure_threshold,
            Duration::from_secs(self.breaker_open_secs),
        )
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry_max_attempts: 3,
            retry_base_secs: 2,
            breaker_failure_threshold: 5,
            breaker_open_secs: 30,
        }
    }
}
