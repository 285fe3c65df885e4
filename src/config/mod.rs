//! Service configuration.
//!
//! Settings are layered with the `config` crate: an optional TOML file,
//! then environment variables prefixed with `HOSTWATCH` using `__` as the
//! nesting separator, so `HOSTWATCH__PROMETHEUS__URL` sets `prometheus.url`.
//!
//! ```toml
//! [prometheus]
//! url = "http://localhost:9090"
//!
//! [cache]
//! url = "redis://localhost:6379/0"
//! ttl = "30s"
//!
//! [intervals]
//! host_status = "5s"
//! other_metrics = "15s"
//! push = "2s"
//!
//! [retry]
//! attempts = 3
//! backoff = "500ms"
//! ```

pub mod duration;

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use hostwatch_adapters::prometheus::RetryPolicy;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "HOSTWATCH";

/// Errors from loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or did not match the settings schema.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A setting is present but unusable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),
}

/// Top-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub prometheus: PrometheusSettings,
    pub cache: CacheSettings,
    pub intervals: IntervalSettings,
    pub retry: RetrySettings,
    #[serde(default)]
    pub supervisor: SupervisorSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Maximum concurrent push subscribers; unbounded when absent.
    #[serde(default)]
    pub max_subscribers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_subscribers: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusSettings {
    pub url: String,
    #[serde(default = "default_timeout", deserialize_with = "duration::deserialize")]
    pub timeout: Duration,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_idle_connections")]
    pub max_idle_connections: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Redis URL; required for the redis backend.
    #[serde(default)]
    pub url: Option<String>,
    /// Expiry applied to every snapshot write.
    #[serde(deserialize_with = "duration::deserialize")]
    pub ttl: Duration,
    /// Bound on connecting to the store and on each command.
    #[serde(default = "default_cache_timeout", deserialize_with = "duration::deserialize")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntervalSettings {
    #[serde(deserialize_with = "duration::deserialize")]
    pub host_status: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub other_metrics: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub push: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub attempts: u32,
    #[serde(deserialize_with = "duration::deserialize")]
    pub backoff: Duration,
    #[serde(default)]
    pub strategy: RetryStrategy,
    #[serde(default = "default_max_backoff", deserialize_with = "duration::deserialize")]
    pub max_backoff: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSettings {
    #[serde(default = "default_shutdown_grace", deserialize_with = "duration::deserialize")]
    pub shutdown_grace: Duration,
    #[serde(default = "default_restart_delay", deserialize_with = "duration::deserialize")]
    pub restart_delay: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            shutdown_grace: default_shutdown_grace(),
            restart_delay: default_restart_delay(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_cache_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_max_connections() -> usize {
    100
}

fn default_max_idle_connections() -> usize {
    20
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(1)
}

impl Settings {
    /// Load settings from `path` (if it exists) and the process environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, environment())
    }

    /// Load settings from `path` (if it exists) and the given environment source.
    pub fn load_with(path: &Path, env: Environment) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.prometheus.url.trim().is_empty() {
            return invalid("prometheus.url must not be empty");
        }
        if self.prometheus.max_connections == 0 {
            return invalid("prometheus.max_connections must be at least 1");
        }
        if self.cache.backend == CacheBackend::Redis
            && self.cache.url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            return invalid("cache.url is required for the redis backend");
        }
        if self.cache.ttl.is_zero() {
            return invalid("cache.ttl must be greater than zero");
        }
        if self.cache.timeout.is_zero() {
            return invalid("cache.timeout must be greater than zero");
        }
        if self.intervals.host_status.is_zero() {
            return invalid("intervals.host_status must be greater than zero");
        }
        if self.intervals.other_metrics.is_zero() {
            return invalid("intervals.other_metrics must be greater than zero");
        }
        if self.intervals.push.is_zero() {
            return invalid("intervals.push must be greater than zero");
        }
        if self.retry.attempts == 0 {
            return invalid("retry.attempts must be at least 1");
        }
        if self.server.max_subscribers == Some(0) {
            return invalid("server.max_subscribers must be at least 1 when set");
        }
        Ok(())
    }

    /// The retry policy described by the `retry` section.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.retry.strategy {
            RetryStrategy::Fixed => RetryPolicy::fixed(self.retry.attempts, self.retry.backoff),
            RetryStrategy::Exponential => RetryPolicy::exponential(
                self.retry.attempts,
                self.retry.backoff,
                self.retry.max_backoff,
            ),
        }
    }
}

#[cfg(test)]
impl Settings {
    /// Settings for an in-memory cache and a backend on `url`.
    pub(crate) fn for_tests(url: &str) -> Self {
        Settings {
            server: ServerSettings::default(),
            prometheus: PrometheusSettings {
                url: url.to_string(),
                timeout: Duration::from_millis(500),
                max_connections: 4,
                max_idle_connections: 2,
            },
            cache: CacheSettings {
                backend: CacheBackend::Memory,
                url: None,
                ttl: Duration::from_secs(30),
                timeout: default_cache_timeout(),
            },
            intervals: IntervalSettings {
                host_status: Duration::from_secs(5),
                other_metrics: Duration::from_secs(15),
                push: Duration::from_secs(2),
            },
            retry: RetrySettings {
                attempts: 2,
                backoff: Duration::from_millis(10),
                strategy: RetryStrategy::Fixed,
                max_backoff: default_max_backoff(),
            },
            supervisor: SupervisorSettings::default(),
        }
    }
}

/// The process environment source.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
