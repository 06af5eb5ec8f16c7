//! Runtime configuration.
//!
//! Loaded from environment variables with defaults, or assembled in code with
//! the `with_*` methods.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `ASYNCREQ_TTL_MS` | `30000` | Time-to-live applied to every record write |
//! | `ASYNCREQ_CHANNEL` | `asyncreq:dispatch` | Broadcast channel for dispatch messages |
//! | `ASYNCREQ_DISPATCH_MODE` | `in-process` | `in-process` or `broadcast` |
//! | `ASYNCREQ_MAX_CONCURRENCY` | `64` | Worker pool permits |
//! | `ASYNCREQ_DLQ_CAPACITY` | `1000` | Dead letter queue capacity |
//! | `ASYNCREQ_SHUTDOWN_TIMEOUT_MS` | `30000` | Drain timeout at shutdown |

use crate::error::ConfigError;
use std::env::{self, VarError};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How submissions hand requests to the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Schedule processing on the local worker pool.
    #[default]
    InProcess,
    /// Publish a dispatch message for worker processes to consume.
    Broadcast,
}

impl FromStr for DispatchMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in-process" | "in_process" | "inprocess" | "local" => Ok(Self::InProcess),
            "broadcast" | "pubsub" => Ok(Self::Broadcast),
            other => Err(ConfigError::InvalidValue {
                key: "ASYNCREQ_DISPATCH_MODE".to_string(),
                reason: format!("unknown dispatch mode '{other}'"),
            }),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProcess => f.write_str("in-process"),
            Self::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// Configuration for the correlation runtime.
///
/// # Example
///
/// ```
/// use asyncreq_runtime::config::{AsyncRequestConfig, DispatchMode};
/// use std::time::Duration;
///
/// let config = AsyncRequestConfig::default()
///     .with_ttl(Duration::from_secs(120))
///     .with_dispatch_mode(DispatchMode::Broadcast)
///     .with_channel("orders:dispatch");
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncRequestConfig {
    /// Time-to-live applied uniformly to every record write
    pub ttl: Duration,
    /// Broadcast channel name for dispatch messages
    pub channel: String,
    /// Dispatch mode used by submissions
    pub dispatch_mode: DispatchMode,
    /// Maximum number of requests processed concurrently
    pub max_concurrency: usize,
    /// Maximum size of the dead letter queue
    pub dlq_max_size: usize,
    /// Timeout for draining in-flight work at shutdown
    pub shutdown_timeout: Duration,
    /// Capacity of the dispatch report broadcast channel
    pub report_capacity: usize,
}

impl Default for AsyncRequestConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            channel: "asyncreq:dispatch".to_string(),
            dispatch_mode: DispatchMode::InProcess,
            max_concurrency: 64,
            dlq_max_size: 1000,
            shutdown_timeout: Duration::from_secs(30),
            report_capacity: 256,
        }
    }
}

impl AsyncRequestConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to [`Default`]. A variable that is set but
    /// not valid unicode is an error, not a fallback.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is set but cannot be
    /// parsed, or if the resulting configuration fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            ttl: env_parse::<u64>("ASYNCREQ_TTL_MS")?
                .map_or(defaults.ttl, Duration::from_millis),
            channel: env_parse::<String>("ASYNCREQ_CHANNEL")?.unwrap_or(defaults.channel),
            dispatch_mode: env_parse::<DispatchMode>("ASYNCREQ_DISPATCH_MODE")?
                .unwrap_or(defaults.dispatch_mode),
            max_concurrency: env_parse("ASYNCREQ_MAX_CONCURRENCY")?
                .unwrap_or(defaults.max_concurrency),
            dlq_max_size: env_parse("ASYNCREQ_DLQ_CAPACITY")?.unwrap_or(defaults.dlq_max_size),
            shutdown_timeout: env_parse::<u64>("ASYNCREQ_SHUTDOWN_TIMEOUT_MS")?
                .map_or(defaults.shutdown_timeout, Duration::from_millis),
            report_capacity: defaults.report_capacity,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check invariants the runtime relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a zero TTL, an empty channel,
    /// or a zero concurrency / queue capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl.is_zero() {
            return Err(ConfigError::invalid("ttl", "must be greater than zero"));
        }
        if self.channel.trim().is_empty() {
            return Err(ConfigError::invalid("channel", "must not be empty"));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid("max_concurrency", "must be greater than zero"));
        }
        if self.dlq_max_size == 0 {
            return Err(ConfigError::invalid("dlq_max_size", "must be greater than zero"));
        }
        if self.report_capacity == 0 {
            return Err(ConfigError::invalid("report_capacity", "must be greater than zero"));
        }
        Ok(())
    }

    /// Set the record time-to-live
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the broadcast channel name
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Set the dispatch mode
    #[must_use]
    pub const fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    /// Set the worker pool concurrency
    #[must_use]
    pub const fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the dead letter queue capacity
    #[must_use]
    pub const fn with_dlq_max_size(mut self, max_size: usize) -> Self {
        self.dlq_max_size = max_size;
        self
    }

    /// Set the shutdown drain timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the dispatch report channel capacity
    #[must_use]
    pub const fn with_report_capacity(mut self, capacity: usize) -> Self {
        self.report_capacity = capacity;
        self
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    parse_var(key, env::var(key))
}

fn parse_var<T>(key: &str, value: Result<String, VarError>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        Ok(raw) => raw.parse::<T>().map(Some).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(ConfigError::invalid(key, "not valid unicode")),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_defaults_are_valid() {
        let config = AsyncRequestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ttl, Duration::from_secs(30));
        assert_eq!(config.dispatch_mode, DispatchMode::InProcess);
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let config = AsyncRequestConfig::default().with_ttl(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "ttl"
        ));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let config = AsyncRequestConfig::default().with_max_concurrency(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dispatch_mode_parses() {
        assert_eq!("broadcast".parse::<DispatchMode>().unwrap(), DispatchMode::Broadcast);
        assert_eq!("In-Process".parse::<DispatchMode>().unwrap(), DispatchMode::InProcess);
        assert!("carrier-pigeon".parse::<DispatchMode>().is_err());
    }

    #[test]
    fn test_unset_variable_falls_back() {
        let parsed = parse_var::<u64>("ASYNCREQ_TTL_MS", Err(VarError::NotPresent)).unwrap();
        assert_eq!(parsed, None);
    }

    #[test]
    fn test_set_variable_is_parsed() {
        let parsed = parse_var::<u64>("ASYNCREQ_TTL_MS", Ok("1500".to_string())).unwrap();
        assert_eq!(parsed, Some(1500));

        let err = parse_var::<u64>("ASYNCREQ_TTL_MS", Ok("soon".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "ASYNCREQ_TTL_MS"));
    }

    #[test]
    fn test_non_unicode_variable_is_rejected() {
        let value = Err(VarError::NotUnicode(OsString::from("broadcast")));
        let err = parse_var::<DispatchMode>("ASYNCREQ_DISPATCH_MODE", value).unwrap_err();
        assert_eq!(
            err,
            ConfigError::invalid("ASYNCREQ_DISPATCH_MODE", "not valid unicode")
        );
    }
}
