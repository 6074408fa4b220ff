//! Client configuration.

use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};
use crate::retry::RetryConfig;

/// Configuration for the transport and request executor.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Retry configuration. `None` means a single attempt per call.
    pub retry: Option<RetryConfig>,
    /// Accept gzip/deflate compressed responses.
    pub compression: bool,
    /// Request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Pool idle timeout.
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// User-Agent header value.
    pub user_agent: String,
    /// API version used to build versioned paths, e.g. `62.0`.
    pub api_version: String,
    /// 5xx statuses that fail immediately instead of being retried.
    pub fatal_server_statuses: Vec<u16>,
    /// Whether to emit per-request debug events.
    pub enable_tracing: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: Some(RetryConfig::default()),
            compression: true,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: crate::USER_AGENT.to_string(),
            api_version: crate::DEFAULT_API_VERSION.to_string(),
            fatal_server_statuses: Vec::new(),
            enable_tracing: true,
        }
    }
}

impl ClientConfig {
    /// Create a new client config builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// The effective retry configuration.
    pub fn retry_config(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_else(RetryConfig::no_retry)
    }

    /// `/services/data/vXX.X`
    pub fn data_path(&self) -> String {
        format!("/services/data/v{}", self.api_version)
    }

    /// Reject settings the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if let Some(retry) = &self.retry {
            retry.validate()?;
        }
        if self.timeout.is_zero() {
            return Err(Error::new(ErrorKind::Config(
                "request timeout must be non-zero".to_string(),
            )));
        }
        let version_ok = self
            .api_version
            .split_once('.')
            .is_some_and(|(major, minor)| {
                !major.is_empty()
                    && !minor.is_empty()
                    && major.chars().all(|c| c.is_ascii_digit())
                    && minor.chars().all(|c| c.is_ascii_digit())
            });
        if !version_ok {
            return Err(Error::new(ErrorKind::Config(format!(
                "invalid API version '{}', expected e.g. 62.0",
                self.api_version
            ))));
        }
        if let Some(status) = self
            .fatal_server_statuses
            .iter()
            .find(|s| !(500..600).contains(*s))
        {
            return Err(Error::new(ErrorKind::Config(format!(
                "fatal server status {status} is not a 5xx status"
            ))));
        }
        Ok(())
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = Some(retry);
        self
    }

    /// Disable retries.
    pub fn without_retry(mut self) -> Self {
        self.config.retry = None;
        self
    }

    /// Accept compressed responses.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.config.compression = enabled;
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set pool idle timeout.
    pub fn with_pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set maximum idle connections per host.
    pub fn with_pool_max_idle(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Set custom User-Agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the API version, with or without a leading `v`.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        self.config.api_version = version.trim_start_matches('v').to_string();
        self
    }

    /// Opt 5xx statuses out of retrying.
    pub fn with_fatal_server_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.config.fatal_server_statuses = statuses.into_iter().collect();
        self
    }

    /// Enable or disable request/response tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.config.enable_tracing = enabled;
        self
    }

    /// Build the client configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.retry.is_some());
        assert!(config.compression);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.user_agent.contains("busbar-sf-api"));
        assert_eq!(config.api_version, "62.0");
        assert_eq!(config.data_path(), "/services/data/v62.0");
        assert!(config.fatal_server_statuses.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::builder()
            .with_timeout(Duration::from_secs(60))
            .without_retry()
            .with_compression(false)
            .with_user_agent("custom-agent/1.0")
            .with_api_version("v61.0")
            .with_fatal_server_statuses([501])
            .build();

        assert!(config.retry.is_none());
        assert_eq!(config.retry_config().max_attempts, 1);
        assert!(!config.compression);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.user_agent, "custom-agent/1.0");
        assert_eq!(config.api_version, "61.0");
        assert_eq!(config.fatal_server_statuses, vec![501]);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let config = ClientConfig::builder().with_api_version("latest").build();
        assert!(config.validate().is_err());

        let config = ClientConfig::builder()
            .with_fatal_server_statuses([404])
            .build();
        assert!(config.validate().is_err());

        let config = ClientConfig::builder()
            .with_retry(RetryConfig::default().with_max_attempts(0))
            .build();
        assert!(config.validate().is_err());
    }
}
