//! HTTP transport configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{HarnessError, Result};

/// Upper bound for `timeout_secs`.
pub const MAX_TIMEOUT_SECS: u64 = 300;
/// Upper bound for `connect_timeout_secs`.
pub const MAX_CONNECT_TIMEOUT_SECS: u64 = 60;

/// HTTP transport configuration, the `[http]` table of the harness config.
///
/// # Examples
///
/// ```toml
/// [http]
/// timeout_secs = 60
/// connect_timeout_secs = 10
/// http_version = "http1"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    /// Maximum idle connections per host.
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    /// Whole-request timeout in seconds. The gateway can take a while on
    /// refunds, so the default is generous.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// HTTP version preference.
    #[serde(default)]
    pub http_version: HttpVersion,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: default_pool_max_idle(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            http_version: HttpVersion::default(),
        }
    }
}

impl HttpConfig {
    /// Validates configuration values are within acceptable bounds.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if timeout values are outside valid ranges:
    /// - `timeout_secs`: must be 1-300 seconds
    /// - `connect_timeout_secs`: must be 1-60 seconds
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(HarnessError::Config(format!(
                "timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
            )));
        }
        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > MAX_CONNECT_TIMEOUT_SECS {
            return Err(HarnessError::Config(format!(
                "connect_timeout_secs must be between 1 and {MAX_CONNECT_TIMEOUT_SECS}"
            )));
        }
        Ok(())
    }

    /// Returns timeout as Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns connect timeout as Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// HTTP version preference.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HttpVersion {
    /// HTTP/1.1 only.
    Http1,
    /// Auto-negotiate (prefer HTTP/2 over TLS, fall back to HTTP/1.1).
    #[default]
    Auto,
}

const fn default_pool_max_idle() -> usize {
    10
}

const fn default_timeout_secs() -> u64 {
    60
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_default() {
        let config = HttpConfig::default();
        assert_eq!(config.pool_max_idle_per_host, 10);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.http_version, HttpVersion::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_config_durations() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_http_config_from_toml() {
        let toml = "
            pool_max_idle_per_host = 2
            timeout_secs = 45
            connect_timeout_secs = 15
            http_version = \"http1\"
        ";

        let config: HttpConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.pool_max_idle_per_host, 2);
        assert_eq!(config.timeout_secs, 45);
        assert_eq!(config.connect_timeout_secs, 15);
        assert_eq!(config.http_version, HttpVersion::Http1);
    }

    #[test]
    fn test_http_config_partial_toml_uses_defaults() {
        let config: HttpConfig = toml::from_str("timeout_secs = 5").unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_validate_bounds() {
        let cases = [
            (0, 10, false),
            (1, 1, true),
            (300, 60, true),
            (301, 10, false),
            (60, 0, false),
            (60, 61, false),
        ];
        for (timeout_secs, connect_timeout_secs, ok) in cases {
            let config = HttpConfig { timeout_secs, connect_timeout_secs, ..Default::default() };
            let result = config.validate();
            assert_eq!(result.is_ok(), ok, "{timeout_secs}/{connect_timeout_secs}: {result:?}");
            if let Err(err) = result {
                assert!(matches!(err, HarnessError::Config(_)));
            }
        }
    }
}
