//! Retry and timeout policy.

use std::time::Duration;

/// Configurable retry/timeout policy of a session.
///
/// Passed by value into a `Session`; individual operations that accept a
/// timeout may override the relevant field per call.
#[derive(Debug, Clone)]
pub struct RetryTimeoutConfig {
    /// Timeout for establishing a TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Number of additional attempts after a failed connect.
    pub connect_retries: u32,
    /// Timeout for receiving a response once a request was sent.
    pub read_timeout: Duration,
    /// Number of additional attempts after a read timeout. Only idempotent
    /// requests (the GET family) are ever retried on read failure.
    pub read_retries: u32,
    /// Maximum number of HTTP redirects followed per request.
    pub max_redirects: u32,
    /// Overall cap on waiting for an asynchronous job to reach a terminal
    /// status.
    pub operation_timeout: Duration,
    /// Cap on waiting for a resource to reach a desired status value.
    pub status_timeout: Duration,
    /// Time-to-live of name-to-URI cache entries.
    pub name_uri_cache_ttl: Duration,
}

impl Default for RetryTimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            connect_retries: 3,
            read_timeout: Duration::from_secs(3600),
            read_retries: 0,
            max_redirects: 30,
            operation_timeout: Duration::from_secs(3600),
            status_timeout: Duration::from_secs(900),
            name_uri_cache_ttl: Duration::from_secs(300),
        }
    }
}

impl RetryTimeoutConfig {
    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the number of connect retries.
    #[must_use]
    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the number of read retries for idempotent requests.
    #[must_use]
    pub fn with_read_retries(mut self, retries: u32) -> Self {
        self.read_retries = retries;
        self
    }

    /// Set the redirect cap.
    #[must_use]
    pub fn with_max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set the asynchronous-job operation timeout.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the status-transition timeout.
    #[must_use]
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Set the name-to-URI cache TTL.
    #[must_use]
    pub fn with_name_uri_cache_ttl(mut self, ttl: Duration) -> Self {
        self.name_uri_cache_ttl = ttl;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_defaults() {
        let cfg = RetryTimeoutConfig::default();
        assert_eq!(cfg.connect_timeout, Duration::from_secs(30));
        assert_eq!(cfg.connect_retries, 3);
        assert_eq!(cfg.read_timeout, Duration::from_secs(3600));
        assert_eq!(cfg.read_retries, 0);
        assert_eq!(cfg.max_redirects, 30);
        assert_eq!(cfg.operation_timeout, Duration::from_secs(3600));
        assert_eq!(cfg.status_timeout, Duration::from_secs(900));
        assert_eq!(cfg.name_uri_cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn builders_override() {
        let cfg = RetryTimeoutConfig::default()
            .with_operation_timeout(Duration::from_secs(5))
            .with_read_retries(2);
        assert_eq!(cfg.operation_timeout, Duration::from_secs(5));
        assert_eq!(cfg.read_retries, 2);
    }
}
