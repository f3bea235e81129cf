use crate::{Error, Result};
use std::time::Duration;

/// Default archive availability endpoint
pub const DEFAULT_ARCHIVE_ENDPOINT: &str = "https://archive.org/wayback/available";

/// Checker configuration for cadence, batch limits and archive lookups
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Run the checker at all
    pub enabled: bool,

    /// Time between scheduled passes
    pub poll_interval: Duration,

    /// Minimum age of the last check before an alive link is probed again
    pub alive_recheck_interval: Duration,

    /// Minimum age of the last check before a gone link is probed again
    pub gone_recheck_interval: Duration,

    /// Maximum candidates fetched per pass
    pub batch_size: usize,

    /// Maximum probes in flight at once
    pub concurrency: usize,

    /// Look up archive snapshots for gone links
    pub archive_lookup_enabled: bool,

    /// Minimum age of the last archive lookup before looking up again
    pub archive_recheck_interval: Duration,

    /// Per-request timeout for destination probes
    pub probe_timeout: Duration,

    /// Per-request timeout for archive lookups
    pub archive_timeout: Duration,

    /// Product name used in the User-Agent header
    pub product_name: String,

    /// Archive availability API base URL
    pub archive_endpoint: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(5 * 60),
            alive_recheck_interval: Duration::from_secs(6 * 60 * 60),
            gone_recheck_interval: Duration::from_secs(24 * 60 * 60),
            batch_size: 100,
            concurrency: 5,
            archive_lookup_enabled: true,
            archive_recheck_interval: Duration::from_secs(7 * 24 * 60 * 60),
            probe_timeout: Duration::from_secs(10),
            archive_timeout: Duration::from_secs(10),
            product_name: "linkstone".to_string(),
            archive_endpoint: DEFAULT_ARCHIVE_ENDPOINT.to_string(),
        }
    }
}

impl CheckerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with the checker switched off
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_alive_recheck_interval(mut self, interval: Duration) -> Self {
        self.alive_recheck_interval = interval;
        self
    }

    pub fn with_gone_recheck_interval(mut self, interval: Duration) -> Self {
        self.gone_recheck_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_archive_lookup(mut self, enabled: bool) -> Self {
        self.archive_lookup_enabled = enabled;
        self
    }

    pub fn with_archive_recheck_interval(mut self, interval: Duration) -> Self {
        self.archive_recheck_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_archive_timeout(mut self, timeout: Duration) -> Self {
        self.archive_timeout = timeout;
        self
    }

    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = name.into();
        self
    }

    pub fn with_archive_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.archive_endpoint = endpoint.into();
        self
    }

    /// User-Agent sent with every destination probe
    pub fn user_agent(&self) -> String {
        format!("{}-status-checker/1.0", self.product_name)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig("poll_interval must be greater than 0".to_string()));
        }

        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be greater than 0".to_string()));
        }

        if self.concurrency == 0 {
            return Err(Error::InvalidConfig("concurrency must be greater than 0".to_string()));
        }

        if self.probe_timeout.is_zero() || self.archive_timeout.is_zero() {
            return Err(Error::InvalidConfig("timeouts must be greater than 0".to_string()));
        }

        if self.product_name.trim().is_empty() {
            return Err(Error::InvalidConfig("product_name must not be empty".to_string()));
        }

        if self.archive_lookup_enabled && self.archive_endpoint.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "archive_endpoint must be set when archive lookups are enabled".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CheckerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert_eq!(config.alive_recheck_interval, Duration::from_secs(6 * 3600));
        assert_eq!(config.gone_recheck_interval, Duration::from_secs(24 * 3600));
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.concurrency, 5);
        assert!(config.archive_lookup_enabled);
        assert_eq!(config.archive_recheck_interval, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.probe_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_methods() {
        let config = CheckerConfig::new()
            .with_poll_interval(Duration::from_secs(60))
            .with_batch_size(25)
            .with_concurrency(2)
            .with_archive_lookup(false)
            .with_product_name("shorty");

        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.concurrency, 2);
        assert!(!config.archive_lookup_enabled);
        assert_eq!(config.user_agent(), "shorty-status-checker/1.0");
    }

    #[test]
    fn test_disabled() {
        let config = CheckerConfig::disabled();
        assert!(!config.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_success() {
        assert!(CheckerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_batch_size() {
        let config = CheckerConfig::new().with_batch_size(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let config = CheckerConfig::new().with_concurrency(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let config = CheckerConfig::new().with_poll_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_missing_archive_endpoint() {
        let config = CheckerConfig::new().with_archive_endpoint("");
        assert!(config.validate().is_err());

        let config = CheckerConfig::new()
            .with_archive_endpoint("")
            .with_archive_lookup(false);
        assert!(config.validate().is_ok());
    }
}
