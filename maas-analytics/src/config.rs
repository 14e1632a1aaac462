//! Client configuration.

use crate::error::Result;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for a [`MaaSAnalytics`](crate::MaaSAnalytics) client.
///
/// Every field has a default, so an empty TOML document is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// When false, every recording call is ignored.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Namespace used by calls that do not name one.
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    /// Upper bound on pending events; the oldest are evicted beyond it.
    #[serde(default = "default_max_queued_events")]
    pub max_queued_events: usize,

    /// Interval of the background flush thread. No thread is started when
    /// this is unset.
    #[serde(default)]
    pub flush_interval_ms: Option<u64>,

    /// Name of the clock to use (see [`Clock::by_name`](crate::Clock::by_name)).
    #[serde(default = "default_clock")]
    pub clock: String,
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "default".to_owned()
}

fn default_max_queued_events() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_clock() -> String {
    "wall-time".to_owned()
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        AnalyticsConfig {
            enabled: default_true(),
            default_namespace: default_namespace(),
            max_queued_events: default_max_queued_events(),
            flush_interval_ms: None,
            clock: default_clock(),
        }
    }
}

impl AnalyticsConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn flush_interval(&self) -> Option<Duration> {
        self.flush_interval_ms
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn empty_document_gives_defaults() {
        let config = AnalyticsConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalyticsConfig::default());
        assert!(config.enabled);
        assert_eq!(config.default_namespace, "default");
        assert_eq!(config.max_queued_events, 1000);
        assert_eq!(config.flush_interval(), None);
        assert_eq!(config.clock, "wall-time");
    }

    #[test]
    fn overrides_are_applied() {
        let config = AnalyticsConfig::from_toml_str(
            r#"
            enabled = false
            default_namespace = "checkout"
            max_queued_events = 50
            flush_interval_ms = 250
            clock = "manual"
            "#,
        )
        .unwrap();

        assert!(!config.enabled);
        assert_eq!(config.default_namespace, "checkout");
        assert_eq!(config.max_queued_events, 50);
        assert_eq!(config.flush_interval(), Some(Duration::from_millis(250)));
        assert_eq!(config.clock, "manual");
    }

    #[test]
    fn zero_interval_disables_background_flush() {
        let config = AnalyticsConfig {
            flush_interval_ms: Some(0),
            ..AnalyticsConfig::default()
        };
        assert_eq!(config.flush_interval(), None);
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = AnalyticsConfig::from_toml_str("max_queued_events = \"lots\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AnalyticsConfig::from_path("does/not/exist.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
