//! Configuration for the realtime client.

use crate::transport::TransportOptions;
use crate::{Paths, RealtimeError, RealtimeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default realtime server URL.
pub const DEFAULT_REALTIME_URL: &str = "ws://localhost:5000/realtime";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Longest accepted keepalive interval.
const MAX_PING_INTERVAL_SECS: u64 = 3600;

/// Realtime client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Realtime server URL.
    pub url: String,
    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Base reconnect delay. Attempt `n` waits `n * base`.
    pub reconnect_base_delay_ms: u64,
    /// How long to wait for the transport to open.
    pub connect_timeout_ms: u64,
    /// Keepalive ping interval in seconds.
    pub ping_interval_secs: u64,
    /// How long notifications stay visible.
    pub notification_dismiss_ms: u64,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REALTIME_URL.to_string(),
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1000,
            connect_timeout_ms: 20_000,
            ping_interval_secs: 25,
            notification_dismiss_ms: 5000,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl RealtimeConfig {
    /// Create a new config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file if present, then the environment.
    pub fn load(paths: &Paths) -> RealtimeResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> RealtimeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RealtimeConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> RealtimeResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(url) = std::env::var("TRADE_REALTIME_URL") {
            self.url = url;
        }
        if let Ok(log_level) = std::env::var("TRADE_REALTIME_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }

    /// Check the values the connection manager relies on.
    pub fn validate(&self) -> RealtimeResult<()> {
        let url = self.parsed_url()?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(RealtimeError::Config(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }
        if self.ping_interval_secs == 0 || self.ping_interval_secs > MAX_PING_INTERVAL_SECS {
            return Err(RealtimeError::Config(format!(
                "ping_interval_secs must be between 1 and {MAX_PING_INTERVAL_SECS}"
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(RealtimeError::Config(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the realtime URL as a parsed URL.
    pub fn parsed_url(&self) -> RealtimeResult<Url> {
        Url::parse(&self.url).map_err(RealtimeError::from)
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn notification_dismiss(&self) -> Duration {
        Duration::from_millis(self.notification_dismiss_ms)
    }

    /// Transport options derived from this config.
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = RealtimeConfig::default();
        assert_eq!(config.url, DEFAULT_REALTIME_URL);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_base_delay_ms, 1000);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reconnect_delay_is_linear() {
        let config = RealtimeConfig {
            reconnect_base_delay_ms: 100,
            ..Default::default()
        };
        assert_eq!(config.reconnect_delay(1), Duration::from_millis(100));
        assert_eq!(config.reconnect_delay(2), Duration::from_millis(200));
        assert_eq!(config.reconnect_delay(5), Duration::from_millis(500));
    }

    #[test]
    fn test_config_load_partial_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{ "url": "wss://realtime.example.com/ws", "max_reconnect_attempts": 2 }"#,
        )
        .unwrap();

        let config = RealtimeConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.url, "wss://realtime.example.com/ws");
        assert_eq!(config.max_reconnect_attempts, 2);
        assert_eq!(config.reconnect_base_delay_ms, 1000);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = RealtimeConfig {
            reconnect_base_delay_ms: 250,
            ..Default::default()
        };
        config.save(&paths).unwrap();

        let loaded = RealtimeConfig::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_http_scheme() {
        let config = RealtimeConfig {
            url: "https://example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RealtimeError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_invalid_url() {
        let config = RealtimeConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RealtimeError::InvalidUrl(_))));
    }

    #[test]
    fn test_validate_rejects_zero_ping_interval() {
        let config = RealtimeConfig {
            ping_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_extreme_ping_interval() {
        let config = RealtimeConfig {
            ping_interval_secs: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RealtimeError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_connect_timeout() {
        let config = RealtimeConfig {
            connect_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RealtimeError::Config(_))));
    }

    #[test]
    fn test_transport_options() {
        let options = RealtimeConfig::default().transport_options();
        assert_eq!(options.connect_timeout, Duration::from_secs(20));
        assert_eq!(options.ping_interval, Duration::from_secs(25));
    }
}
