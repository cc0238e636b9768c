//! Configuration for tournd components

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::common::Result;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Broker-specific config
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Client-specific config
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Bind address for the request channel
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Root path for tournament nodes in the coordination store
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Bounded wait for node locks
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,

    /// How long an accepted connection may stay silent before it is dropped
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,
}

/// Client configuration: one broker instance per port in
/// `[start_port, start_port + broker_count)` on `host`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Host the broker instances run on
    #[serde(default = "default_host")]
    pub host: String,

    /// First broker port
    #[serde(default = "default_start_port")]
    pub start_port: u16,

    /// Number of broker instances
    #[serde(default = "default_broker_count")]
    pub broker_count: u16,

    /// Bounded wait for a reply from one endpoint
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_ms: u64,
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:7400".parse().unwrap()
}
fn default_root_path() -> String {
    "/tournd".to_string()
}
fn default_lock_timeout() -> u64 {
    500
}
fn default_idle_timeout() -> u64 {
    200
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_start_port() -> u16 {
    7400
}
fn default_broker_count() -> u16 {
    1
}
fn default_reply_timeout() -> u64 {
    750
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            client: ClientConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            root_path: default_root_path(),
            lock_timeout_ms: default_lock_timeout(),
            idle_timeout_ms: default_idle_timeout(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            start_port: default_start_port(),
            broker_count: default_broker_count(),
            reply_timeout_ms: default_reply_timeout(),
        }
    }
}

impl BrokerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl ClientConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

impl Config {
    /// Load configuration from `tournd.toml` (or `$TOURND_CONFIG`) merged
    /// with `TOURND_*` environment overrides. Missing file means defaults.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("TOURND_CONFIG").unwrap_or_else(|_| "tournd.toml".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::with_prefix("TOURND").separator("__"))
            .build()
            .map_err(|e| crate::Error::Other(format!("config error: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| crate::Error::Other(format!("config error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.broker.root_path, "/tournd");
        assert_eq!(config.broker.idle_timeout(), Duration::from_millis(200));
        assert_eq!(config.broker.lock_timeout(), Duration::from_millis(500));
        assert_eq!(config.client.reply_timeout(), Duration::from_millis(750));
        assert_eq!(config.client.broker_count, 1);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let broker: BrokerConfig =
            serde_json::from_str(r#"{"bind_addr": "0.0.0.0:9000"}"#).unwrap();
        assert_eq!(broker.bind_addr.port(), 9000);
        assert_eq!(broker.root_path, "/tournd");
    }
}
