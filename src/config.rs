//! Configuration for the daemon link

use crate::backoff::BackoffConfig;
use std::time::Duration;

/// Configuration for the supervisor and its transport
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Daemon host
    pub host: String,
    /// Daemon port
    pub port: u16,
    /// Timeout for a single connect attempt
    pub connect_timeout: Duration,
    /// Reconnect backoff policy
    pub backoff: BackoffConfig,
}

impl LinkConfig {
    /// Address string for the transport
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 6600,
            connect_timeout: Duration::from_secs(5),
            backoff: BackoffConfig::default(),
        }
    }
}
