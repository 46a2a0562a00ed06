//! Configuration for connections and networks

use std::time::Duration;

/// Per-connection tunables.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long a latency probe waits for its `pong` before the pending
    /// entry is dropped and the probe fails.
    pub ping_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ping_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    /// Override the ping timeout.
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }
}

/// Network-wide tunables.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    /// Applied to every connection the network creates or accepts.
    pub connection: ConnectionConfig,
}
