//! Configuration for sessions and agents.

use std::time::Duration;

/// Default period of keep-alive updates.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Configuration of a coordinator-side Twilight session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwilightConfig {
    /// Period of empty keep-alive updates, `None` to disable them.
    pub keep_alive_interval: Option<Duration>,
}

impl TwilightConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            keep_alive_interval: Some(DEFAULT_KEEP_ALIVE_INTERVAL),
        }
    }

    /// Sets the keep-alive period.
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    /// Disables keep-alive updates.
    pub fn without_keep_alive(mut self) -> Self {
        self.keep_alive_interval = None;
        self
    }
}

impl Default for TwilightConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration of a host agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Router peer id of the coordinator.
    pub coordinator_peer: String,
    /// Period of empty keep-alive reports, `None` to disable them.
    pub keep_alive_interval: Option<Duration>,
}

impl AgentConfig {
    /// Creates a configuration reporting to `coordinator_peer`.
    pub fn new(coordinator_peer: impl Into<String>) -> Self {
        Self {
            coordinator_peer: coordinator_peer.into(),
            keep_alive_interval: Some(DEFAULT_KEEP_ALIVE_INTERVAL),
        }
    }

    /// Sets the keep-alive period.
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    /// Disables keep-alive reports.
    pub fn without_keep_alive(mut self) -> Self {
        self.keep_alive_interval = None;
        self
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new("sparkle")
    }
}
