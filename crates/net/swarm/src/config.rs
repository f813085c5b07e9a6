//! Connection manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Per-address TCP connect timeout, in milliseconds
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    /// Identity handshake timeout, in milliseconds
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Events buffered per subscriber before the oldest are dropped
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl SwarmConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            dial_timeout_ms: default_dial_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_dial_timeout_ms() -> u64 {
    DEFAULT_DIAL_TIMEOUT.as_millis() as u64
}

fn default_handshake_timeout_ms() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}
