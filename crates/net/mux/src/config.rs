//! Multiplexer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default payload limit for a single frame (256 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024;

/// Default time to wait for the remote to accept a stream.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_MAX_INBOUND_STREAMS: usize = 256;

/// Default depth of the per-connection outbound data queue, in frames.
pub const DEFAULT_WRITE_QUEUE: usize = 64;

/// Default number of unread inbound frames buffered per stream.
pub const DEFAULT_READ_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxConfig {
    /// Largest frame payload accepted or produced
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// How long `open_stream` waits for `Accept`/`Reject`, in milliseconds
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    /// Concurrent remotely-opened streams before new ones are rejected
    #[serde(default = "default_max_inbound_streams")]
    pub max_inbound_streams: usize,

    /// Outbound data frames buffered before writers wait
    #[serde(default = "default_write_queue")]
    pub write_queue: usize,

    /// Inbound data frames buffered per stream before the connection stops
    /// reading from the socket
    #[serde(default = "default_read_buffer")]
    pub read_buffer: usize,
}

impl MuxConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_max_inbound_streams(mut self, max: usize) -> Self {
        self.max_inbound_streams = max;
        self
    }

    pub fn with_write_queue(mut self, frames: usize) -> Self {
        self.write_queue = frames;
        self
    }

    pub fn with_read_buffer(mut self, frames: usize) -> Self {
        self.read_buffer = frames;
        self
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
            open_timeout_ms: default_open_timeout_ms(),
            max_inbound_streams: default_max_inbound_streams(),
            write_queue: default_write_queue(),
            read_buffer: default_read_buffer(),
        }
    }
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_open_timeout_ms() -> u64 {
    DEFAULT_OPEN_TIMEOUT.as_millis() as u64
}

fn default_max_inbound_streams() -> usize {
    DEFAULT_MAX_INBOUND_STREAMS
}

fn default_write_queue() -> usize {
    DEFAULT_WRITE_QUEUE
}

fn default_read_buffer() -> usize {
    DEFAULT_READ_BUFFER
}
