//! Host configuration (TOML/env deserialisable).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use weft_net_mux::MuxConfig;
use weft_net_swarm::SwarmConfig;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Dialing and handshake settings
    #[serde(default)]
    pub swarm: SwarmConfig,

    /// Stream multiplexer settings
    #[serde(default)]
    pub mux: MuxConfig,

    /// Expired-address sweep settings
    #[serde(default)]
    pub peerstore: PeerstoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerstoreConfig {
    /// How often expired addresses are dropped, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl PeerstoreConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for PeerstoreConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
