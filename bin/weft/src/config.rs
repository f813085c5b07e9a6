//! Figment-based configuration loading.
//!
//! Configuration priority (highest wins):
//! 1. CLI arguments (applied by each command)
//! 2. Config file (TOML)
//! 3. Environment variables (`WEFT_` prefix, `__` between sections,
//!    e.g. `WEFT_SWARM__DIAL_TIMEOUT_MS`)
//! 4. Defaults

use std::path::Path;

use eyre::{Result, WrapErr};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use weft_host::HostConfig;

pub(crate) fn load(config_path: Option<&Path>) -> Result<HostConfig> {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(HostConfig::default()))
        .merge(Env::prefixed("WEFT_").split("__"));

    if let Some(path) = config_path {
        if !path.exists() {
            eyre::bail!("config file {} does not exist", path.display());
        }
        figment = figment.merge(Toml::file(path));
    }

    figment.extract().wrap_err("Failed to load configuration")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = load(None).unwrap();
        assert_eq!(config.mux.max_frame_size, 256 * 1024);
    }

    #[test]
    fn file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("weft.toml");
        fs::write(
            &config_path,
            r#"
[swarm]
dial_timeout_ms = 1500

[mux]
max_inbound_streams = 8
"#,
        )
        .unwrap();

        let config = load(Some(&config_path)).unwrap();
        assert_eq!(config.swarm.dial_timeout_ms, 1500);
        assert_eq!(config.mux.max_inbound_streams, 8);
        // Untouched sections keep their defaults.
        assert_eq!(config.peerstore.sweep_interval_secs, 60);
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load(Some(&temp_dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("weft.toml");
        fs::write(&config_path, "[mux]\nmax_frame_size = \"big\"\n").unwrap();
        assert!(load(Some(&config_path)).is_err());
    }
}
