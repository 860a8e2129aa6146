//! Speaker daemon configuration.
//!
//! Supports loading from a YAML file with environment variable overrides,
//! the same layering `apps/server`'s `ServerConfig` uses.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Speaker daemon configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SpeakerConfig {
    /// UDP port the time-sync announcer/listener use for broadcast gossip.
    /// Override: `FLOCKCAST_TIMESYNC_PORT`
    pub timesync_port: u16,

    /// TCP port the control server listens on.
    /// Override: `FLOCKCAST_CONTROL_PORT`
    pub control_port: u16,

    /// Broadcast destination for announcements. If unset, this node derives
    /// one from its own resolved address assuming a /24 network (see
    /// `flockcast_core::net::broadcast_addr_for`).
    /// Override: `FLOCKCAST_BROADCAST_ADDR`
    pub broadcast_addr: Option<Ipv4Addr>,

    /// Path to the OSS audio device used for playback.
    /// Override: `FLOCKCAST_AUDIO_DEVICE`
    pub audio_device: PathBuf,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            timesync_port: flockcast_core::constants::TIMESYNC_PORT,
            control_port: flockcast_core::constants::CONTROL_PORT,
            broadcast_addr: None,
            audio_device: PathBuf::from("/dev/dsp"),
        }
    }
}

impl SpeakerConfig {
    /// Loads configuration from an optional YAML file, then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FLOCKCAST_TIMESYNC_PORT") {
            if let Ok(port) = val.parse() {
                self.timesync_port = port;
            }
        }
        if let Ok(val) = std::env::var("FLOCKCAST_CONTROL_PORT") {
            if let Ok(port) = val.parse() {
                self.control_port = port;
            }
        }
        if let Ok(val) = std::env::var("FLOCKCAST_BROADCAST_ADDR") {
            if let Ok(addr) = val.parse() {
                self.broadcast_addr = Some(addr);
            }
        }
        if let Ok(val) = std::env::var("FLOCKCAST_AUDIO_DEVICE") {
            self.audio_device = PathBuf::from(val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_constants() {
        let config = SpeakerConfig::default();
        assert_eq!(config.timesync_port, flockcast_core::constants::TIMESYNC_PORT);
        assert_eq!(config.control_port, flockcast_core::constants::CONTROL_PORT);
        assert!(config.broadcast_addr.is_none());
    }

    #[test]
    fn parses_from_yaml() {
        let yaml = "timesync_port: 9000\ncontrol_port: 9001\naudio_device: /dev/dsp1\n";
        let config: SpeakerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.timesync_port, 9000);
        assert_eq!(config.control_port, 9001);
        assert_eq!(config.audio_device, PathBuf::from("/dev/dsp1"));
    }
}
