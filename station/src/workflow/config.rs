use anyhow::Context;
use rmtscore::prelude::{MotorConfig, TransportSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Station settings, loaded from YAML. Every field has a default so partial
/// files are accepted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub port: Option<String>,
    pub baud_rate: u32,
    pub resend_count: usize,
    pub fire_duration_ms: u16,
    pub profiles_path: PathBuf,
    pub force_profile: Option<String>,
    pub pressure_profile: Option<String>,
    pub bridge_address: SocketAddr,
    pub motor: MotorConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        let transport = TransportSettings::default();
        Self {
            port: None,
            baud_rate: transport.baud_rate,
            resend_count: transport.resend_count,
            fire_duration_ms: 2000,
            profiles_path: PathBuf::from("profiles.yaml"),
            force_profile: None,
            pressure_profile: None,
            bridge_address: SocketAddr::from(([127, 0, 0, 1], 9000)),
            motor: MotorConfig::default(),
        }
    }
}

impl StationConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading station config {}", path_ref.display()))?;
        let config: StationConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing station config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            baud_rate: self.baud_rate,
            resend_count: self.resend_count.max(1),
            ..TransportSettings::default()
        }
    }

    pub fn port(&self) -> anyhow::Result<&str> {
        self.port
            .as_deref()
            .context("no serial port configured (use --port or set `port` in the config)")
    }
}
