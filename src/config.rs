//! Hub configuration
//!
//! A single TOML file describes the broker candidates, the topic vocabulary,
//! the socket table and the storage/RF backends. Every section has defaults so
//! a missing file still yields a runnable (dry-run) hub.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::mqtt::{Backoff, BrokerEndpoint};

const CONFIG_DIR: &str = "homehub";
const CONFIG_FILE: &str = "hub.toml";
const CONFIG_ENV: &str = "HOMEHUB_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    pub log_level: String,
    pub broker: BrokerConfig,
    pub topics: TopicConfig,
    pub actuation: ActuationConfig,
    pub rf: RfConfig,
    pub storage: StorageConfig,
    pub room: RoomConfig,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            broker: BrokerConfig::default(),
            topics: TopicConfig::default(),
            actuation: ActuationConfig::default(),
            rf: RfConfig::default(),
            storage: StorageConfig::default(),
            room: RoomConfig::default(),
        }
    }
}

/// Broker candidates and session parameters.
///
/// All candidate hosts share one port; they are tried in the listed order.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub hosts: Vec<String>,
    pub port: u16,
    pub client_id: String,
    pub subscribe_topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
    pub probe_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub channel_capacity: usize,
    pub reconnect_initial_secs: u64,
    pub reconnect_max_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["localhost".to_string()],
            port: 1883,
            client_id: "homehub".to_string(),
            subscribe_topic: "#".to_string(),
            username: None,
            password: None,
            keep_alive_secs: 60,
            probe_timeout_ms: 2000,
            handshake_timeout_ms: 5000,
            channel_capacity: 100,
            reconnect_initial_secs: 1,
            reconnect_max_secs: 60,
        }
    }
}

impl BrokerConfig {
    pub fn endpoints(&self) -> Vec<BrokerEndpoint> {
        self.hosts
            .iter()
            .map(|host| BrokerEndpoint::new(host.clone(), self.port))
            .collect()
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_secs(self.reconnect_initial_secs),
            Duration::from_secs(self.reconnect_max_secs),
        )
    }
}

/// Topic vocabulary the router recognises.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TopicConfig {
    pub room_data: String,
    pub battery: String,
    pub rf_received: String,
    pub probes: String,
    /// Root of the `<root>/socket/<id>` command family
    pub control_root: String,
    pub computer_control: String,
    pub computer_status: String,
    /// Messages on this topic are dropped without persistence
    pub discard: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            room_data: "room/data".to_string(),
            battery: "tablet/shield/battery".to_string(),
            rf_received: "rf/received".to_string(),
            probes: "mqtt/probes".to_string(),
            control_root: "room/control/command".to_string(),
            computer_control: "room/control/computer".to_string(),
            computer_status: "room/computer/status".to_string(),
            discard: "trash".to_string(),
        }
    }
}

impl TopicConfig {
    pub fn socket_prefix(&self) -> String {
        format!("{}/socket/", self.control_root.trim_end_matches('/'))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SocketConfig {
    pub id: u8,
    pub name: String,
    pub on_code: u64,
    pub off_code: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ActuationConfig {
    pub tablet_socket: u8,
    pub computer_socket: u8,
    /// Upper bound (inclusive) of the "turn charger on" band
    pub battery_low: i64,
    /// Lower bound (inclusive) of the "turn charger off" band
    pub battery_high: i64,
    pub sockets: Vec<SocketConfig>,
}

impl Default for ActuationConfig {
    fn default() -> Self {
        Self {
            tablet_socket: 2,
            computer_socket: 1,
            battery_low: 20,
            battery_high: 80,
            sockets: vec![
                SocketConfig {
                    id: 1,
                    name: "pc".to_string(),
                    on_code: 1131857,
                    off_code: 1131860,
                },
                SocketConfig {
                    id: 2,
                    name: "tablet".to_string(),
                    on_code: 1134929,
                    off_code: 1134932,
                },
                SocketConfig {
                    id: 3,
                    name: "other".to_string(),
                    on_code: 1135697,
                    off_code: 1135700,
                },
            ],
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RfBackend {
    Gpio,
    #[default]
    DryRun,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RfConfig {
    pub backend: RfBackend,
    pub gpio_pin: u8,
    pub tx_repeat: u32,
    pub pulse_length_us: u64,
    pub code_length: u32,
}

impl Default for RfConfig {
    fn default() -> Self {
        Self {
            backend: RfBackend::DryRun,
            gpio_pin: 4,
            tx_repeat: 10,
            pulse_length_us: 350,
            code_length: 24,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: "data.db".to_string(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RoomConfig {
    /// Added to the temperature of legacy key=value readings (sensor self-heating)
    pub legacy_temperature_offset: f64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            legacy_temperature_offset: -4.0,
        }
    }
}

impl HubConfig {
    /// Resolves the config path: explicit argument, then `$HOMEHUB_CONFIG`,
    /// then the per-user config directory.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        if let Some(path) = explicit {
            return path;
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Loads the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.hosts.is_empty() {
            return Err(ConfigError::Invalid(
                "broker.hosts must list at least one candidate".to_string(),
            ));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::Invalid("broker.port must not be 0".to_string()));
        }
        if self.broker.reconnect_initial_secs == 0
            || self.broker.reconnect_initial_secs > self.broker.reconnect_max_secs
        {
            return Err(ConfigError::Invalid(
                "broker.reconnect_initial_secs must be between 1 and reconnect_max_secs"
                    .to_string(),
            ));
        }
        if self.topics.control_root.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid(
                "topics.control_root must not be empty".to_string(),
            ));
        }
        if self.actuation.battery_low >= self.actuation.battery_high {
            return Err(ConfigError::Invalid(format!(
                "actuation.battery_low ({}) must be below actuation.battery_high ({})",
                self.actuation.battery_low, self.actuation.battery_high
            )));
        }

        if !(1..=u64::BITS).contains(&self.rf.code_length) {
            return Err(ConfigError::Invalid(format!(
                "rf.code_length ({}) must be between 1 and {}",
                self.rf.code_length,
                u64::BITS
            )));
        }

        let mut ids = HashSet::new();
        for socket in &self.actuation.sockets {
            if !ids.insert(socket.id) {
                return Err(ConfigError::Invalid(format!(
                    "socket id {} is configured twice",
                    socket.id
                )));
            }
        }
        for (role, id) in [
            ("tablet_socket", self.actuation.tablet_socket),
            ("computer_socket", self.actuation.computer_socket),
        ] {
            if !ids.contains(&id) {
                return Err(ConfigError::Invalid(format!(
                    "actuation.{} refers to unknown socket {}",
                    role, id
                )));
            }
        }

        debug!("Configuration validated: {} sockets", ids.len());
        Ok(())
    }

    pub fn level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.log_level)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = HubConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.topics.socket_prefix(), "room/control/command/socket/");
        assert_eq!(config.level().unwrap(), tracing::Level::INFO);
    }

    #[test]
    fn sample_file_parses_and_validates() {
        let config = HubConfig::from_toml(include_str!("../homehub.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.broker.endpoints().len(), 4);
        assert_eq!(config.actuation, ActuationConfig::default());
        assert_eq!(config.topics, TopicConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let config = HubConfig::from_toml(
            r#"
            log_level = "debug"

            [broker]
            hosts = ["localhost", "192.168.1.201", "192.168.1.205"]
            port = 8883

            [rf]
            backend = "gpio"
            "#,
        )
        .unwrap();

        assert_eq!(config.broker.port, 8883);
        assert_eq!(config.broker.client_id, "homehub");
        assert_eq!(config.rf.backend, RfBackend::Gpio);
        assert_eq!(config.topics.discard, "trash");

        let endpoints = config.broker.endpoints();
        assert_eq!(endpoints.len(), 3);
        assert_eq!(endpoints[2], BrokerEndpoint::new("192.168.1.205", 8883));
    }

    #[test]
    fn load_reads_file_and_missing_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\nbackend = \"memory\"").unwrap();
        let config = HubConfig::load(file.path()).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);

        let dir = tempfile::tempdir().unwrap();
        let config = HubConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[broker\nport = 1").unwrap();
        assert!(matches!(
            HubConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn validate_rejects_inverted_thresholds_and_unknown_sockets() {
        let mut config = HubConfig::default();
        config.actuation.battery_low = 80;
        config.actuation.battery_high = 20;
        assert!(config.validate().is_err());

        let mut config = HubConfig::default();
        config.actuation.tablet_socket = 9;
        assert!(config.validate().is_err());

        let mut config = HubConfig::default();
        config.broker.hosts.clear();
        assert!(config.validate().is_err());

        let mut config = HubConfig::default();
        let duplicate = config.actuation.sockets[0].clone();
        config.actuation.sockets.push(duplicate);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_bounds_rf_code_length() {
        let mut config = HubConfig::default();
        for (length, valid) in [(0, false), (1, true), (64, true), (65, false), (200, false)] {
            config.rf.code_length = length;
            assert_eq!(config.validate().is_ok(), valid, "code_length {}", length);
        }
    }
}
