//! Configuration loading

use anyhow::Result;
use floorsensor_mqtt::MqttConfig;
use floorsensor_poll::{PollConfig, DEFAULT_SCAN_INTERVAL, SENSOR_CHARACTERISTIC};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub ble: BleConfig,
    #[serde(default)]
    pub mqtt: MqttSection,
    #[serde(default)]
    pub topology: TopologyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Delay between the end of one poll cycle and the start of the next
    #[serde(default = "default_sensor_read_delay")]
    pub sensor_read_delay_ms: u64,
    /// Cool-down after a device produced no valid readings
    #[serde(default = "default_unsuccessful_task_delay")]
    pub unsuccessful_task_delay_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            sensor_read_delay_ms: default_sensor_read_delay(),
            unsuccessful_task_delay_ms: default_unsuccessful_task_delay(),
        }
    }
}

fn default_sensor_read_delay() -> u64 {
    500
}

fn default_unsuccessful_task_delay() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BleConfig {
    /// Index into the system's adapter list
    #[serde(default)]
    pub adapter: usize,
    /// How long a scan listens for advertisements
    #[serde(default = "default_scan_duration")]
    pub scan_duration_ms: u64,
    /// Pause between scheduled rescans, 0 disables them
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Characteristic carrying the packed sensor slots
    #[serde(default = "default_sensor_characteristic")]
    pub sensor_characteristic: Uuid,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            adapter: 0,
            scan_duration_ms: default_scan_duration(),
            scan_interval_ms: default_scan_interval(),
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
            sensor_characteristic: default_sensor_characteristic(),
        }
    }
}

fn default_scan_duration() -> u64 {
    5000
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL.as_millis() as u64
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_read_timeout() -> u64 {
    5000
}

fn default_sensor_characteristic() -> Uuid {
    SENSOR_CHARACTERISTIC
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSection {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
    /// Prefix of sensor topics, `<prefix>/<checkerboard_id>`
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
            qos: 0,
            retain: false,
            topic_prefix: default_topic_prefix(),
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "sentient-floorsensor".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_topic_prefix() -> String {
    "sensor".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Path to the sensor topology file, re-read every cycle
    #[serde(default = "default_topology_path")]
    pub path: PathBuf,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            path: default_topology_path(),
        }
    }
}

fn default_topology_path() -> PathBuf {
    PathBuf::from("./sensors.toml")
}

impl Config {
    /// Convert to PollConfig
    pub fn to_poll_config(&self) -> PollConfig {
        PollConfig {
            sensor_read_delay: Duration::from_millis(self.daemon.sensor_read_delay_ms),
            unsuccessful_task_delay: Duration::from_millis(self.daemon.unsuccessful_task_delay_ms),
            topic_prefix: self.mqtt.topic_prefix.clone(),
            sensor_characteristic: self.ble.sensor_characteristic,
            connect_timeout: Duration::from_millis(self.ble.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.ble.read_timeout_ms),
        }
    }

    /// Convert to MqttConfig
    pub fn to_mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            host: self.mqtt.host.clone(),
            port: self.mqtt.port,
            client_id: self.mqtt.client_id.clone(),
            keep_alive_secs: self.mqtt.keep_alive_secs,
            qos: self.mqtt.qos,
            retain: self.mqtt.retain,
            ..MqttConfig::default()
        }
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.ble.scan_duration_ms)
    }

    /// Interval of the scan scheduler, `None` when it is switched off
    pub fn scan_interval(&self) -> Option<Duration> {
        match self.ble.scan_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)?;
    Ok(())
}
