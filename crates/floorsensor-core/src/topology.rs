//! Sensor topology - which devices to poll and how their slots map to sensors
//!
//! A topology file lists every intended BLE device. Each device carries an
//! ordered list of cables and each cable an ordered list of sensors. The
//! position of a cable within its device and of a sensor within its cable
//! determine which slot of the decoded reading belongs to that sensor.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::reading::MAX_SENSORS_PER_CABLE;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("Failed to read sensor topology: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse sensor topology: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize sensor topology: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Device #{0} has an empty address")]
    EmptyAddress(usize),
    #[error("Checkerboard ID {0} is assigned to more than one sensor")]
    DuplicateCheckerboardId(String),
    #[error("Cable {cable} of device {address} has {count} sensors (max {max})")]
    TooManySensors {
        address: String,
        cable: usize,
        count: usize,
        max: usize,
    },
}

/// A single physical sensor on a cable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    /// Logical position name, used as the publish topic suffix
    #[serde(alias = "checkerboardID")]
    pub checkerboard_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// A wiring group of sensors attached to one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cable {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, rename = "sensor", alias = "sensors")]
    pub sensors: Vec<Sensor>,
}

/// A BLE device the bridge is expected to poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntendedDevice {
    /// Hardware address (e.g. "C8:FD:19:4A:07:B2")
    pub address: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, rename = "cable", alias = "cables")]
    pub cables: Vec<Cable>,
}

fn default_true() -> bool {
    true
}

impl Sensor {
    pub fn new(checkerboard_id: impl Into<String>) -> Self {
        Self {
            checkerboard_id: checkerboard_id.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl Cable {
    pub fn new(sensors: Vec<Sensor>) -> Self {
        Self {
            enabled: true,
            sensors,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl IntendedDevice {
    pub fn new(address: impl Into<String>, cables: Vec<Cable>) -> Self {
        Self {
            address: address.into(),
            enabled: true,
            cables,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Number of sensors across all cables, regardless of enable flags
    pub fn sensor_count(&self) -> usize {
        self.cables.iter().map(|c| c.sensors.len()).sum()
    }
}

/// Complete set of intended devices
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorTopology {
    #[serde(default, rename = "device", alias = "devices")]
    pub devices: Vec<IntendedDevice>,
}

impl SensorTopology {
    pub fn new(devices: Vec<IntendedDevice>) -> Self {
        Self { devices }
    }

    /// Load and validate a topology from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, TopologyError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load and validate a topology from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, TopologyError> {
        let mut topology: SensorTopology = toml::from_str(content)?;
        topology.normalize();
        topology.validate()?;
        Ok(topology)
    }

    /// Save the topology to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), TopologyError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Upper-case and trim addresses so they compare equal to what BLE stacks report
    pub fn normalize(&mut self) {
        for device in &mut self.devices {
            device.address = device.address.trim().to_ascii_uppercase();
        }
    }

    /// Check structural invariants that the event assembler relies on
    pub fn validate(&self) -> Result<(), TopologyError> {
        let mut seen = HashSet::new();

        for (index, device) in self.devices.iter().enumerate() {
            if device.address.is_empty() {
                return Err(TopologyError::EmptyAddress(index));
            }

            for (cable_index, cable) in device.cables.iter().enumerate() {
                if cable.sensors.len() > MAX_SENSORS_PER_CABLE {
                    return Err(TopologyError::TooManySensors {
                        address: device.address.clone(),
                        cable: cable_index,
                        count: cable.sensors.len(),
                        max: MAX_SENSORS_PER_CABLE,
                    });
                }

                for sensor in &cable.sensors {
                    if !seen.insert(sensor.checkerboard_id.as_str()) {
                        return Err(TopologyError::DuplicateCheckerboardId(
                            sensor.checkerboard_id.clone(),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Devices with their enabled flag set
    pub fn enabled_devices(&self) -> impl Iterator<Item = &IntendedDevice> {
        self.devices.iter().filter(|d| d.enabled)
    }
}
