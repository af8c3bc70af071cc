//! Where the orchestrator gets its intended devices from

use floorsensor_core::{IntendedDevice, SensorTopology, TopologyError};
use std::path::PathBuf;
use std::sync::RwLock;

/// Read access to the intended-device set.
///
/// Called once per cycle; implementations must not cache across calls in a
/// way that hides configuration changes.
pub trait TopologySource: Send + Sync {
    fn intended_devices(&self) -> Result<Vec<IntendedDevice>, TopologyError>;
}

/// Topology held in memory, replaceable at runtime
#[derive(Debug, Default)]
pub struct StaticTopology {
    topology: RwLock<SensorTopology>,
}

impl StaticTopology {
    pub fn new(topology: SensorTopology) -> Self {
        Self {
            topology: RwLock::new(topology),
        }
    }

    /// Swap in a new topology; takes effect on the next cycle
    pub fn replace(&self, topology: SensorTopology) {
        *self.topology.write().unwrap_or_else(|e| e.into_inner()) = topology;
    }
}

impl TopologySource for StaticTopology {
    fn intended_devices(&self) -> Result<Vec<IntendedDevice>, TopologyError> {
        let topology = self.topology.read().unwrap_or_else(|e| e.into_inner());
        Ok(topology.devices.clone())
    }
}

/// Topology re-read from a TOML file every cycle
#[derive(Debug, Clone)]
pub struct FileTopology {
    path: PathBuf,
}

impl FileTopology {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl TopologySource for FileTopology {
    fn intended_devices(&self) -> Result<Vec<IntendedDevice>, TopologyError> {
        Ok(SensorTopology::from_file(&self.path)?.devices)
    }
}
