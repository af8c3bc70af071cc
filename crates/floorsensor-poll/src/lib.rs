//! Floorsensor Poll - The scheduled sensor read loop
//!
//! Every cycle the [`PollOrchestrator`] walks the enabled devices of the
//! current sensor topology, reads their sensor characteristic, turns the
//! readings into events and hands them to the publisher. A failing device
//! only costs its own slot in the cycle. A [`DeviceScanner`] running
//! alongside keeps the transport's scanned set up to date.

pub mod orchestrator;
pub mod scanner;
pub mod source;

pub use orchestrator::{
    CycleReport, DeviceOutcome, DeviceReport, PollConfig, PollOrchestrator, SENSOR_CHARACTERISTIC,
};
pub use scanner::{DeviceScanner, DEFAULT_SCAN_INTERVAL};
pub use source::{FileTopology, StaticTopology, TopologySource};
