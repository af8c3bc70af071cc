//! Floorsensor Core - Core types for the floor sensor bridge
//!
//! This crate provides the foundational types for the bridge:
//! - Sensor topology (devices, cables, sensors) and its TOML representation
//! - Decoding of raw GATT characteristic buffers into per-slot readings
//! - Assembly of decoded readings into topic-qualified outbound events
//! - Cycle duration statistics for the poll loop

pub mod event;
pub mod reading;
pub mod stats;
pub mod topology;

pub use event::{assemble, sensor_topic, OutboundEvent};
pub use reading::{
    DecodedReading, ReadingDecoder, SensorValue, SentientDecoder, INVALID_VALUE,
    MAX_SENSORS_PER_CABLE,
};
pub use stats::CycleStats;
pub use topology::{Cable, IntendedDevice, Sensor, SensorTopology, TopologyError};
