//! Assembly of decoded readings into publishable events

use crate::reading::{SensorValue, INVALID_VALUE, MAX_SENSORS_PER_CABLE};
use crate::topology::Cable;

/// One reading addressed to the sensor's own topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub topic: String,
    pub value: String,
}

impl OutboundEvent {
    pub fn new(topic: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            value: value.into(),
        }
    }
}

/// Topic a sensor publishes to: `<prefix>/<checkerboard_id>`.
///
/// The prefix is used verbatim.
pub fn sensor_topic(prefix: &str, checkerboard_id: &str) -> String {
    format!("{}/{}", prefix, checkerboard_id)
}

/// Slot of the decoded reading holding a given sensor's value
fn slot_index(cable_index: usize, sensor_index: usize) -> usize {
    cable_index * MAX_SENSORS_PER_CABLE + sensor_index + 1
}

/// Map decoded slot values onto the cable/sensor topology of one device.
///
/// Events come out in topology order. Disabled cables suppress all of their
/// sensors, disabled sensors only themselves. Slots beyond the end of
/// `decoded` count as [`INVALID_VALUE`], and invalid slots are never emitted.
pub fn assemble(
    decoded: &[SensorValue],
    cables: &[Cable],
    topic_prefix: &str,
) -> Vec<OutboundEvent> {
    let mut events = Vec::new();

    for (cable_index, cable) in cables.iter().enumerate() {
        if !cable.enabled {
            continue;
        }

        for (sensor_index, sensor) in cable.sensors.iter().enumerate() {
            if !sensor.enabled {
                continue;
            }

            let value = decoded
                .get(slot_index(cable_index, sensor_index))
                .copied()
                .unwrap_or(INVALID_VALUE);

            if value == INVALID_VALUE {
                continue;
            }

            events.push(OutboundEvent {
                topic: sensor_topic(topic_prefix, &sensor.checkerboard_id),
                value: value.to_string(),
            });
        }
    }

    events
}
