//! Floorsensor MQTT - Publishing of assembled sensor events
//!
//! Events are handed to a [`Publisher`] in per-device batches through
//! [`dispatch`], which runs each batch on its own task so a slow broker never
//! holds up the next BLE read.

pub mod client;
pub mod publisher;

pub use client::{MqttConfig, MqttPublisher};
pub use publisher::{dispatch, PublishError, Publisher};
