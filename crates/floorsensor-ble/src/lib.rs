//! Floorsensor BLE - Connection lifecycle and GATT reads
//!
//! The bridge never talks to a Bluetooth stack directly. Everything goes
//! through the [`BleTransport`] seam, which the poll loop drives via the
//! [`ConnectionManager`]:
//! - look up an intended address among the scanned devices
//! - establish the link if it is not already up
//! - read the sensor characteristic with a bounded wait

pub mod connection;
pub mod transport;

#[cfg(feature = "bluetooth")]
pub mod btle;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use connection::{
    ActiveLink, ConnectionManager, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT,
};
pub use transport::{BleTransport, LinkError, ScannedDevice};

#[cfg(feature = "bluetooth")]
pub use btle::BtleplugTransport;
