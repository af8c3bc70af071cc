//! Transport seam between the poll loop and a Bluetooth stack

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Cannot find device {address}")]
    DeviceNotFound { address: String },
    #[error("Cannot connect to device {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },
    #[error("Reading from device {address} timed out after {after:?}")]
    ReadTimeout { address: String, after: Duration },
    #[error("Bluetooth transport error: {0}")]
    Transport(String),
    #[error("Unexpected transport fault: {0}")]
    Fault(#[from] anyhow::Error),
}

impl LinkError {
    /// Whether this is one of the hardware failures the poll loop tolerates.
    ///
    /// [`LinkError::Fault`] is the only variant outside that set; it signals a
    /// defect and is reported as such rather than as a flaky device.
    pub fn is_expected(&self) -> bool {
        !matches!(self, LinkError::Fault(_))
    }
}

/// A device seen by the last scan, with the stack's handle to it
#[derive(Clone)]
pub struct ScannedDevice<H> {
    /// Hardware address as reported by the stack
    pub address: String,
    pub handle: H,
}

impl<H> ScannedDevice<H> {
    pub fn new(address: impl Into<String>, handle: H) -> Self {
        Self {
            address: address.into(),
            handle,
        }
    }
}

impl<H> fmt::Debug for ScannedDevice<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannedDevice")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Operations the bridge needs from a Bluetooth LE stack.
///
/// `scanned_devices` must be a cheap read of the last scan's result; only
/// `scan_devices` touches the radio to refresh it.
#[async_trait]
pub trait BleTransport: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    /// Devices found by the most recent scan
    async fn scanned_devices(&self) -> Vec<ScannedDevice<Self::Handle>>;

    /// Run a scan and replace the scanned-device set, returning its size
    async fn scan_devices(&self) -> Result<usize, LinkError>;

    async fn is_connected(&self, handle: &Self::Handle) -> Result<bool, LinkError>;

    /// Establish the link and make its GATT services available for reads
    async fn connect(&self, handle: &Self::Handle) -> Result<(), LinkError>;

    async fn read_characteristic(
        &self,
        handle: &Self::Handle,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, LinkError>;
}
