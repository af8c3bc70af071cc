//! btleplug-backed transport

use async_trait::async_trait;
use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::transport::{BleTransport, LinkError, ScannedDevice};

/// Default time the radio listens for advertisements per scan
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);

/// Transport over the host's Bluetooth adapter
pub struct BtleplugTransport {
    adapter: Adapter,
    scan_duration: Duration,
    scanned: RwLock<Vec<ScannedDevice<Peripheral>>>,
}

impl BtleplugTransport {
    /// Open the adapter at `adapter_index` in the system's adapter list
    pub async fn open(adapter_index: usize, scan_duration: Duration) -> Result<Self, LinkError> {
        let manager = Manager::new().await.map_err(transport_error)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(transport_error)?
            .into_iter()
            .nth(adapter_index)
            .ok_or_else(|| {
                LinkError::Transport(format!("No Bluetooth adapter at index {}", adapter_index))
            })?;

        let info = adapter.adapter_info().await.map_err(transport_error)?;
        info!(adapter = %info, "Opened Bluetooth adapter");

        Ok(Self {
            adapter,
            scan_duration,
            scanned: RwLock::new(Vec::new()),
        })
    }
}

#[async_trait]
impl BleTransport for BtleplugTransport {
    type Handle = Peripheral;

    async fn scanned_devices(&self) -> Vec<ScannedDevice<Peripheral>> {
        self.scanned.read().await.clone()
    }

    async fn scan_devices(&self) -> Result<usize, LinkError> {
        info!(duration = ?self.scan_duration, "Scanning for BLE devices");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(transport_error)?;
        tokio::time::sleep(self.scan_duration).await;
        self.adapter.stop_scan().await.map_err(transport_error)?;

        let peripherals = self.adapter.peripherals().await.map_err(transport_error)?;
        let devices: Vec<_> = peripherals
            .into_iter()
            .map(|p| ScannedDevice::new(p.address().to_string(), p))
            .collect();

        for device in &devices {
            debug!(device = %device.address, "Found BLE device");
        }

        let count = devices.len();
        *self.scanned.write().await = devices;
        info!(found = count, "Scan complete");

        Ok(count)
    }

    async fn is_connected(&self, handle: &Peripheral) -> Result<bool, LinkError> {
        handle.is_connected().await.map_err(transport_error)
    }

    async fn connect(&self, handle: &Peripheral) -> Result<(), LinkError> {
        let address = handle.address().to_string();
        let failed = |e: btleplug::Error| match transport_error(e) {
            LinkError::Transport(reason) => LinkError::ConnectionFailed {
                address: address.clone(),
                reason,
            },
            fault => fault,
        };

        handle.connect().await.map_err(failed)?;
        handle.discover_services().await.map_err(failed)?;

        info!(device = %address, "Connected");
        Ok(())
    }

    async fn read_characteristic(
        &self,
        handle: &Peripheral,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, LinkError> {
        let target = handle
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or_else(|| {
                LinkError::Transport(format!(
                    "Device {} does not expose characteristic {}",
                    handle.address(),
                    characteristic
                ))
            })?;

        handle.read(&target).await.map_err(|e| match e {
            btleplug::Error::NotConnected => LinkError::ConnectionFailed {
                address: handle.address().to_string(),
                reason: "link dropped before read".to_string(),
            },
            other => transport_error(other),
        })
    }
}

/// Sort btleplug errors into the link taxonomy.
///
/// Conditions a sensor or the radio can cause are transport failures.
/// Callback mismatches and platform backend errors btleplug passes through
/// as `Other` are faults.
fn transport_error(e: btleplug::Error) -> LinkError {
    match e {
        btleplug::Error::Other(_)
        | btleplug::Error::UnexpectedCallback
        | btleplug::Error::UnexpectedCharacteristic => LinkError::Fault(anyhow::Error::new(e)),
        other => LinkError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_are_faults() {
        let backend = btleplug::Error::Other("dbus connection lost".into());
        assert!(matches!(transport_error(backend), LinkError::Fault(_)));
        assert!(matches!(
            transport_error(btleplug::Error::UnexpectedCallback),
            LinkError::Fault(_)
        ));
    }

    #[test]
    fn test_radio_errors_are_expected() {
        let error = transport_error(btleplug::Error::TimedOut(Duration::from_secs(1)));
        assert!(matches!(error, LinkError::Transport(_)));
        assert!(error.is_expected());

        let error = transport_error(btleplug::Error::RuntimeError("adapter busy".to_string()));
        assert!(error.is_expected());
    }
}
