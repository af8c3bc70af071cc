//! Connection manager: address lookup, idempotent linking and bounded reads

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::transport::{BleTransport, LinkError, ScannedDevice};

/// Upper bound for establishing a link
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for a single characteristic read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// A device whose link is known to be up
#[derive(Debug, Clone)]
pub struct ActiveLink<H> {
    pub address: String,
    pub handle: H,
}

pub struct ConnectionManager<T: BleTransport> {
    transport: Arc<T>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl<T: BleTransport> ConnectionManager<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, read_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.read_timeout = read_timeout;
        self
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Make sure the device at `address` has a live link.
    ///
    /// The address must match a scanned device exactly. A device that is
    /// already linked is returned as-is without touching the transport's
    /// connect path.
    pub async fn ensure(
        &self,
        address: &str,
        scanned: &[ScannedDevice<T::Handle>],
    ) -> Result<ActiveLink<T::Handle>, LinkError> {
        let device = scanned
            .iter()
            .find(|d| d.address == address)
            .ok_or_else(|| LinkError::DeviceNotFound {
                address: address.to_string(),
            })?;

        match timeout(self.connect_timeout, self.establish(device)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(LinkError::ConnectionFailed {
                    address: address.to_string(),
                    reason: format!("no link after {:?}", self.connect_timeout),
                })
            }
        }

        Ok(ActiveLink {
            address: device.address.clone(),
            handle: device.handle.clone(),
        })
    }

    async fn establish(&self, device: &ScannedDevice<T::Handle>) -> Result<(), LinkError> {
        if self.transport.is_connected(&device.handle).await? {
            trace!(device = %device.address, "Link already up");
            return Ok(());
        }

        debug!(device = %device.address, "Establishing link");
        self.transport.connect(&device.handle).await
    }

    /// Read one characteristic over an established link
    pub async fn read(
        &self,
        link: &ActiveLink<T::Handle>,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, LinkError> {
        let read = self
            .transport
            .read_characteristic(&link.handle, characteristic);

        let raw = timeout(self.read_timeout, read)
            .await
            .map_err(|_| LinkError::ReadTimeout {
                address: link.address.clone(),
                after: self.read_timeout,
            })??;

        trace!(device = %link.address, bytes = raw.len(), "Read characteristic");
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    const ADDR: &str = "C8:FD:19:4A:07:B2";
    const CHAR: Uuid = Uuid::from_u128(0x00002a58_0000_1000_8000_00805f9b34fb);

    fn manager(transport: &Arc<MockTransport>) -> ConnectionManager<MockTransport> {
        ConnectionManager::new(transport.clone())
            .with_timeouts(Duration::from_millis(50), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_ensure_unknown_address() {
        let transport = Arc::new(MockTransport::new().with_device(ADDR, vec![]));
        let scanned = transport.scanned_devices().await;

        let err = manager(&transport)
            .ensure("C8:FD:19:4A:07:FF", &scanned)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::DeviceNotFound { address } if address == "C8:FD:19:4A:07:FF"));
        assert_eq!(transport.connect_calls(), 0);
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let transport = Arc::new(MockTransport::new().with_device(ADDR, vec![]));
        let scanned = transport.scanned_devices().await;
        let manager = manager(&transport);

        let first = manager.ensure(ADDR, &scanned).await.unwrap();
        let second = manager.ensure(ADDR, &scanned).await.unwrap();

        assert_eq!(first.address, ADDR);
        assert_eq!(second.address, ADDR);
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_ensure_connection_refused() {
        let transport = Arc::new(MockTransport::new().with_device(ADDR, vec![]));
        transport.refuse_connect(ADDR);
        let scanned = transport.scanned_devices().await;

        let err = manager(&transport).ensure(ADDR, &scanned).await.unwrap_err();
        assert!(matches!(err, LinkError::ConnectionFailed { .. }));
    }

    #[tokio::test]
    async fn test_ensure_times_out_as_connection_failure() {
        let transport = Arc::new(MockTransport::new().with_device(ADDR, vec![]));
        transport.hang_connect(ADDR);
        let scanned = transport.scanned_devices().await;

        let err = manager(&transport).ensure(ADDR, &scanned).await.unwrap_err();
        assert!(matches!(err, LinkError::ConnectionFailed { address, .. } if address == ADDR));
    }

    #[tokio::test]
    async fn test_read_returns_raw_buffer() {
        let transport = Arc::new(MockTransport::new().with_device(ADDR, vec![1, 0, 2, 0]));
        let scanned = transport.scanned_devices().await;
        let manager = manager(&transport);

        let link = manager.ensure(ADDR, &scanned).await.unwrap();
        assert_eq!(manager.read(&link, CHAR).await.unwrap(), vec![1, 0, 2, 0]);
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let transport = Arc::new(MockTransport::new().with_device(ADDR, vec![1, 0]));
        transport.hang_read(ADDR);
        let scanned = transport.scanned_devices().await;
        let manager = manager(&transport);

        let link = manager.ensure(ADDR, &scanned).await.unwrap();
        let err = manager.read(&link, CHAR).await.unwrap_err();
        assert!(matches!(err, LinkError::ReadTimeout { .. }));
    }
}
