//! In-memory transport for exercising the poll pipeline without a radio

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

use crate::transport::{BleTransport, LinkError, ScannedDevice};

#[derive(Default)]
struct MockState {
    /// Devices in radio range, with the buffer their characteristic returns
    in_range: Vec<(String, Vec<u8>)>,
    scanned: Vec<String>,
    connected: HashSet<String>,
    refuse_connect: HashSet<String>,
    hang_connect: HashSet<String>,
    hang_read: HashSet<String>,
    broken_read: HashSet<String>,
    faulty_read: HashSet<String>,
    scan_calls: usize,
    connect_calls: usize,
    reads: Vec<String>,
}

/// Transport whose handles are plain addresses.
///
/// Devices added with [`MockTransport::with_device`] are in range and already
/// part of the scanned set; [`MockTransport::with_unscanned_device`] only puts
/// them in range, so they appear after the next `scan_devices` call.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, address: &str, raw: Vec<u8>) -> Self {
        {
            let mut state = self.lock();
            state.in_range.push((address.to_string(), raw));
            state.scanned.push(address.to_string());
        }
        self
    }

    pub fn with_unscanned_device(self, address: &str, raw: Vec<u8>) -> Self {
        self.lock().in_range.push((address.to_string(), raw));
        self
    }

    pub fn refuse_connect(&self, address: &str) {
        self.lock().refuse_connect.insert(address.to_string());
    }

    pub fn hang_connect(&self, address: &str) {
        self.lock().hang_connect.insert(address.to_string());
    }

    pub fn hang_read(&self, address: &str) {
        self.lock().hang_read.insert(address.to_string());
    }

    /// Reads fail with a generic transport error
    pub fn break_read(&self, address: &str) {
        self.lock().broken_read.insert(address.to_string());
    }

    /// Reads fail with an error outside the expected taxonomy
    pub fn fault_read(&self, address: &str) {
        self.lock().faulty_read.insert(address.to_string());
    }

    pub fn scan_calls(&self) -> usize {
        self.lock().scan_calls
    }

    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    /// Addresses read from, in call order
    pub fn reads(&self) -> Vec<String> {
        self.lock().reads.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    type Handle = String;

    async fn scanned_devices(&self) -> Vec<ScannedDevice<String>> {
        self.lock()
            .scanned
            .iter()
            .map(|address| ScannedDevice::new(address.clone(), address.clone()))
            .collect()
    }

    async fn scan_devices(&self) -> Result<usize, LinkError> {
        let mut state = self.lock();
        state.scan_calls += 1;
        let found: Vec<String> = state.in_range.iter().map(|(a, _)| a.clone()).collect();
        state.scanned = found;
        Ok(state.scanned.len())
    }

    async fn is_connected(&self, handle: &String) -> Result<bool, LinkError> {
        Ok(self.lock().connected.contains(handle))
    }

    async fn connect(&self, handle: &String) -> Result<(), LinkError> {
        let hang = {
            let mut state = self.lock();
            state.connect_calls += 1;
            if state.refuse_connect.contains(handle) {
                return Err(LinkError::ConnectionFailed {
                    address: handle.clone(),
                    reason: "connection refused".to_string(),
                });
            }
            state.hang_connect.contains(handle)
        };

        if hang {
            std::future::pending::<()>().await;
        }

        self.lock().connected.insert(handle.clone());
        Ok(())
    }

    async fn read_characteristic(
        &self,
        handle: &String,
        _characteristic: Uuid,
    ) -> Result<Vec<u8>, LinkError> {
        let (hang, raw) = {
            let mut state = self.lock();
            state.reads.push(handle.clone());

            if state.broken_read.contains(handle) {
                return Err(LinkError::Transport(format!("GATT read failed on {}", handle)));
            }
            if state.faulty_read.contains(handle) {
                return Err(LinkError::Fault(anyhow::anyhow!(
                    "characteristic cache corrupted for {}",
                    handle
                )));
            }

            let raw = state
                .in_range
                .iter()
                .find(|(a, _)| a == handle)
                .map(|(_, raw)| raw.clone())
                .unwrap_or_default();
            (state.hang_read.contains(handle), raw)
        };

        if hang {
            std::future::pending::<()>().await;
        }

        Ok(raw)
    }
}
