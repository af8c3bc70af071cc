//! Periodic BLE scan keeping the transport's scanned set fresh

use floorsensor_ble::{BleTransport, LinkError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default pause between two scheduled scans
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Rescans on a fixed schedule so devices powered on after startup are
/// picked up by later poll cycles.
pub struct DeviceScanner<T: BleTransport> {
    transport: Arc<T>,
    interval: Duration,
}

impl<T: BleTransport> DeviceScanner<T> {
    pub fn new(transport: Arc<T>, interval: Duration) -> Self {
        Self {
            transport,
            interval,
        }
    }

    /// Run a single scan
    pub async fn scan_once(&self) -> Result<usize, LinkError> {
        let found = self.transport.scan_devices().await?;
        debug!(found = found, "Scheduled scan finished");
        Ok(found)
    }

    /// Scan every `interval` until the task is dropped or aborted.
    ///
    /// The first scan happens one interval after start; the poll cycle
    /// bootstraps the scanned set on its own. A failed scan is logged and
    /// retried on the next tick.
    pub async fn run(&self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, "Scan scheduler started");

        loop {
            ticker.tick().await;

            if let Err(e) = self.scan_once().await {
                warn!(error = %e, "Scheduled scan failed");
            }
        }
    }
}
