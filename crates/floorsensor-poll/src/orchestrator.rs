//! Poll orchestrator: one pass over all intended devices per cycle

use chrono::{DateTime, Utc};
use floorsensor_ble::{BleTransport, ConnectionManager, LinkError, ScannedDevice};
use floorsensor_core::{assemble, CycleStats, IntendedDevice, OutboundEvent, ReadingDecoder};
use floorsensor_mqtt::{dispatch, Publisher};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::source::TopologySource;

/// GATT "Analog" characteristic the sensor firmware exposes its slots on
pub const SENSOR_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a58_0000_1000_8000_00805f9b34fb);

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Pause between the end of one cycle and the start of the next
    pub sensor_read_delay: Duration,
    /// Pause after a device yielded no valid readings
    pub unsuccessful_task_delay: Duration,
    /// Topic prefix; events go to `<prefix>/<checkerboard_id>`
    pub topic_prefix: String,
    pub sensor_characteristic: Uuid,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            sensor_read_delay: Duration::from_millis(500),
            unsuccessful_task_delay: Duration::from_millis(1000),
            topic_prefix: "sensor".to_string(),
            sensor_characteristic: SENSOR_CHARACTERISTIC,
            connect_timeout: floorsensor_ble::DEFAULT_CONNECT_TIMEOUT,
            read_timeout: floorsensor_ble::DEFAULT_READ_TIMEOUT,
        }
    }
}

/// What happened to one device during a cycle
#[derive(Debug)]
pub enum DeviceOutcome {
    /// Events were handed to the publisher
    Published { events: usize },
    /// The device was read but no slot held a valid value
    Idle,
    /// Device missing, unreachable or the read failed
    Failed(LinkError),
    /// An error outside the expected hardware failures
    Fault(String),
}

#[derive(Debug)]
pub struct DeviceReport {
    pub address: String,
    pub outcome: DeviceOutcome,
}

/// Summary of one completed cycle
#[derive(Debug)]
pub struct CycleReport {
    /// 1-based cycle number
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Whether the cycle had to scan because no devices were known
    pub scanned: bool,
    pub devices: Vec<DeviceReport>,
    /// Statistics including this cycle
    pub stats: CycleStats,
    /// Publish tasks started by this cycle, one per published device
    pub dispatches: Vec<JoinHandle<usize>>,
}

impl CycleReport {
    /// Total events handed to the publisher
    pub fn published(&self) -> usize {
        self.devices
            .iter()
            .map(|d| match d.outcome {
                DeviceOutcome::Published { events } => events,
                _ => 0,
            })
            .sum()
    }

    pub fn failed(&self) -> usize {
        self.devices
            .iter()
            .filter(|d| matches!(d.outcome, DeviceOutcome::Failed(_)))
            .count()
    }

    pub fn faults(&self) -> usize {
        self.devices
            .iter()
            .filter(|d| matches!(d.outcome, DeviceOutcome::Fault(_)))
            .count()
    }

    pub fn outcome(&self, address: &str) -> Option<&DeviceOutcome> {
        self.devices
            .iter()
            .find(|d| d.address == address)
            .map(|d| &d.outcome)
    }

    /// Wait for this cycle's publish tasks and return how many events the
    /// publisher accepted.
    pub async fn wait_for_publishes(self) -> usize {
        let mut delivered = 0;
        for handle in self.dispatches {
            match handle.await {
                Ok(count) => delivered += count,
                Err(e) => warn!(error = %e, "Publish task did not complete"),
            }
        }
        delivered
    }
}

/// Drives the poll-read-parse-publish pipeline
pub struct PollOrchestrator<T: BleTransport, S: TopologySource> {
    config: PollConfig,
    connections: ConnectionManager<T>,
    topology: S,
    decoder: Box<dyn ReadingDecoder>,
    publisher: Arc<dyn Publisher>,
    stats: CycleStats,
}

impl<T: BleTransport, S: TopologySource> PollOrchestrator<T, S> {
    pub fn new(
        config: PollConfig,
        transport: Arc<T>,
        topology: S,
        decoder: Box<dyn ReadingDecoder>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let connections = ConnectionManager::new(transport)
            .with_timeouts(config.connect_timeout, config.read_timeout);

        Self {
            config,
            connections,
            topology,
            decoder,
            publisher,
            stats: CycleStats::new(),
        }
    }

    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    /// Run one pass over all enabled intended devices.
    ///
    /// Never fails: every per-device error is logged and recorded in the
    /// returned report.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let start = Instant::now();
        let started_at = Utc::now();
        info!("-- GATT read sensor cycle");

        let transport = self.connections.transport().clone();
        let mut scanned = transport.scanned_devices().await;
        let intended = match self.topology.intended_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "Sensor topology unavailable, no devices polled this cycle");
                Vec::new()
            }
        };

        debug!(
            scanned = %addresses_json(scanned.iter().map(|d| d.address.as_str())),
            intended = %addresses_json(intended.iter().map(|d| d.address.as_str())),
            "Device sets"
        );

        let needs_scan = scanned.is_empty();
        if needs_scan {
            info!("No scanned devices, scanning before polling");
            match transport.scan_devices().await {
                Ok(found) => debug!(found = found, "Bootstrap scan finished"),
                Err(e) => warn!(error = %e, "Bootstrap scan failed"),
            }
            scanned = transport.scanned_devices().await;
        }

        let mut devices = Vec::new();
        let mut dispatches = Vec::new();
        for device in intended.iter().filter(|d| d.enabled) {
            let outcome = self.poll_device(device, &scanned, &mut dispatches).await;

            if matches!(outcome, DeviceOutcome::Idle) {
                tokio::time::sleep(self.config.unsuccessful_task_delay).await;
            }

            devices.push(DeviceReport {
                address: device.address.clone(),
                outcome,
            });
        }

        let duration = start.elapsed();
        self.stats.record(duration);

        let report = CycleReport {
            cycle: self.stats.count,
            started_at,
            duration,
            scanned: needs_scan,
            devices,
            stats: self.stats,
            dispatches,
        };

        info!(
            cycle = report.cycle,
            millis = duration.as_millis() as u64,
            min = ?self.stats.min,
            max = ?self.stats.max,
            devices = report.devices.len(),
            published = report.published(),
            failed = report.failed(),
            faults = report.faults(),
            "-- End of cycle"
        );

        report
    }

    /// Per-device failure boundary
    async fn poll_device(
        &self,
        device: &IntendedDevice,
        scanned: &[ScannedDevice<T::Handle>],
        dispatches: &mut Vec<JoinHandle<usize>>,
    ) -> DeviceOutcome {
        info!(
            device = %device.address,
            sensors = device.sensor_count(),
            "Intended device"
        );

        match self.read_events(device, scanned).await {
            Ok(events) if events.is_empty() => {
                info!(device = %device.address, "No valid readings");
                DeviceOutcome::Idle
            }
            Ok(events) => {
                let count = events.len();
                // The task reports its own publish failures; the cycle never waits on it
                dispatches.push(dispatch(
                    self.publisher.clone(),
                    device.address.clone(),
                    events,
                ));
                DeviceOutcome::Published { events: count }
            }
            Err(e) if e.is_expected() => {
                error!(device = %device.address, error = %e, "Device poll failed");
                DeviceOutcome::Failed(e)
            }
            Err(e) => {
                error!(
                    device = %device.address,
                    error = ?e,
                    "Unexpected fault while polling device, skipping its remaining steps"
                );
                DeviceOutcome::Fault(e.to_string())
            }
        }
    }

    async fn read_events(
        &self,
        device: &IntendedDevice,
        scanned: &[ScannedDevice<T::Handle>],
    ) -> Result<Vec<OutboundEvent>, LinkError> {
        let link = self.connections.ensure(&device.address, scanned).await?;
        let raw = self
            .connections
            .read(&link, self.config.sensor_characteristic)
            .await?;

        let decoded = self.decoder.decode(&raw);
        trace!(device = %device.address, slots = decoded.len(), "Decoded reading");

        Ok(assemble(&decoded, &device.cables, &self.config.topic_prefix))
    }

    /// Run cycles until `shutdown` resolves.
    ///
    /// The next cycle starts `sensor_read_delay` after the previous one
    /// finished, so cycles never overlap.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(delay = ?self.config.sensor_read_delay, "Poll loop started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(cycles = self.stats.count, "Poll loop stopped");
                    break;
                }
                _ = self.cycle_then_wait() => {}
            }
        }
    }

    async fn cycle_then_wait(&mut self) {
        self.run_cycle().await;
        tokio::time::sleep(self.config.sensor_read_delay).await;
    }
}

fn addresses_json<'a>(addresses: impl Iterator<Item = &'a str>) -> String {
    serde_json::to_string(&addresses.collect::<Vec<_>>()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use floorsensor_ble::mock::MockTransport;
    use floorsensor_core::{Cable, Sensor, SensorTopology, SentientDecoder, INVALID_VALUE};
    use floorsensor_mqtt::PublishError;
    use tokio::sync::mpsc;

    use crate::scanner::DeviceScanner;
    use crate::source::StaticTopology;

    const DEV_A: &str = "C8:FD:19:4A:07:B2";
    const DEV_B: &str = "C8:FD:19:4A:07:B3";

    struct ChannelPublisher(mpsc::UnboundedSender<OutboundEvent>);

    #[async_trait]
    impl Publisher for ChannelPublisher {
        async fn publish(&self, event: &OutboundEvent) -> Result<(), PublishError> {
            self.0.send(event.clone()).map_err(|_| PublishError::Closed)
        }
    }

    fn raw(words: &[u16]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn device(address: &str, ids: &[&str]) -> IntendedDevice {
        IntendedDevice::new(
            address,
            vec![Cable::new(ids.iter().map(|id| Sensor::new(*id)).collect())],
        )
    }

    fn test_config() -> PollConfig {
        PollConfig {
            sensor_read_delay: Duration::from_millis(10),
            unsuccessful_task_delay: Duration::from_millis(20),
            connect_timeout: Duration::from_millis(100),
            read_timeout: Duration::from_millis(100),
            ..Default::default()
        }
    }

    fn orchestrator(
        transport: &Arc<MockTransport>,
        devices: Vec<IntendedDevice>,
    ) -> (
        PollOrchestrator<MockTransport, StaticTopology>,
        mpsc::UnboundedReceiver<OutboundEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let orchestrator = PollOrchestrator::new(
            test_config(),
            transport.clone(),
            StaticTopology::new(SensorTopology::new(devices)),
            Box::new(SentientDecoder),
            Arc::new(ChannelPublisher(tx)),
        );
        (orchestrator, rx)
    }

    async fn receive(
        rx: &mut mpsc::UnboundedReceiver<OutboundEvent>,
        n: usize,
    ) -> Vec<OutboundEvent> {
        let mut events = Vec::new();
        for _ in 0..n {
            let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("publish did not arrive")
                .expect("publisher channel closed");
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_invalid_slot_not_published() {
        let transport =
            Arc::new(MockTransport::new().with_device(DEV_A, raw(&[0, 10, INVALID_VALUE, 30])));
        let (mut orchestrator, mut rx) =
            orchestrator(&transport, vec![device(DEV_A, &["A", "B", "C"])]);

        let report = orchestrator.run_cycle().await;
        assert!(matches!(
            report.outcome(DEV_A),
            Some(DeviceOutcome::Published { events: 2 })
        ));

        let events = receive(&mut rx, 2).await;
        assert_eq!(
            events,
            vec![
                OutboundEvent::new("sensor/A", "10"),
                OutboundEvent::new("sensor/C", "30"),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_device_does_not_block_next_device() {
        let transport = Arc::new(MockTransport::new().with_device(DEV_B, raw(&[0, 7])));
        let (mut orchestrator, mut rx) = orchestrator(
            &transport,
            vec![device(DEV_A, &["A1"]), device(DEV_B, &["B1"])],
        );

        let report = orchestrator.run_cycle().await;

        assert!(matches!(
            report.outcome(DEV_A),
            Some(DeviceOutcome::Failed(LinkError::DeviceNotFound { .. }))
        ));
        assert!(matches!(
            report.outcome(DEV_B),
            Some(DeviceOutcome::Published { events: 1 })
        ));
        assert_eq!(receive(&mut rx, 1).await, vec![OutboundEvent::new("sensor/B1", "7")]);
    }

    #[tokio::test]
    async fn test_connection_and_transport_failures_are_isolated() {
        const DEV_C: &str = "C8:FD:19:4A:07:B4";
        let transport = Arc::new(
            MockTransport::new()
                .with_device(DEV_A, raw(&[0, 1]))
                .with_device(DEV_B, raw(&[0, 2]))
                .with_device(DEV_C, raw(&[0, 3])),
        );
        transport.refuse_connect(DEV_A);
        transport.break_read(DEV_B);

        let (mut orchestrator, mut rx) = orchestrator(
            &transport,
            vec![
                device(DEV_A, &["A1"]),
                device(DEV_B, &["B1"]),
                device(DEV_C, &["C1"]),
            ],
        );

        let report = orchestrator.run_cycle().await;

        assert!(matches!(
            report.outcome(DEV_A),
            Some(DeviceOutcome::Failed(LinkError::ConnectionFailed { .. }))
        ));
        assert!(matches!(
            report.outcome(DEV_B),
            Some(DeviceOutcome::Failed(LinkError::Transport(_)))
        ));
        assert_eq!(report.failed(), 2);
        assert_eq!(receive(&mut rx, 1).await, vec![OutboundEvent::new("sensor/C1", "3")]);
    }

    #[tokio::test]
    async fn test_fault_reported_without_aborting_cycle() {
        let transport = Arc::new(
            MockTransport::new()
                .with_device(DEV_A, raw(&[0, 1]))
                .with_device(DEV_B, raw(&[0, 2])),
        );
        transport.fault_read(DEV_A);

        let (mut orchestrator, mut rx) = orchestrator(
            &transport,
            vec![device(DEV_A, &["A1"]), device(DEV_B, &["B1"])],
        );

        let report = orchestrator.run_cycle().await;

        assert!(matches!(report.outcome(DEV_A), Some(DeviceOutcome::Fault(_))));
        assert_eq!(report.faults(), 1);
        assert_eq!(report.failed(), 0);
        assert_eq!(receive(&mut rx, 1).await, vec![OutboundEvent::new("sensor/B1", "2")]);
    }

    #[tokio::test]
    async fn test_empty_scan_set_triggers_single_scan() {
        let transport = Arc::new(MockTransport::new().with_unscanned_device(DEV_A, raw(&[0, 5])));
        let (mut orchestrator, mut rx) = orchestrator(&transport, vec![device(DEV_A, &["A1"])]);

        let report = orchestrator.run_cycle().await;
        assert!(report.scanned);
        assert_eq!(transport.scan_calls(), 1);
        // The freshly scanned device is polled in the same cycle
        assert_eq!(receive(&mut rx, 1).await, vec![OutboundEvent::new("sensor/A1", "5")]);

        let report = orchestrator.run_cycle().await;
        assert!(!report.scanned);
        assert_eq!(transport.scan_calls(), 1);
    }

    #[tokio::test]
    async fn test_late_device_polled_after_scheduled_scan() {
        let transport = Arc::new(
            MockTransport::new()
                .with_device(DEV_A, raw(&[0, 1]))
                .with_unscanned_device(DEV_B, raw(&[0, 2])),
        );
        let (mut orchestrator, mut rx) = orchestrator(
            &transport,
            vec![device(DEV_A, &["A1"]), device(DEV_B, &["B1"])],
        );

        let report = orchestrator.run_cycle().await;
        assert!(matches!(
            report.outcome(DEV_B),
            Some(DeviceOutcome::Failed(LinkError::DeviceNotFound { .. }))
        ));
        assert_eq!(transport.scan_calls(), 0);
        receive(&mut rx, 1).await;

        let scanner = DeviceScanner::new(transport.clone(), Duration::from_millis(10));
        let task = tokio::spawn(async move { scanner.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();
        assert!(transport.scan_calls() >= 1);

        let report = orchestrator.run_cycle().await;
        assert!(!report.scanned);
        assert!(matches!(
            report.outcome(DEV_B),
            Some(DeviceOutcome::Published { events: 1 })
        ));
        let mut events = receive(&mut rx, 2).await;
        events.sort_by(|a, b| a.topic.cmp(&b.topic));
        assert_eq!(
            events,
            vec![
                OutboundEvent::new("sensor/A1", "1"),
                OutboundEvent::new("sensor/B1", "2"),
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_for_publishes_counts_delivered_events() {
        let transport = Arc::new(
            MockTransport::new()
                .with_device(DEV_A, raw(&[0, 1, 2]))
                .with_device(DEV_B, raw(&[0, 3])),
        );
        let (mut orchestrator, mut rx) = orchestrator(
            &transport,
            vec![device(DEV_A, &["A1", "A2"]), device(DEV_B, &["B1"])],
        );

        let report = orchestrator.run_cycle().await;
        assert_eq!(report.dispatches.len(), 2);
        assert_eq!(report.published(), 3);

        assert_eq!(report.wait_for_publishes().await, 3);
        // Everything is already in the channel once the wait returns
        for _ in 0..3 {
            assert!(rx.try_recv().is_ok());
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disabled_devices_are_skipped() {
        let transport = Arc::new(
            MockTransport::new()
                .with_device(DEV_A, raw(&[0, 1]))
                .with_device(DEV_B, raw(&[0, 2])),
        );
        let (mut orchestrator, _rx) = orchestrator(
            &transport,
            vec![device(DEV_A, &["A1"]).disabled(), device(DEV_B, &["B1"])],
        );

        let report = orchestrator.run_cycle().await;

        assert_eq!(report.devices.len(), 1);
        assert!(report.outcome(DEV_A).is_none());
        assert_eq!(transport.reads(), vec![DEV_B.to_string()]);
    }

    #[tokio::test]
    async fn test_all_invalid_readings_cool_down() {
        let transport = Arc::new(
            MockTransport::new().with_device(DEV_A, raw(&[0, INVALID_VALUE, INVALID_VALUE])),
        );
        let (mut orchestrator, mut rx) =
            orchestrator(&transport, vec![device(DEV_A, &["A1", "A2", "A3"])]);

        let report = orchestrator.run_cycle().await;

        assert!(matches!(report.outcome(DEV_A), Some(DeviceOutcome::Idle)));
        assert!(report.duration >= test_config().unsuccessful_task_delay);
        assert_eq!(report.failed(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stats_skip_first_cycle() {
        let transport = Arc::new(MockTransport::new().with_device(DEV_A, raw(&[0, 1])));
        let (mut orchestrator, _rx) = orchestrator(&transport, vec![device(DEV_A, &["A1"])]);

        let first = orchestrator.run_cycle().await;
        assert_eq!(first.cycle, 1);
        assert_eq!(first.stats.min, None);
        assert_eq!(first.stats.max, None);

        let second = orchestrator.run_cycle().await;
        assert_eq!(second.cycle, 2);
        assert_eq!(second.stats.min, Some(second.duration));
        assert_eq!(second.stats.max, Some(second.duration));
        assert_eq!(orchestrator.stats().count, 2);
    }

    #[tokio::test]
    async fn test_independent_orchestrators_have_independent_stats() {
        let transport = Arc::new(MockTransport::new().with_device(DEV_A, raw(&[0, 1])));
        let (mut first, _rx1) = orchestrator(&transport, vec![device(DEV_A, &["A1"])]);
        let (second, _rx2) = orchestrator(&transport, vec![device(DEV_A, &["A1"])]);

        first.run_cycle().await;
        first.run_cycle().await;

        assert_eq!(first.stats().count, 2);
        assert_eq!(second.stats(), CycleStats::new());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let transport = Arc::new(MockTransport::new().with_device(DEV_A, raw(&[0, 1])));
        let (mut orchestrator, mut rx) = orchestrator(&transport, vec![device(DEV_A, &["A1"])]);

        orchestrator
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await;

        assert!(orchestrator.stats().count >= 1);
        assert_eq!(receive(&mut rx, 1).await, vec![OutboundEvent::new("sensor/A1", "1")]);
    }
}
