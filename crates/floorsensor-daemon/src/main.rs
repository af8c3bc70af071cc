//! Floorsensor Daemon - Main entry point
//!
//! Polls the configured BLE floor sensor devices and publishes their
//! readings to the MQTT broker.

mod config;

use anyhow::Result;
use clap::Parser;
use floorsensor_ble::{BleTransport, BtleplugTransport};
use floorsensor_core::SentientDecoder;
use floorsensor_mqtt::MqttPublisher;
use floorsensor_poll::{DeviceOutcome, DeviceScanner, FileTopology, PollOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// How long shutdown waits for the MQTT client to flush and disconnect
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "floorsensor")]
#[command(about = "Bridge between BLE floor sensor devices and an MQTT broker")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "floorsensor.toml")]
    config: PathBuf,

    /// Path to sensor topology file (overrides the configuration)
    #[arg(short, long)]
    topology: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    init_config: bool,

    /// Run a single BLE scan, list the devices found and exit
    #[arg(long)]
    scan_once: bool,

    /// Run a single poll cycle and exit
    #[arg(long)]
    cycle_once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Sentient floor sensor bridge v{}", env!("CARGO_PKG_VERSION"));

    if args.init_config {
        config::save_default_config(&args.config)?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    if let Some(topology) = args.topology {
        config.topology.path = topology;
    }

    info!(
        topology = %config.topology.path.display(),
        broker = %format!("{}:{}", config.mqtt.host, config.mqtt.port),
        delay_ms = config.daemon.sensor_read_delay_ms,
        "Configuration loaded"
    );

    let transport =
        Arc::new(BtleplugTransport::open(config.ble.adapter, config.scan_duration()).await?);

    if args.scan_once {
        info!("Running single BLE scan");
        transport.scan_devices().await?;
        let devices = transport.scanned_devices().await;
        println!("Discovered {} devices:", devices.len());
        for device in devices {
            println!("  - {}", device.address);
        }
        return Ok(());
    }

    let (publisher, mqtt_driver) = MqttPublisher::connect(&config.to_mqtt_config());
    let publisher = Arc::new(publisher);

    let topology = FileTopology::new(&config.topology.path);
    info!(path = %topology.path().display(), "Sensor topology source");

    let mut orchestrator = PollOrchestrator::new(
        config.to_poll_config(),
        transport.clone(),
        topology,
        Box::new(SentientDecoder),
        publisher.clone(),
    );

    if args.cycle_once {
        let report = orchestrator.run_cycle().await;
        println!(
            "Cycle started {} finished in {} ms, {} events published:",
            report.started_at.to_rfc3339(),
            report.duration.as_millis(),
            report.published()
        );
        for device in &report.devices {
            let outcome = match &device.outcome {
                DeviceOutcome::Published { events } => format!("{} events", events),
                DeviceOutcome::Idle => "no valid readings".to_string(),
                DeviceOutcome::Failed(e) => e.to_string(),
                DeviceOutcome::Fault(e) => format!("fault: {}", e),
            };
            println!("  - {}: {}", device.address, outcome);
        }
        let delivered = report.wait_for_publishes().await;
        info!(delivered = delivered, "Cycle publishes handed to MQTT client");
    } else {
        let scan_task = config.scan_interval().map(|interval| {
            let scanner = DeviceScanner::new(transport.clone(), interval);
            tokio::spawn(async move { scanner.run().await })
        });

        orchestrator.run(shutdown_signal()).await;

        if let Some(task) = scan_task {
            task.abort();
        }
    }

    publisher.disconnect().await;
    if tokio::time::timeout(DISCONNECT_TIMEOUT, mqtt_driver)
        .await
        .is_err()
    {
        warn!("MQTT client did not disconnect in time");
    }

    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
