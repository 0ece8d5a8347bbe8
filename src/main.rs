//! Booth controller - kiosk booth session orchestration
//!
//! Detects QR admission tokens, actuates the booth door and light, runs the
//! external playback workflow under supervision, and deterministically
//! returns the booth to a scan-ready state on every exit path.
//!
//! Module structure:
//! - `domain/` - Core types (Event, QrPayload, Session)
//! - `io/` - External interfaces (Camera, QR decoder, Payment, Media)
//! - `services/` - Business logic (Gate, Actuators, Playback, Booth)
//! - `infra/` - Infrastructure (Config, Event bus, Metrics)

use booth_controller::infra::{Config, EventBus, Metrics};
use booth_controller::io::{
    verifier_from_config, MediaLibrary, PassthroughDecoder, SpoolCameraProvider,
};
use booth_controller::services::{
    ActuatorController, BoothController, PlaybackSupervisor, QrAdmissionGate, StubBackend,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Booth controller - interactive kiosk booth session driver
#[derive(Parser, Debug)]
#[command(name = "booth-controller", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("booth-controller starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        booth_id = %config.booth_id(),
        cooldown_secs = %config.cooldown_secs(),
        playback_command = %config.playback_command(),
        playback_timeout_secs = %config.playback_timeout_secs(),
        spool_file = %config.spool_file(),
        media_base_path = %config.media_base_path(),
        "config_loaded"
    );

    // Verify the media inventory; missing clips are warnings, the playback
    // workflow carries its own local fallbacks
    let media = MediaLibrary::new(&config);
    media.check_inventory();

    // Event bus and its stop signal; the orchestrator fires the signal as
    // the final shutdown step
    let mut bus = EventBus::new(
        config.bus_capacity(),
        Duration::from_millis(config.bus_poll_interval_ms()),
    );
    let (bus_stop_tx, bus_stop_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Create shared components
    let actuators = Arc::new(ActuatorController::new(
        &config,
        Arc::new(StubBackend),
        bus.publisher(),
        metrics.clone(),
    ));
    let gate = Arc::new(QrAdmissionGate::new(
        &config,
        Arc::new(SpoolCameraProvider::new(config.spool_file())),
        Arc::new(PassthroughDecoder),
        verifier_from_config(&config),
        bus.publisher(),
        metrics.clone(),
    ));
    let playback =
        Arc::new(PlaybackSupervisor::new(&config, bus.publisher(), metrics.clone()));

    let booth = BoothController::new(
        &config,
        gate.clone(),
        actuators,
        playback,
        metrics.clone(),
        bus_stop_tx,
    );
    booth.register(&mut bus);

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // An interrupt must still run the full cleanup path before exit
    let shutdown_booth = booth.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        shutdown_booth.shutdown().await;
    });

    gate.start();
    info!("booth_ready_waiting_for_qr");

    // Run the bus consumer - processes events until shutdown fires
    bus.run(bus_stop_rx).await;

    info!("booth-controller shutdown complete");
    Ok(())
}
