//! Tests for the BoothController state machine

use super::*;
use crate::domain::{ActuatorState, ProcessState, QrPayload};
use crate::infra::EventPublisher;
use crate::io::{PassthroughDecoder, SpoolCameraProvider, StaticApproval};
use crate::services::actuators::StubBackend;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

/// Full booth wired onto a spool-file camera, driven like a live rig
struct TestBooth {
    booth: Arc<BoothController>,
    publisher: EventPublisher,
    spool: PathBuf,
    bus_task: JoinHandle<()>,
    _dir: TempDir,
}

impl TestBooth {
    fn build(config: Config) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("qr_spool");

        let mut bus = EventBus::new(64, Duration::from_millis(10));
        let publisher = bus.publisher();
        let metrics = Arc::new(Metrics::new());

        let actuators = Arc::new(crate::services::actuators::ActuatorController::new(
            &config,
            Arc::new(StubBackend),
            bus.publisher(),
            metrics.clone(),
        ));
        let gate = Arc::new(crate::services::scanner::QrAdmissionGate::new(
            &config,
            Arc::new(SpoolCameraProvider::new(&spool)),
            Arc::new(PassthroughDecoder),
            Arc::new(StaticApproval),
            bus.publisher(),
            metrics.clone(),
        ));
        let playback = Arc::new(crate::services::playback::PlaybackSupervisor::new(
            &config,
            bus.publisher(),
            metrics.clone(),
        ));

        let (bus_stop_tx, bus_stop_rx) = watch::channel(false);
        let booth =
            BoothController::new(&config, gate, actuators, playback, metrics, bus_stop_tx);
        booth.register(&mut bus);
        let bus_task = tokio::spawn(bus.run(bus_stop_rx));

        Self { booth, publisher, spool, bus_task, _dir: dir }
    }

    /// Start scanning and give the scan task time to open the camera
    async fn start_scanning(&self) {
        self.booth.gate.start();
        sleep(Duration::from_millis(100)).await;
    }

    async fn finish(self) {
        self.booth.shutdown().await;
        self.bus_task.await.unwrap();
    }
}

fn scan_qr(spool: &Path, payment_id: &str) {
    let line = serde_json::json!({
        "hero_names": ["Alice"],
        "subcategory_id": 13,
        "timestamp": 1754300000.0,
        "type": "heroes_selection",
        "payment_id": payment_id,
        "amount": 25.0,
    })
    .to_string();
    let mut file = OpenOptions::new().create(true).append(true).open(spool).unwrap();
    writeln!(file, "{line}").unwrap();
}

fn admission_payload(payment_id: &str, heroes: &[&str]) -> QrPayload {
    QrPayload {
        hero_names: heroes.iter().map(|s| s.to_string()).collect(),
        subcategory_id: 13,
        timestamp: 1754300000.0,
        payload_type: "heroes_selection".to_string(),
        payment_id: Some(payment_id.to_string()),
        amount: Some(25.0),
    }
}

async fn wait_for_state(booth: &Arc<BoothController>, want: BoothState, timeout_ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if booth.state().await == want {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

fn fast_config() -> Config {
    Config::default().with_fast_cleanup().with_cooldown_secs(0)
}

#[tokio::test]
async fn test_happy_path_scan_to_rescan() {
    // Playback runs long enough to observe the active session
    let config = fast_config().with_playback_command("sh", &["-c", "sleep 0.3"]);
    let tb = TestBooth::build(config);

    tb.start_scanning().await;
    scan_qr(&tb.spool, "pay_a");

    assert!(wait_for_state(&tb.booth, BoothState::SessionActive, 2000).await);
    // Door open, light on, gate halted, session live
    assert_eq!(
        tb.booth.actuators.state(),
        ActuatorState { door_open: true, light_on: true }
    );
    assert!(!tb.booth.gate.is_scanning());
    assert!(tb.booth.current_session_id().await.is_some());

    // Exit 0 drives playback-finished -> cleanup -> rescan
    assert!(wait_for_state(&tb.booth, BoothState::WaitingForScan, 3000).await);
    assert_eq!(tb.booth.actuators.state(), ActuatorState::default());
    assert!(tb.booth.current_session_id().await.is_none());
    assert!(tb.booth.gate.is_scanning());

    let summary = tb.booth.metrics.report();
    assert_eq!(summary.sessions_started, 1);
    assert_eq!(summary.sessions_completed, 1);
    assert_eq!(summary.playback_failures, 0);

    tb.finish().await;
}

#[tokio::test]
async fn test_playback_failure_still_cleans_up() {
    let config = fast_config().with_playback_command("sh", &["-c", "exit 1"]);
    let tb = TestBooth::build(config);

    tb.start_scanning().await;
    scan_qr(&tb.spool, "pay_b");

    assert!(wait_for_state(&tb.booth, BoothState::WaitingForScan, 3000).await);
    assert_eq!(tb.booth.actuators.state(), ActuatorState::default());
    assert!(tb.booth.gate.is_scanning());

    let summary = tb.booth.metrics.report();
    assert_eq!(summary.sessions_started, 1);
    assert_eq!(summary.sessions_completed, 0);
    assert_eq!(summary.playback_failures, 1);

    tb.finish().await;
}

#[tokio::test]
async fn test_second_admission_discarded_while_session_active() {
    let config = fast_config().with_playback_command("sh", &["-c", "sleep 1"]);
    let tb = TestBooth::build(config);

    tb.start_scanning().await;
    scan_qr(&tb.spool, "pay_a");
    assert!(wait_for_state(&tb.booth, BoothState::SessionActive, 2000).await);
    let first_session = tb.booth.current_session_id().await.unwrap();

    // The gate halted itself, so force a second admission through the bus
    tb.publisher.publish(crate::domain::EventPayload::Admission(admission_payload(
        "pay_b",
        &["Bob"],
    )));
    sleep(Duration::from_millis(200)).await;

    // No second session was created
    assert_eq!(tb.booth.current_session_id().await.unwrap(), first_session);
    assert_eq!(tb.booth.metrics.report().sessions_started, 1);

    tb.finish().await;
}

#[tokio::test]
async fn test_empty_hero_list_rejected_and_scanning_resumes() {
    let config = fast_config();
    let tb = TestBooth::build(config);

    tb.publisher
        .publish(crate::domain::EventPayload::Admission(admission_payload("pay_x", &[])));
    sleep(Duration::from_millis(200)).await;

    assert_eq!(tb.booth.state().await, BoothState::WaitingForScan);
    assert!(tb.booth.current_session_id().await.is_none());
    // The handler rearmed the gate after rejecting the payload
    assert!(tb.booth.gate.is_scanning());
    assert_eq!(tb.booth.metrics.report().sessions_started, 0);

    tb.finish().await;
}

#[tokio::test]
async fn test_hung_playback_killed_then_cleaned_up() {
    let config = fast_config()
        .with_playback_command("sh", &["-c", "sleep 30"])
        .with_playback_timeout_secs(1);
    let tb = TestBooth::build(config);

    tb.start_scanning().await;
    scan_qr(&tb.spool, "pay_hung");
    assert!(wait_for_state(&tb.booth, BoothState::SessionActive, 2000).await);

    // The child never exits on its own; the supervisor kills it after the
    // timeout and the booth still resets
    assert!(wait_for_state(&tb.booth, BoothState::WaitingForScan, 4000).await);
    assert_eq!(tb.booth.playback.process_state(), Some(ProcessState::TimedOut));
    assert_eq!(tb.booth.actuators.state(), ActuatorState::default());
    assert_eq!(tb.booth.metrics.report().playback_failures, 1);

    tb.finish().await;
}

#[tokio::test]
async fn test_cooldown_collapses_repeat_payment() {
    // Real cooldown window, instant playback and cleanup
    let config = Config::default()
        .with_fast_cleanup()
        .with_cooldown_secs(2)
        .with_playback_command("sh", &["-c", "exit 0"]);
    let tb = TestBooth::build(config);

    tb.start_scanning().await;
    scan_qr(&tb.spool, "pay_a");
    assert!(wait_for_state(&tb.booth, BoothState::SessionActive, 2000).await);
    assert!(wait_for_state(&tb.booth, BoothState::WaitingForScan, 3000).await);

    // Same payment rescanned 500ms after the first admission: suppressed
    sleep(Duration::from_millis(200)).await;
    scan_qr(&tb.spool, "pay_a");
    sleep(Duration::from_millis(300)).await;
    assert_eq!(tb.booth.metrics.report().sessions_started, 1);
    assert_eq!(tb.booth.state().await, BoothState::WaitingForScan);

    // A new payment after the window opens a second session
    sleep(Duration::from_millis(2000)).await;
    scan_qr(&tb.spool, "pay_c");
    assert!(wait_for_state(&tb.booth, BoothState::SessionActive, 2000).await);
    assert!(wait_for_state(&tb.booth, BoothState::WaitingForScan, 3000).await);
    assert_eq!(tb.booth.metrics.report().sessions_started, 2);

    tb.finish().await;
}

#[tokio::test]
async fn test_shutdown_from_active_session() {
    let config = fast_config().with_playback_command("sh", &["-c", "sleep 30"]);
    let tb = TestBooth::build(config);

    tb.start_scanning().await;
    scan_qr(&tb.spool, "pay_a");
    assert!(wait_for_state(&tb.booth, BoothState::SessionActive, 2000).await);

    tb.booth.shutdown().await;

    // Playback killed, gate stopped, hardware safe, bus released
    assert!(!tb.booth.playback.is_running());
    assert!(!tb.booth.gate.is_scanning());
    assert_eq!(tb.booth.actuators.state(), ActuatorState::default());
    assert_eq!(tb.booth.state().await, BoothState::ShuttingDown);

    // Second shutdown is a latched no-op
    tb.booth.shutdown().await;
    tb.bus_task.await.unwrap();
}

#[tokio::test]
async fn test_out_of_band_cleared_is_ignored() {
    let config = fast_config();
    let tb = TestBooth::build(config);

    tb.publisher.publish(crate::domain::EventPayload::Cleared);
    sleep(Duration::from_millis(100)).await;

    assert_eq!(tb.booth.state().await, BoothState::WaitingForScan);
    // The gate was never armed and an out-of-band Cleared must not arm it
    assert!(!tb.booth.gate.is_scanning());

    tb.finish().await;
}
