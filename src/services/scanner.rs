//! QR admission gate
//!
//! Polls the camera for frames, decodes candidates, validates and
//! deduplicates them, and publishes one admission event per accepted
//! payment. The gate halts itself on the first admission; the orchestrator
//! restarts it once the booth is clear.

use crate::domain::{epoch_ms, EventPayload, QrPayload};
use crate::infra::{Config, EventPublisher, Metrics};
use crate::io::{probe_camera, CameraProvider, PaymentVerifier, QrDecoder};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

/// Bound on joining the scan task during stop()
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct QrAdmissionGate {
    provider: Arc<dyn CameraProvider>,
    decoder: Arc<dyn QrDecoder>,
    verifier: Arc<dyn PaymentVerifier>,
    publisher: EventPublisher,
    metrics: Arc<Metrics>,
    max_camera_index: u32,
    frame_interval: Duration,
    cooldown: Duration,
    scanning: Arc<AtomicBool>,
    /// Epoch ms of the last accepted admission, 0 = never.
    /// Shared with the scan task and kept across restarts so a QR still in
    /// frame after a session cannot immediately re-admit.
    last_admission_ms: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl QrAdmissionGate {
    pub fn new(
        config: &Config,
        provider: Arc<dyn CameraProvider>,
        decoder: Arc<dyn QrDecoder>,
        verifier: Arc<dyn PaymentVerifier>,
        publisher: EventPublisher,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            provider,
            decoder,
            verifier,
            publisher,
            metrics,
            max_camera_index: config.max_camera_index(),
            frame_interval: Duration::from_millis(config.frame_interval_ms()),
            cooldown: Duration::from_secs(config.cooldown_secs()),
            scanning: Arc::new(AtomicBool::new(false)),
            last_admission_ms: Arc::new(AtomicU64::new(0)),
            task: Mutex::new(None),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Start the scan task; a no-op if scanning is already active
    pub fn start(&self) {
        if self.scanning.swap(true, Ordering::SeqCst) {
            warn!("qr_scanning_already_active");
            return;
        }

        let worker = ScanWorker {
            provider: self.provider.clone(),
            decoder: self.decoder.clone(),
            verifier: self.verifier.clone(),
            publisher: self.publisher.clone(),
            metrics: self.metrics.clone(),
            max_camera_index: self.max_camera_index,
            frame_interval: self.frame_interval,
            cooldown: self.cooldown,
            scanning: self.scanning.clone(),
            last_admission_ms: self.last_admission_ms.clone(),
        };
        let handle = tokio::spawn(worker.run());
        *self.task.lock() = Some(handle);
        info!("qr_scanning_started");
    }

    /// Cooperative stop: clear the flag and join the scan task with a
    /// bounded timeout. The task releases the camera on every exit path.
    pub async fn stop(&self) {
        if self.scanning.swap(false, Ordering::SeqCst) {
            info!("qr_scanning_stopping");
        }

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if timeout(STOP_JOIN_TIMEOUT, handle).await.is_err() {
                warn!("qr_scan_task_join_timeout");
            }
        }
    }
}

/// State owned by one run of the scan task
struct ScanWorker {
    provider: Arc<dyn CameraProvider>,
    decoder: Arc<dyn QrDecoder>,
    verifier: Arc<dyn PaymentVerifier>,
    publisher: EventPublisher,
    metrics: Arc<Metrics>,
    max_camera_index: u32,
    frame_interval: Duration,
    cooldown: Duration,
    scanning: Arc<AtomicBool>,
    last_admission_ms: Arc<AtomicU64>,
}

impl ScanWorker {
    async fn run(self) {
        // Camera acquisition failing is fatal to scanning only: the booth
        // idles until an operator restarts it, it never busy-loops.
        let mut camera = match probe_camera(self.provider.as_ref(), self.max_camera_index) {
            Ok(camera) => camera,
            Err(e) => {
                error!(error = %e, "camera_unavailable");
                self.scanning.store(false, Ordering::SeqCst);
                return;
            }
        };

        info!(
            frame_interval_ms = self.frame_interval.as_millis() as u64,
            cooldown_ms = self.cooldown.as_millis() as u64,
            "qr_scan_loop_started"
        );

        let mut admitted: Option<QrPayload> = None;
        let mut ticker = interval(self.frame_interval);

        'frames: while self.scanning.load(Ordering::SeqCst) {
            ticker.tick().await;

            let frame = match camera.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "frame_capture_failed");
                    sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            self.metrics.record_frame_scanned();

            for raw in self.decoder.decode(&frame) {
                if let Some(payload) = self.process_candidate(&raw).await {
                    admitted = Some(payload);
                    self.scanning.store(false, Ordering::SeqCst);
                    break 'frames;
                }
            }
        }

        camera.release();

        if let Some(payload) = admitted {
            self.metrics.record_admission_accepted();
            info!(
                heroes = ?payload.hero_names,
                subcategory_id = payload.subcategory_id,
                payment_id = %payload.payment_id.as_deref().unwrap_or("-"),
                "qr_admitted"
            );
            self.publisher.publish(EventPayload::Admission(payload));
        }

        info!("qr_scan_loop_stopped");
    }

    /// Run one candidate through cooldown, parse, schema and payment
    /// checks. Any failure discards the candidate and scanning continues.
    async fn process_candidate(&self, raw: &str) -> Option<QrPayload> {
        let preview: String = raw.chars().take(50).collect();
        debug!(candidate = %preview, "qr_candidate_detected");

        // Cooldown first: a QR lingering in frame must not re-trigger
        // payment verification or spawn duplicate sessions.
        let now = epoch_ms();
        let last = self.last_admission_ms.load(Ordering::SeqCst);
        if last != 0 && now.saturating_sub(last) < self.cooldown.as_millis() as u64 {
            debug!("admission_cooldown_active");
            self.metrics.record_admission_suppressed();
            return None;
        }

        let payload = match QrPayload::parse(raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(candidate = %preview, error = %e, "qr_candidate_rejected");
                self.metrics.record_candidate_rejected();
                return None;
            }
        };

        if let Err(e) = self.verifier.verify(&payload).await {
            warn!(
                payment_id = %payload.payment_id.as_deref().unwrap_or("-"),
                error = %e,
                "payment_verification_failed"
            );
            self.metrics.record_candidate_rejected();
            return None;
        }

        self.last_admission_ms.store(now, Ordering::SeqCst);
        Some(payload)
    }
}
