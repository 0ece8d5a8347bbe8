//! Booth session orchestration
//!
//! The BoothController is the central event processor that coordinates:
//! - The session state machine (at most one live session system-wide)
//! - The QR admission gate (halted during a session, rearmed after cleanup)
//! - The playback supervisor (launch on admission, outcome drives cleanup)
//! - The actuator controller (door/light on start, guaranteed teardown)
//!
//! All of its mutable state is behind one mutex locked only from the bus
//! consumer task, so the single-flight check-and-set on the session
//! reference is single-writer by construction.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::{BoothState, Event, EventPayload, EventType, Session};
use crate::infra::{Config, EventBus, EventHandler, Metrics};
use crate::services::actuators::ActuatorController;
use crate::services::playback::PlaybackSupervisor;
use crate::services::scanner::QrAdmissionGate;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::Duration;
use tracing::info;

/// Mutable orchestrator state, bus-task single-writer
pub(crate) struct BoothInner {
    pub(crate) state: BoothState,
    pub(crate) session: Option<Session>,
}

/// Root coordinator driving the booth state machine
pub struct BoothController {
    pub(crate) gate: Arc<QrAdmissionGate>,
    pub(crate) actuators: Arc<ActuatorController>,
    pub(crate) playback: Arc<PlaybackSupervisor>,
    pub(crate) metrics: Arc<Metrics>,
    /// Anti-flicker delay between cleanup completion and gate restart
    pub(crate) reset_delay: Duration,
    pub(crate) inner: Mutex<BoothInner>,
    /// Latch so the shutdown sequence runs exactly once
    shutdown_started: AtomicBool,
    /// Stops the bus consumer loop as the final shutdown step
    bus_stop_tx: watch::Sender<bool>,
}

impl BoothController {
    pub fn new(
        config: &Config,
        gate: Arc<QrAdmissionGate>,
        actuators: Arc<ActuatorController>,
        playback: Arc<PlaybackSupervisor>,
        metrics: Arc<Metrics>,
        bus_stop_tx: watch::Sender<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            gate,
            actuators,
            playback,
            metrics,
            reset_delay: Duration::from_millis(config.reset_delay_ms()),
            inner: Mutex::new(BoothInner { state: BoothState::WaitingForScan, session: None }),
            shutdown_started: AtomicBool::new(false),
            bus_stop_tx,
        })
    }

    /// Subscribe this controller for every event type it drives
    pub fn register(self: &Arc<Self>, bus: &mut EventBus) {
        bus.subscribe(EventType::QrAdmitted, self.clone());
        bus.subscribe(EventType::PlaybackFinished, self.clone());
        bus.subscribe(EventType::PlaybackError, self.clone());
        bus.subscribe(EventType::BoothCleared, self.clone());
    }

    pub async fn state(&self) -> BoothState {
        self.inner.lock().await.state
    }

    pub async fn current_session_id(&self) -> Option<String> {
        self.inner.lock().await.session.as_ref().map(|s| s.id.clone())
    }

    /// Tear the booth down from any state: kill playback, stop the gate,
    /// run actuator cleanup, then stop the bus. Runs at most once; an
    /// unhandled interrupt routes here so hardware is never left open.
    pub async fn shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("booth_shutdown_started");

        {
            let mut inner = self.inner.lock().await;
            inner.state = BoothState::ShuttingDown;
            inner.session = None;
        }

        self.playback.stop().await;
        self.gate.stop().await;
        self.actuators.cleanup().await;
        let _ = self.bus_stop_tx.send(true);

        info!("booth_shutdown_complete");
    }
}

#[async_trait]
impl EventHandler for BoothController {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        self.metrics.record_event_dispatched();
        match event.payload {
            EventPayload::Admission(payload) => self.on_admission(payload).await,
            EventPayload::PlaybackFinished { session_id } => {
                self.on_playback_finished(session_id).await
            }
            EventPayload::PlaybackError { session_id, cause } => {
                self.on_playback_error(session_id, cause).await
            }
            EventPayload::Cleared => self.on_cleared().await,
        }
        Ok(())
    }
}
