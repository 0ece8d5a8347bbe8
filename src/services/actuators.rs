//! Door and light control with guaranteed teardown
//!
//! Physical signaling lives behind `ActuatorBackend`; the shipped
//! `StubBackend` only logs, mirroring booths wired without real relays.
//! Whatever the backend does, `cleanup()` always converges the booth to
//! door-closed / light-off and publishes `Cleared`.

use crate::domain::{ActuatorState, EventPayload};
use crate::infra::{Config, EventPublisher, Metrics};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("actuator signaling failed: {0}")]
    Signal(String),
}

/// Drives the physical door and light lines
pub trait ActuatorBackend: Send + Sync {
    fn set_door(&self, open: bool) -> Result<(), ActuatorError>;
    fn set_light(&self, on: bool) -> Result<(), ActuatorError>;
}

/// Logging-only backend for rigs without wired relays
pub struct StubBackend;

impl ActuatorBackend for StubBackend {
    fn set_door(&self, open: bool) -> Result<(), ActuatorError> {
        info!(open = open, "door_signal_stub");
        Ok(())
    }

    fn set_light(&self, on: bool) -> Result<(), ActuatorError> {
        info!(on = on, "light_signal_stub");
        Ok(())
    }
}

pub struct ActuatorController {
    backend: Arc<dyn ActuatorBackend>,
    state: Mutex<ActuatorState>,
    publisher: EventPublisher,
    metrics: Arc<Metrics>,
    /// Wait before cleanup starts so the guest can leave the booth
    exit_grace: Duration,
    /// Wait between light-off and door-close
    settle_delay: Duration,
}

impl ActuatorController {
    pub fn new(
        config: &Config,
        backend: Arc<dyn ActuatorBackend>,
        publisher: EventPublisher,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            backend,
            state: Mutex::new(ActuatorState::default()),
            publisher,
            metrics,
            exit_grace: Duration::from_millis(config.exit_grace_ms()),
            settle_delay: Duration::from_millis(config.settle_delay_ms()),
        }
    }

    /// Current observed door/light state
    pub fn state(&self) -> ActuatorState {
        *self.state.lock()
    }

    /// Set the door line; setting the current state is a logged no-op
    pub fn set_door(&self, open: bool) -> Result<(), ActuatorError> {
        let mut state = self.state.lock();
        if state.door_open == open {
            info!(open = open, "door_unchanged");
            return Ok(());
        }
        self.backend.set_door(open)?;
        state.door_open = open;
        info!(open = open, "door_set");
        Ok(())
    }

    /// Set the light line; setting the current state is a logged no-op
    pub fn set_light(&self, on: bool) -> Result<(), ActuatorError> {
        let mut state = self.state.lock();
        if state.light_on == on {
            info!(on = on, "light_unchanged");
            return Ok(());
        }
        self.backend.set_light(on)?;
        state.light_on = on;
        info!(on = on, "light_set");
        Ok(())
    }

    /// Return the booth to its safe default: light off, settle, door
    /// closed, then publish `Cleared`.
    ///
    /// Runs unconditionally regardless of prior state, is safe to invoke
    /// repeatedly, and never fails: backend faults are logged and the
    /// remaining steps and the completion publish still happen.
    pub async fn cleanup(&self) {
        info!("cleanup_started");

        if !self.exit_grace.is_zero() {
            sleep(self.exit_grace).await;
        }

        if let Err(e) = self.backend.set_light(false) {
            error!(error = %e, "cleanup_light_failed");
        }
        self.state.lock().light_on = false;

        sleep(self.settle_delay).await;

        if let Err(e) = self.backend.set_door(false) {
            error!(error = %e, "cleanup_door_failed");
        }
        self.state.lock().door_open = false;

        self.metrics.record_cleanup_completed();
        self.publisher.publish(EventPayload::Cleared);
        info!("cleanup_complete");
    }

    /// Run the cleanup sequence on a detached task so callers return
    /// promptly; completion arrives as a `Cleared` bus event.
    pub fn spawn_cleanup(self: &Arc<Self>) {
        let controller = self.clone();
        tokio::spawn(async move {
            controller.cleanup().await;
        });
    }
}
