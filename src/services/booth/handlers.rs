//! Event handlers for the BoothController
//!
//! Each handler processes one event type. Handlers run on the bus
//! consumer task only, which is what makes the check-and-set on the
//! session reference race-free.

use super::BoothController;
use crate::domain::{BoothState, QrPayload, Session, SessionState};
use tokio::time::sleep;
use tracing::{error, info, warn};

impl BoothController {
    /// WaitingForScan + admission: start a session.
    ///
    /// Admissions in any other state are discarded, never queued - the
    /// gate halts itself on admission, so these only occur if something
    /// republished while a session was live.
    pub(crate) async fn on_admission(&self, payload: QrPayload) {
        let mut inner = self.inner.lock().await;

        if inner.state == BoothState::ShuttingDown {
            info!("admission_discarded_shutting_down");
            return;
        }
        if inner.session.is_some() || inner.state != BoothState::WaitingForScan {
            warn!(state = %inner.state.as_str(), "admission_discarded_session_active");
            return;
        }

        // Defensive shape re-validation at the state machine boundary
        if !payload.has_heroes() {
            warn!("admission_rejected_empty_heroes");
            self.gate.start();
            return;
        }

        let session = Session::from_admission(&payload);
        info!(
            session_id = %session.id,
            heroes = ?session.hero_names,
            subcategory_id = session.subcategory_id,
            payment_id = %session.payment_id.as_deref().unwrap_or("-"),
            "session_starting"
        );
        inner.state = BoothState::SessionStarting;
        inner.session = Some(session.clone());
        self.metrics.record_session_started();

        if let Err(e) = self.actuators.set_door(true) {
            error!(error = %e, "door_open_failed");
        }
        if let Err(e) = self.actuators.set_light(true) {
            error!(error = %e, "light_on_failed");
        }

        if let Err(e) = self.playback.launch(&session).await {
            // The supervisor already published the terminal event; entering
            // SessionActive lets that queued event drive us into Cleaning.
            error!(session_id = %session.id, error = %e, "playback_launch_failed");
        }
        inner.state = BoothState::SessionActive;
        if let Some(session) = inner.session.as_mut() {
            session.state = SessionState::Active;
        }
    }

    /// SessionActive + playback-finished: begin cleanup
    pub(crate) async fn on_playback_finished(&self, session_id: String) {
        let mut inner = self.inner.lock().await;

        if !matches!(inner.state, BoothState::SessionActive | BoothState::SessionStarting) {
            warn!(state = %inner.state.as_str(), "playback_finished_out_of_band");
            return;
        }
        if inner.session.as_ref().map(|s| s.id.as_str()) != Some(session_id.as_str()) {
            warn!(session_id = %session_id, "playback_finished_stale_session");
            return;
        }

        info!(session_id = %session_id, "session_playback_finished");
        self.metrics.record_session_completed();
        inner.state = BoothState::Cleaning;
        if let Some(session) = inner.session.as_mut() {
            session.state = SessionState::Cleaning;
        }
        self.actuators.spawn_cleanup();
    }

    /// SessionActive + playback-error: content failure never strands the
    /// booth lit and open, cleanup runs all the same
    pub(crate) async fn on_playback_error(&self, session_id: Option<String>, cause: String) {
        let mut inner = self.inner.lock().await;

        if !matches!(inner.state, BoothState::SessionActive | BoothState::SessionStarting) {
            warn!(cause = %cause, state = %inner.state.as_str(), "playback_error_out_of_band");
            return;
        }
        if let (Some(event_id), Some(session)) = (session_id.as_deref(), inner.session.as_ref()) {
            if event_id != session.id {
                warn!(session_id = %event_id, "playback_error_stale_session");
                return;
            }
        }

        error!(cause = %cause, "session_playback_error");
        inner.state = BoothState::Cleaning;
        if let Some(session) = inner.session.as_mut() {
            session.state = SessionState::Cleaning;
        }
        self.actuators.spawn_cleanup();
    }

    /// Cleaning + cleared: drop the session, wait out the anti-flicker
    /// delay, rearm the gate
    pub(crate) async fn on_cleared(&self) {
        let mut inner = self.inner.lock().await;

        if inner.state != BoothState::Cleaning {
            // A repeated cleanup can publish an extra Cleared; harmless
            info!(state = %inner.state.as_str(), "cleared_out_of_band");
            return;
        }

        let session_id = inner.session.take().map(|s| s.id);
        info!(session_id = %session_id.as_deref().unwrap_or("-"), "booth_reset");

        sleep(self.reset_delay).await;
        self.gate.start();
        inner.state = BoothState::WaitingForScan;
    }
}
