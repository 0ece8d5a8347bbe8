//! Session model for one booth interaction, door-open to door-closed

use crate::domain::types::{PlaybackRequest, QrPayload};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 session id (time-sortable)
pub fn new_session_id() -> String {
    Uuid::now_v7().to_string()
}

/// Current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Current epoch seconds as float, the playback wire format
#[inline]
pub fn epoch_secs() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// Lifecycle of a single session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Starting,
    Active,
    Cleaning,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Cleaning => "cleaning",
        }
    }
}

/// Top-level booth state machine driven by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoothState {
    WaitingForScan,
    SessionStarting,
    SessionActive,
    Cleaning,
    ShuttingDown,
}

impl BoothState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoothState::WaitingForScan => "waiting_for_scan",
            BoothState::SessionStarting => "session_starting",
            BoothState::SessionActive => "session_active",
            BoothState::Cleaning => "cleaning",
            BoothState::ShuttingDown => "shutting_down",
        }
    }
}

/// One booth interaction. At most one live session exists system-wide;
/// created on admission, destroyed when cleanup completes.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub hero_names: Vec<String>,
    pub subcategory_id: i64,
    pub payment_id: Option<String>,
    pub created_at_ms: u64,
    pub state: SessionState,
}

impl Session {
    /// Create a session from an accepted admission payload
    pub fn from_admission(payload: &QrPayload) -> Self {
        Self {
            id: new_session_id(),
            hero_names: payload.hero_names.clone(),
            subcategory_id: payload.subcategory_id,
            payment_id: payload.payment_id.clone(),
            created_at_ms: epoch_ms(),
            state: SessionState::Starting,
        }
    }

    /// Build the structured argument for the playback child
    pub fn playback_request(&self) -> PlaybackRequest {
        PlaybackRequest {
            hero_names: self.hero_names.clone(),
            subcategory_id: self.subcategory_id,
            total_videos: self.hero_names.len(),
            timestamp: epoch_secs(),
        }
    }
}
