//! Shared types for the booth controller

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// QR payload type literal accepted by the admission gate
pub const QR_PAYLOAD_TYPE: &str = "heroes_selection";

/// Event types carried by the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    QrAdmitted,
    PlaybackFinished,
    PlaybackError,
    BoothCleared,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::QrAdmitted => "qr_admitted",
            EventType::PlaybackFinished => "playback_finished",
            EventType::PlaybackError => "playback_error",
            EventType::BoothCleared => "booth_cleared",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload variants for bus events
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// A validated QR admission carrying the full payload
    Admission(QrPayload),
    /// Playback child exited with code 0
    PlaybackFinished { session_id: String },
    /// Playback failed: launch error, nonzero exit, or timeout
    PlaybackError { session_id: Option<String>, cause: String },
    /// Actuator cleanup completed; booth is safe to rearm
    Cleared,
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Admission(_) => EventType::QrAdmitted,
            EventPayload::PlaybackFinished { .. } => EventType::PlaybackFinished,
            EventPayload::PlaybackError { .. } => EventType::PlaybackError,
            EventPayload::Cleared => EventType::BoothCleared,
        }
    }
}

/// A bus event: payload plus publish timestamp.
///
/// Delivery is FIFO per event type; there is no ordering guarantee
/// across types.
#[derive(Debug, Clone)]
pub struct Event {
    pub payload: EventPayload,
    pub timestamp_ms: u64,
}

impl Event {
    /// Create an event stamped with the current wall clock
    pub fn now(payload: EventPayload) -> Self {
        Self { payload, timestamp_ms: crate::domain::epoch_ms() }
    }

    #[inline]
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// Errors raised while turning a QR candidate into an admission
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("invalid JSON in QR candidate: {0}")]
    Parse(String),
    #[error("QR schema validation failed: {0}")]
    Schema(String),
}

/// Validated QR admission payload.
///
/// Wire format is the JSON the kiosk app encodes into the QR code:
/// snake_case keys, `type` fixed to `heroes_selection`. `payment_id`
/// and `amount` are optional on the wire and consumed by the payment
/// verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrPayload {
    pub hero_names: Vec<String>,
    pub subcategory_id: i64,
    /// Client-side epoch seconds at QR generation
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub payload_type: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
}

impl QrPayload {
    /// Parse and schema-validate a raw QR candidate string.
    ///
    /// Invalid JSON and shape mismatches are distinct failures so the
    /// scanner can log them separately; both leave scanning running.
    pub fn parse(raw: &str) -> Result<Self, AdmissionError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| AdmissionError::Parse(e.to_string()))?;
        let payload: QrPayload =
            serde_json::from_value(value).map_err(|e| AdmissionError::Schema(e.to_string()))?;
        if payload.payload_type != QR_PAYLOAD_TYPE {
            return Err(AdmissionError::Schema(format!(
                "unexpected payload type {:?}",
                payload.payload_type
            )));
        }
        Ok(payload)
    }

    /// Whether the payload names at least one hero
    #[inline]
    pub fn has_heroes(&self) -> bool {
        !self.hero_names.is_empty()
    }
}

/// The single structured argument handed to the playback child process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackRequest {
    pub hero_names: Vec<String>,
    pub subcategory_id: i64,
    pub total_videos: usize,
    /// Epoch seconds at launch
    pub timestamp: f64,
}

/// Terminal and non-terminal states of the playback child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited(i32),
    TimedOut,
    Killed,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Running => "running",
            ProcessState::Exited(_) => "exited",
            ProcessState::TimedOut => "timed_out",
            ProcessState::Killed => "killed",
        }
    }
}

/// Observable door/light state; cleanup converges this to (false, false)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorState {
    pub door_open: bool,
    pub light_on: bool,
}
