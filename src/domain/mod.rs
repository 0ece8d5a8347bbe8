//! Domain models - events, admission payloads, and the session model

pub mod session;
pub mod types;

pub use session::{epoch_ms, epoch_secs, new_session_id, BoothState, Session, SessionState};
pub use types::{
    ActuatorState, AdmissionError, Event, EventPayload, EventType, PlaybackRequest, ProcessState,
    QrPayload,
};
