//! Services - booth orchestration and device control

pub mod actuators;
pub mod booth;
pub mod playback;
pub mod scanner;

// Re-export commonly used types
pub use actuators::{ActuatorBackend, ActuatorController, ActuatorError, StubBackend};
pub use booth::BoothController;
pub use playback::{PlaybackError, PlaybackSupervisor};
pub use scanner::QrAdmissionGate;
