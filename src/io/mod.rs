//! IO modules - external system interfaces
//!
//! - `camera` - frame acquisition seam and the spool-file simulator
//! - `qr` - QR decoding seam
//! - `payment` - pluggable payment verification
//! - `media` - read-only hero video inventory

pub mod camera;
pub mod media;
pub mod payment;
pub mod qr;

// Re-export commonly used types
pub use camera::{probe_camera, Camera, CameraError, CameraProvider, Frame, SpoolCameraProvider};
pub use media::{InventoryReport, MediaLibrary};
pub use payment::{verifier_from_config, PaymentError, PaymentVerifier, StaticApproval};
pub use qr::{PassthroughDecoder, QrDecoder};
