//! QR decoding seam
//!
//! The image-decoding algorithm is an external library behind the
//! `QrDecoder` trait: a frame goes in, zero or more candidate payload
//! strings come out. The `PassthroughDecoder` pairs with the spool camera,
//! whose frames already carry the payload bytes.

use crate::io::camera::Frame;
use tracing::warn;

/// Decodes QR candidates out of a captured frame
pub trait QrDecoder: Send + Sync {
    fn decode(&self, frame: &Frame) -> Vec<String>;
}

/// Treats the frame bytes as one UTF-8 candidate
pub struct PassthroughDecoder;

impl QrDecoder for PassthroughDecoder {
    fn decode(&self, frame: &Frame) -> Vec<String> {
        match std::str::from_utf8(&frame.data) {
            Ok(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Vec::new()
                } else {
                    vec![trimmed.to_string()]
                }
            }
            Err(e) => {
                warn!(error = %e, "qr_candidate_not_utf8");
                Vec::new()
            }
        }
    }
}
