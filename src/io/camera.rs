//! Camera seam for the QR admission gate
//!
//! Image acquisition is an external concern behind the `Camera` /
//! `CameraProvider` traits. The shipped `SpoolCameraProvider` simulates a
//! camera by reading one payload line per frame from a spool file, which
//! lets the whole booth run end-to-end on a dev box (see the `qr-sim`
//! binary). Hardware deployments plug a real capture backend into the same
//! traits.

use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CameraError {
    /// No device index produced a readable frame; fatal to scanning
    #[error("no usable camera on indices 0..={0}")]
    Unavailable(u32),
    #[error("camera device {index} failed to open: {reason}")]
    Open { index: u32, reason: String },
    #[error("frame read failed: {0}")]
    Read(String),
}

/// One captured frame, opaque to everything but the decoder
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
}

/// An opened capture device, owned exclusively by the scan task
pub trait Camera: Send {
    /// Pull the next frame; `Ok(None)` means no frame is ready yet
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Release the device; must be safe to call more than once
    fn release(&mut self);
}

/// Opens capture devices by index
pub trait CameraProvider: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn Camera>, CameraError>;
}

/// Probe device indices until one yields a readable frame.
///
/// A device that answers the probe read, even with no frame pending,
/// is usable. All indices failing is `CameraError::Unavailable`.
pub fn probe_camera(
    provider: &dyn CameraProvider,
    max_index: u32,
) -> Result<Box<dyn Camera>, CameraError> {
    for index in 0..=max_index {
        match provider.open(index) {
            Ok(mut camera) => match camera.read_frame() {
                Ok(_) => {
                    info!(index = index, "camera_opened");
                    return Ok(camera);
                }
                Err(e) => {
                    warn!(index = index, error = %e, "camera_probe_read_failed");
                    camera.release();
                }
            },
            Err(e) => {
                debug!(index = index, error = %e, "camera_probe_open_failed");
            }
        }
    }
    Err(CameraError::Unavailable(max_index))
}

/// Simulated camera backend fed by a line-oriented spool file
pub struct SpoolCameraProvider {
    spool: PathBuf,
}

impl SpoolCameraProvider {
    pub fn new<P: Into<PathBuf>>(spool: P) -> Self {
        Self { spool: spool.into() }
    }
}

impl CameraProvider for SpoolCameraProvider {
    fn open(&self, index: u32) -> Result<Box<dyn Camera>, CameraError> {
        // The simulated rig exposes a single device at index 0
        if index != 0 {
            return Err(CameraError::Open { index, reason: "no such device".to_string() });
        }
        // Tail the spool: a camera only sees what happens after it turns
        // on, so lines already consumed by a previous session are not
        // replayed when the gate rearms.
        let offset = fs::metadata(&self.spool).map(|m| m.len() as usize).unwrap_or(0);
        info!(spool = %self.spool.display(), offset = offset, "spool_camera_opened");
        Ok(Box::new(SpoolCamera { spool: self.spool.clone(), offset, released: false }))
    }
}

/// Each complete line appended to the spool file becomes one frame
struct SpoolCamera {
    spool: PathBuf,
    /// Byte offset of the first unconsumed line
    offset: usize,
    released: bool,
}

impl Camera for SpoolCamera {
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        let content = match fs::read(&self.spool) {
            Ok(content) => content,
            // A missing spool file is an idle camera, not a fault
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CameraError::Read(e.to_string())),
        };

        // The spool was truncated or replaced; start over
        if self.offset > content.len() {
            self.offset = 0;
        }

        let pending = &content[self.offset..];
        match pending.iter().position(|&b| b == b'\n') {
            Some(newline) => {
                let line = pending[..newline].to_vec();
                self.offset += newline + 1;
                Ok(Some(Frame { data: line }))
            }
            // No complete line yet
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            info!(spool = %self.spool.display(), "spool_camera_released");
        }
    }
}
