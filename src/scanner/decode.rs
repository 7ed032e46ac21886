use async_trait::async_trait;
use thiserror::Error;

/// A captured still frame: 8-bit greyscale pixels, row-major.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub luma: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera available")]
    NoCamera,
    #[error("capture stream failed: {0}")]
    StreamFailed(String),
}

/// One decode strategy. Implementations must be cheap enough to run on every
/// captured frame; returning `None` simply means "no code in this frame".
pub trait QrDecoder: Send {
    fn decode(&mut self, frame: &Frame) -> Option<String>;
}

/// Camera collaborator: requests the video stream and reports whether the
/// platform ships its own QR detector.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    type Stream: FrameStream + Send + 'static;

    async fn open(&self) -> Result<Self::Stream, CameraError>;

    /// The platform's built-in detector, when the device offers one.
    fn native_decoder(&self) -> Option<Box<dyn QrDecoder>>;
}

/// A live capture stream. Frames arrive at the device's own cadence, so
/// awaiting the next frame is the cooperative pacing of the decode loop.
/// Dropping the stream releases the capture device.
#[async_trait]
pub trait FrameStream: Send {
    async fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

/// Software fallback used when no native detector exists: a full QR decode
/// over the greyscale frame.
#[derive(Debug, Default)]
pub struct SoftwareQrDecoder;

impl QrDecoder for SoftwareQrDecoder {
    fn decode(&mut self, frame: &Frame) -> Option<String> {
        if frame.width == 0 || frame.height == 0 || frame.luma.len() < frame.width * frame.height {
            return None;
        }
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            frame.width,
            frame.height,
            |x, y| frame.luma[y * frame.width + x],
        );
        for grid in prepared.detect_grids() {
            if let Ok((_meta, content)) = grid.decode() {
                if !content.is_empty() {
                    return Some(content);
                }
            }
        }
        None
    }
}

/// Capability selection, done once when a scan session enters streaming:
/// prefer the platform detector, fall back to the software decode loop.
pub fn select_decoder<C: CameraDevice>(device: &C) -> Box<dyn QrDecoder> {
    device
        .native_decoder()
        .unwrap_or_else(|| Box::new(SoftwareQrDecoder))
}
