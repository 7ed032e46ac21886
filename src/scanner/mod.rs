//! Gate-side scanning client: camera acquisition, capability-selected QR
//! decoding, and exactly-one verification call per detected code.

pub mod decode;
pub mod session;

pub use decode::{CameraDevice, CameraError, Frame, FrameStream, QrDecoder, SoftwareQrDecoder};
pub use session::{verify_manual, OperatorWorkflow, ScanHandle, ScanSession, ScanState};
