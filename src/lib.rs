//! pacerec: fixed-frame-rate screen recorder.
//!
//! Records the primary monitor to an H.264 MP4 at a configured rate.
//! The capture loop owns its source and writer for the whole session,
//! paces frames against a deadline, and resynchronizes to the present
//! when it falls behind instead of bursting backlogged frames.

pub mod capture;
pub mod config;
pub mod encoder;
pub mod logging;
pub mod recorder;

pub use capture::{CaptureError, CaptureRegion, FrameSource, StopHandle};
pub use config::Config;
pub use encoder::{EncoderError, FrameSink};
pub use recorder::{
    PacingState, RecorderError, RecorderState, RecordingHandle, RecordingSummary,
};
