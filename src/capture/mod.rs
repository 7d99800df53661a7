//! Screen capture: frame sources and monitor enumeration.
//!
//! The recording loop sees capture only through the [`FrameSource`]
//! trait; the xcap-backed implementation lives in [`monitor`].

pub mod error;
pub mod monitor;
pub mod types;

pub use error::CaptureError;
pub use monitor::{list_monitors, MonitorSource};
pub use types::{CaptureRegion, Frame, MonitorInfo, RawFrame, StopHandle};

/// A blocking source of raw frames covering a fixed region.
pub trait FrameSource {
    /// The rectangle every grabbed frame covers.
    fn region(&self) -> CaptureRegion;

    /// Capture one frame. Blocks until the backend delivers it.
    ///
    /// A failure here is transient from the caller's perspective; the
    /// source must remain usable for subsequent grabs.
    fn grab(&mut self) -> Result<RawFrame, CaptureError>;
}
