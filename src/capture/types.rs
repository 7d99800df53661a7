//! Shared types for capture operations.

use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Information about a display monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorInfo {
    /// Backend-specific identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Virtual screen X position
    pub x: i32,
    /// Virtual screen Y position
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Whether this is the primary monitor
    pub is_primary: bool,
}

/// The rectangle sampled by a capture source. Fixed for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    /// Virtual screen X position
    pub x: i32,
    /// Virtual screen Y position
    pub y: i32,
    /// Region width in pixels
    pub width: u32,
    /// Region height in pixels
    pub height: u32,
}

/// A frame as produced by the capture backend.
///
/// Pixel data is RGBA, 4 bytes per pixel, row-major,
/// `data.len() == width * height * 4`.
#[derive(Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// A frame in the encoder's pixel layout: RGB24, 3 bytes per pixel.
#[derive(Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Drop the alpha channel, yielding the encoder's RGB24 layout.
    ///
    /// Pure transform; assumes the backend upheld the RGBA layout contract.
    pub fn into_rgb(self) -> Frame {
        let pixels = (self.width as usize) * (self.height as usize);
        let mut data = Vec::with_capacity(pixels * 3);
        for px in self.data.chunks_exact(4) {
            data.extend_from_slice(&px[..3]);
        }
        Frame {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

/// Handle to stop an ongoing recording.
pub type StopHandle = Arc<AtomicBool>;
