//! Primary-monitor capture backed by the `xcap` crate.

use super::error::CaptureError;
use super::types::{CaptureRegion, MonitorInfo, RawFrame};
use super::FrameSource;
use xcap::Monitor;

/// Frame source that samples one monitor.
///
/// The monitor and its bounds are resolved once at construction and
/// stay fixed for the session.
pub struct MonitorSource {
    monitor: Monitor,
    region: CaptureRegion,
}

impl MonitorSource {
    /// Resolve the primary monitor (or the first one when no monitor is
    /// flagged primary) and record its bounds.
    pub fn primary() -> Result<Self, CaptureError> {
        let monitors =
            Monitor::all().map_err(|e| CaptureError::Backend(e.to_string()))?;
        let monitor = monitors
            .iter()
            .find(|m| matches!(m.is_primary(), Ok(true)))
            .cloned()
            .or_else(|| monitors.into_iter().next())
            .ok_or(CaptureError::MonitorNotFound)?;

        let region = region_of(&monitor)?;
        tracing::debug!(
            "capturing monitor at ({}, {}) {}x{}",
            region.x,
            region.y,
            region.width,
            region.height
        );
        Ok(Self { monitor, region })
    }
}

impl FrameSource for MonitorSource {
    fn region(&self) -> CaptureRegion {
        self.region
    }

    fn grab(&mut self) -> Result<RawFrame, CaptureError> {
        let image = self
            .monitor
            .capture_image()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        let (width, height) = (image.width(), image.height());
        Ok(RawFrame {
            width,
            height,
            data: image.into_raw(),
        })
    }
}

fn region_of(monitor: &Monitor) -> Result<CaptureRegion, CaptureError> {
    let err = |e: xcap::XCapError| CaptureError::Backend(e.to_string());
    Ok(CaptureRegion {
        x: monitor.x().map_err(err)?,
        y: monitor.y().map_err(err)?,
        width: monitor.width().map_err(err)?,
        height: monitor.height().map_err(err)?,
    })
}

/// List all connected monitors, primary first.
pub fn list_monitors() -> Vec<MonitorInfo> {
    let monitors = match Monitor::all() {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("monitor enumeration failed: {}", e);
            return Vec::new();
        }
    };

    let mut infos: Vec<MonitorInfo> = monitors
        .iter()
        .map(|m| MonitorInfo {
            id: m.id().map(|id| id.to_string()).unwrap_or_default(),
            name: m.name().unwrap_or_default(),
            x: m.x().unwrap_or(0),
            y: m.y().unwrap_or(0),
            width: m.width().unwrap_or(0),
            height: m.height().unwrap_or(0),
            is_primary: m.is_primary().unwrap_or(false),
        })
        .collect();

    infos.sort_by_key(|m| !m.is_primary);
    infos
}
