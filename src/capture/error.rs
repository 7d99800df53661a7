//! Error types for capture operations.

use std::fmt;

/// Error type for capture operations.
///
/// At startup (monitor resolution) any of these is fatal. During a
/// recording, a `grab` failure is treated as transient: the affected
/// tick is skipped and the loop continues.
#[derive(Debug)]
pub enum CaptureError {
    /// No capturable monitor was found
    MonitorNotFound,
    /// The capture backend failed to produce a frame
    Backend(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::MonitorNotFound => write!(f, "no capturable monitor found"),
            CaptureError::Backend(msg) => write!(f, "capture backend error: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            CaptureError::MonitorNotFound.to_string(),
            "no capturable monitor found"
        );
        assert!(CaptureError::Backend("boom".into())
            .to_string()
            .contains("boom"));
    }
}
