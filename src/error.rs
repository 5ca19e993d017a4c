//! Error types for the monitoring core

use thiserror::Error;

/// Failures reported by a frame source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("no frame available")]
    Unavailable,

    #[error("frame read timed out")]
    Timeout,

    #[error("capture device disconnected: {0}")]
    Disconnected(String),

    #[error("capture backend error: {0}")]
    Backend(String),
}

impl FrameError {
    /// Transient errors are expected during normal capture and only skip the
    /// current cycle. Anything else is still tolerated by the sampling loop but
    /// gets logged loudly.
    pub fn is_transient(&self) -> bool {
        matches!(self, FrameError::Unavailable | FrameError::Timeout)
    }
}

/// Errors surfaced to callers of the monitor lifecycle.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to open frame source: {0}")]
    SourceOpen(#[source] FrameError),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// The previous sampling loop missed its join deadline and still holds
    /// the frame source.
    #[error("previous sampling session is still shutting down")]
    StillStopping,
}
