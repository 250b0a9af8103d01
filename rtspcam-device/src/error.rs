//! Error types for device sessions

use crate::session::SessionState;
use rtspcam_bridge::{PixelFormat, SinkError};
use thiserror::Error;

/// Failures reported by a device collaborator
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("device {0} is unavailable")]
    Unavailable(String),
    #[error("{feature} failed: {reason}")]
    Feature {
        feature: &'static str,
        reason: String,
    },
    #[error("stream error: {0}")]
    Stream(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no camera device found{}", with_id(.id))]
    NotFound { id: Option<String> },
    #[error("failed to initialize device {id}: {source}")]
    Init {
        id: String,
        #[source]
        source: CameraError,
    },
    #[error("pipeline cannot understand camera pixel format {format}")]
    IncompatibleFormat { format: PixelFormat },
    #[error("can not create stream: {0}")]
    StreamCreate(#[source] CameraError),
    #[error("device session not initialized")]
    NotInitialized,
    #[error("no pipeline sink bound to the session")]
    SinkNotBound,
    #[error("acquisition failed: {0}")]
    Acquisition(#[source] CameraError),
    /// Start while streaming or stop while idle; logged, never returned
    #[error("cannot {requested} acquisition while {current}")]
    AcquisitionState {
        requested: &'static str,
        current: SessionState,
    },
    #[error("sink configuration failed: {0}")]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Camera(#[from] CameraError),
}

fn with_id(id: &Option<String>) -> String {
    id.as_ref()
        .map(|id| format!(" with id {}", id))
        .unwrap_or_default()
}

/// Invalid stream options
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("region must be non-empty, got {width}x{height}")]
    EmptyRegion { width: u32, height: u32 },
    #[error("bitrate must be positive")]
    ZeroBitrate,
    #[error("stream needs at least one buffer")]
    ZeroBuffers,
    #[error("server address is empty")]
    EmptyAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        assert_eq!(
            DeviceError::NotFound { id: None }.to_string(),
            "no camera device found"
        );
        assert_eq!(
            DeviceError::NotFound {
                id: Some("Fake-1".into())
            }
            .to_string(),
            "no camera device found with id Fake-1"
        );
    }

    #[test]
    fn test_state_error_message() {
        let err = DeviceError::AcquisitionState {
            requested: "start",
            current: SessionState::Streaming,
        };
        assert_eq!(err.to_string(), "cannot start acquisition while streaming");
    }
}
