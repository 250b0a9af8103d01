//! Server-side errors

use rtspcam_device::DeviceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("missing pipeline elements: {}", .0.join(", "))]
    MissingElements(Vec<String>),
    #[error("failed to spawn event dispatcher: {0}")]
    Spawn(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_elements_message() {
        let err = ServerError::MissingElements(vec!["bayer2rgb".into(), "x264enc".into()]);
        assert_eq!(err.to_string(), "missing pipeline elements: bayer2rgb, x264enc");
    }

    #[test]
    fn test_device_error_is_transparent() {
        let err: ServerError = DeviceError::NotInitialized.into();
        assert_eq!(err.to_string(), DeviceError::NotInitialized.to_string());
    }
}
