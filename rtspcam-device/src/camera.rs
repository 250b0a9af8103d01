//! Device collaborator interface

use crate::error::CameraError;
use crate::options::UsbMode;
use rtspcam_bridge::{DeviceBounds, FrameCallback, FrameStream, PixelFormat};
use std::sync::Arc;

/// One enumerated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub vendor: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoMode {
    Off,
    Once,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    Continuous,
    SingleFrame,
    MultiFrame,
}

/// Runs once on the stream worker thread before the first frame
pub type StreamInitHook = Arc<dyn Fn() + Send + Sync>;

/// Parameters for opening a device stream
pub struct StreamParams {
    pub buffer_count: usize,
    pub on_frame: FrameCallback,
    pub on_init: Option<StreamInitHook>,
}

/// Enumerates and opens devices
pub trait DeviceProvider: Send + Sync {
    fn list_devices(&self) -> Vec<DeviceInfo>;

    fn open(&self, id: &str) -> Result<Box<dyn Camera>, CameraError>;
}

/// An opened camera
pub trait Camera: Send + Sync {
    fn id(&self) -> &str;

    fn is_usb3_vision(&self) -> bool;

    fn set_usb_mode(&self, mode: UsbMode) -> Result<(), CameraError>;

    fn set_chunk_mode(&self, enabled: bool) -> Result<(), CameraError>;

    fn set_region(&self, width: u32, height: u32) -> Result<(), CameraError>;

    fn exposure_bounds(&self) -> Result<(f64, f64), CameraError>;

    fn frame_rate_bounds(&self) -> Result<(f64, f64), CameraError>;

    fn gain_bounds(&self) -> Result<(f64, f64), CameraError>;

    fn set_exposure_auto(&self, mode: AutoMode) -> Result<(), CameraError>;

    /// Exposure time in microseconds
    fn set_exposure(&self, value: f64) -> Result<(), CameraError>;

    fn set_frame_rate(&self, value: f64) -> Result<(), CameraError>;

    fn set_gain(&self, value: f64) -> Result<(), CameraError>;

    fn set_acquisition_mode(&self, mode: AcquisitionMode) -> Result<(), CameraError>;

    fn pixel_format(&self) -> Result<PixelFormat, CameraError>;

    fn create_stream(&self, params: StreamParams) -> Result<Arc<dyn FrameStream>, CameraError>;

    fn start_acquisition(&self) -> Result<(), CameraError>;

    fn stop_acquisition(&self) -> Result<(), CameraError>;
}

/// Read all three bound pairs from a camera
pub fn query_bounds(camera: &dyn Camera) -> Result<DeviceBounds, CameraError> {
    let (exposure_min, exposure_max) = camera.exposure_bounds()?;
    let (frame_rate_min, frame_rate_max) = camera.frame_rate_bounds()?;
    let (gain_min, gain_max) = camera.gain_bounds()?;

    Ok(DeviceBounds {
        exposure_min,
        exposure_max,
        frame_rate_min,
        frame_rate_max,
        gain_min,
        gain_max,
    })
}
