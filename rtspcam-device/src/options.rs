//! Stream options shared by the device session and the server
//!
//! The record is immutable once built; components receive it as
//! `Arc<StreamOptions>`.

use crate::error::ConfigError;

/// USB3 Vision transfer mode
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UsbMode {
    Sync = 0,
    #[default]
    Async = 1,
}

/// Which encoder the pipeline description targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodePath {
    Cpu,
    #[default]
    Gpu,
}

/// Options for one camera stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOptions {
    /// RTSP server bind address
    pub address: String,
    pub port: u16,
    /// Mount path, with or without a leading '/'
    pub path: String,

    /// Camera region
    pub width: u32,
    pub height: u32,
    /// Encoder bitrate
    pub bitrate: u32,

    /// Overrides applied at acquisition start when within device bounds
    pub frame_rate: Option<f64>,
    pub exposure: Option<f64>,
    pub gain: Option<f64>,

    pub usb_mode: UsbMode,
    /// Buffers in the device stream pool
    pub buffer_count: usize,
    pub encode_path: EncodePath,
    /// Device to open; the first listed device when unset
    pub device_id: Option<String>,

    /// Try realtime scheduling for the stream worker thread
    pub realtime_worker: bool,
    /// Pin the stream worker thread to this core
    pub worker_core: Option<usize>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 554,
            path: "stream".to_string(),
            width: 2448,
            height: 2048,
            bitrate: 10_000,
            frame_rate: None,
            exposure: None,
            gain: None,
            usb_mode: UsbMode::Async,
            buffer_count: 30,
            encode_path: EncodePath::Gpu,
            device_id: None,
            realtime_worker: true,
            worker_core: None,
        }
    }
}

impl StreamOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyRegion {
                width: self.width,
                height: self.height,
            });
        }
        if self.bitrate == 0 {
            return Err(ConfigError::ZeroBitrate);
        }
        if self.buffer_count == 0 {
            return Err(ConfigError::ZeroBuffers);
        }
        if self.address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        Ok(())
    }

    /// Mount path with exactly one leading '/'
    pub fn mount_path(&self) -> String {
        format!("/{}", self.path.trim_start_matches('/'))
    }

    pub fn stream_url(&self) -> String {
        format!("rtsp://{}:{}{}", self.address, self.port, self.mount_path())
    }
}
