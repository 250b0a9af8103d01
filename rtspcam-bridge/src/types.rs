//! Frame data types and pixel formats

use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::ops::RangeInclusive;

/// Camera pixel formats (GenICam PFNC codes)
///
/// Bits 16..24 of the code carry the number of bits per pixel.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Mono8 = 0x0108_0001,
    Mono10 = 0x0110_0003,
    Mono12 = 0x0110_0005,
    Mono12Packed = 0x010C_0006,
    Mono16 = 0x0110_0007,
    BayerGR8 = 0x0108_0008,
    BayerRG8 = 0x0108_0009,
    BayerGB8 = 0x0108_000A,
    BayerBG8 = 0x0108_000B,
    Rgb8 = 0x0218_0014,
    Bgr8 = 0x0218_0015,
    Yuv422Uyvy = 0x0210_001F,
}

impl PixelFormat {
    const ALL: [PixelFormat; 12] = [
        PixelFormat::Mono8,
        PixelFormat::Mono10,
        PixelFormat::Mono12,
        PixelFormat::Mono12Packed,
        PixelFormat::Mono16,
        PixelFormat::BayerGR8,
        PixelFormat::BayerRG8,
        PixelFormat::BayerGB8,
        PixelFormat::BayerBG8,
        PixelFormat::Rgb8,
        PixelFormat::Bgr8,
        PixelFormat::Yuv422Uyvy,
    ];

    /// Look up a format by its PFNC code
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|format| *format as u32 == code)
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Bits per pixel, as encoded in the PFNC code
    pub fn bits_per_pixel(self) -> u32 {
        (self.code() >> 16) & 0xff
    }

    /// Pipeline caps prefix for this format, if the pipeline can carry it
    pub fn caps_string(self) -> Option<&'static str> {
        match self {
            PixelFormat::Mono8 => Some("video/x-raw, format=(string)GRAY8"),
            PixelFormat::Mono10 | PixelFormat::Mono12 | PixelFormat::Mono16 => {
                Some("video/x-raw, format=(string)GRAY16_LE")
            }
            PixelFormat::BayerGR8 => Some("video/x-bayer, format=(string)grbg"),
            PixelFormat::BayerRG8 => Some("video/x-bayer, format=(string)rggb"),
            PixelFormat::BayerGB8 => Some("video/x-bayer, format=(string)gbrg"),
            PixelFormat::BayerBG8 => Some("video/x-bayer, format=(string)bggr"),
            PixelFormat::Rgb8 => Some("video/x-raw, format=(string)RGB"),
            PixelFormat::Bgr8 => Some("video/x-raw, format=(string)BGR"),
            PixelFormat::Yuv422Uyvy => Some("video/x-raw, format=(string)UYVY"),
            // Bit-packed formats have no pipeline representation
            PixelFormat::Mono12Packed => None,
        }
    }

    /// Payload size of a tightly packed frame
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        crate::stride::row_stride(width, self.bits_per_pixel()) * height as usize
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Mono10 => "Mono10",
            PixelFormat::Mono12 => "Mono12",
            PixelFormat::Mono12Packed => "Mono12Packed",
            PixelFormat::Mono16 => "Mono16",
            PixelFormat::BayerGR8 => "BayerGR8",
            PixelFormat::BayerRG8 => "BayerRG8",
            PixelFormat::BayerGB8 => "BayerGB8",
            PixelFormat::BayerBG8 => "BayerBG8",
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Bgr8 => "BGR8",
            PixelFormat::Yuv422Uyvy => "YUV422_8_UYVY",
        };
        f.write_str(name)
    }
}

/// Completion status of a device buffer
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStatus {
    Success = 0,
    Cleared = 1,
    Timeout = 2,
    MissingPackets = 3,
    SizeMismatch = 4,
    Filling = 5,
    Aborted = 6,
}

impl BufferStatus {
    pub fn is_success(self) -> bool {
        self == BufferStatus::Success
    }
}

/// One captured image, owned by a stream pool while not in flight
pub struct FrameBuffer {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub status: BufferStatus,
    pub frame_id: u64,
    pub timestamp_ns: u64,
}

impl FrameBuffer {
    /// Allocate a cleared buffer of `size` bytes
    pub fn new(size: usize, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data: vec![0u8; size],
            width,
            height,
            format,
            status: BufferStatus::Cleared,
            frame_id: 0,
            timestamp_ns: 0,
        }
    }

    /// Allocate a buffer sized for a tightly packed frame
    pub fn for_frame(width: u32, height: u32, format: PixelFormat) -> Self {
        Self::new(format.frame_size(width, height), width, height, format)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Source row stride: `width * bits_per_pixel / 8`
    pub fn row_stride(&self) -> usize {
        crate::stride::row_stride(self.width, self.format.bits_per_pixel())
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("size", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("status", &self.status)
            .field("frame_id", &self.frame_id)
            .finish()
    }
}

/// Exposure, frame rate and gain limits reported by a device
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct DeviceBounds {
    pub exposure_min: f64,
    pub exposure_max: f64,
    pub frame_rate_min: f64,
    pub frame_rate_max: f64,
    pub gain_min: f64,
    pub gain_max: f64,
}

impl DeviceBounds {
    pub fn exposure(&self) -> RangeInclusive<f64> {
        self.exposure_min..=self.exposure_max
    }

    pub fn frame_rate(&self) -> RangeInclusive<f64> {
        self.frame_rate_min..=self.frame_rate_max
    }

    pub fn gain(&self) -> RangeInclusive<f64> {
        self.gain_min..=self.gain_max
    }
}

/// Buffer accounting of a stream: queued for filling, completed, being filled
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct OwnedCounts {
    pub input: u32,
    pub output: u32,
    pub filling: u32,
}

impl OwnedCounts {
    pub fn total(&self) -> u32 {
        self.input + self.output + self.filling
    }
}
