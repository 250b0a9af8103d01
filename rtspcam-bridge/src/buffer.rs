//! Buffers handed to the pipeline and their release path

use crate::bridge::Counters;
use crate::stride;
use crate::stream::FrameStream;
use crate::types::{FrameBuffer, PixelFormat};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

/// A frame wrapped for the pipeline
///
/// Holds either the device buffer itself (zero-copy) or a stride-corrected
/// scratch copy alongside it. Dropping the buffer runs the release handler
/// exactly once: the scratch copy is freed and the device buffer goes back to
/// its stream, or is dropped if the stream no longer exists.
pub struct BridgeBuffer {
    frame: Option<FrameBuffer>,
    scratch: Option<Vec<u8>>,
    stream: Option<Weak<dyn FrameStream>>,
    size: usize,
    stride: usize,
    read_only: bool,
    counters: Arc<Counters>,
}

impl BridgeBuffer {
    pub(crate) fn new(
        frame: FrameBuffer,
        scratch: Option<Vec<u8>>,
        stream: &Arc<dyn FrameStream>,
        counters: Arc<Counters>,
    ) -> Self {
        let source_stride = frame.row_stride();
        let (size, stride) = match &scratch {
            Some(copy) => (copy.len(), stride::aligned_stride(source_stride)),
            None => (frame.size(), source_stride),
        };

        BridgeBuffer {
            frame: Some(frame),
            scratch,
            stream: Some(Arc::downgrade(stream)),
            size,
            stride,
            read_only: true,
            counters,
        }
    }

    /// Pixel bytes as the pipeline sees them
    pub fn data(&self) -> &[u8] {
        match (&self.scratch, &self.frame) {
            (Some(copy), _) => &copy[..self.size],
            (None, Some(frame)) => &frame.data()[..self.size],
            (None, None) => &[],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Row stride of [`data`](Self::data)
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// True when the data is the device buffer itself
    pub fn is_zero_copy(&self) -> bool {
        self.scratch.is_none()
    }

    pub fn width(&self) -> u32 {
        self.frame.as_ref().map_or(0, |f| f.width)
    }

    pub fn height(&self) -> u32 {
        self.frame.as_ref().map_or(0, |f| f.height)
    }

    pub fn format(&self) -> Option<PixelFormat> {
        self.frame.as_ref().map(|f| f.format)
    }

    pub fn frame_id(&self) -> u64 {
        self.frame.as_ref().map_or(0, |f| f.frame_id)
    }

    /// Release handler: free scratch memory, recycle or drop the frame
    fn release(&mut self) {
        self.scratch = None;

        let stream = self.stream.take().and_then(|weak| weak.upgrade());
        if let Some(frame) = self.frame.take() {
            match stream {
                Some(stream) => {
                    stream.push_buffer(frame);
                    self.counters.recycled.fetch_add(1, Ordering::Relaxed);
                }
                None => {
                    log::warn!(
                        "stream gone, dropping frame buffer {} instead of recycling",
                        frame.frame_id
                    );
                    drop(frame);
                    self.counters.orphaned.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.counters.released.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for BridgeBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for BridgeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeBuffer")
            .field("size", &self.size)
            .field("stride", &self.stride)
            .field("zero_copy", &self.is_zero_copy())
            .field("frame_id", &self.frame_id())
            .finish()
    }
}
