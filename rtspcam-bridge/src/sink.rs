//! Pipeline intake endpoint

use crate::buffer::BridgeBuffer;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink queue is full")]
    Full,
    #[error("sink is closed")]
    Closed,
    #[error("sink rejected caps: {0}")]
    Caps(String),
}

/// Caps announced to the pipeline for raw frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkCaps {
    /// Media type and format, e.g. `video/x-raw, format=(string)GRAY8`
    pub format: String,
    pub width: u32,
    pub height: u32,
    /// Frame rate fraction; `0/1` means variable
    pub framerate: (u32, u32),
}

impl SinkCaps {
    pub fn new(format: &str, width: u32, height: u32) -> Self {
        Self {
            format: format.to_string(),
            width,
            height,
            framerate: (0, 1),
        }
    }
}

impl fmt::Display for SinkCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, width=(int){}, height=(int){}, framerate=(fraction){}/{}",
            self.format, self.width, self.height, self.framerate.0, self.framerate.1
        )
    }
}

/// Segment format used for buffer timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFormat {
    Bytes,
    Time,
}

/// Timing mode of a live source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTiming {
    pub format: TimeFormat,
    pub is_live: bool,
    pub do_timestamp: bool,
}

impl StreamTiming {
    /// Live source, timestamped on push
    pub fn live() -> Self {
        Self {
            format: TimeFormat::Time,
            is_live: true,
            do_timestamp: true,
        }
    }
}

/// Downstream intake for bridged frames
///
/// `push_buffer` must not block indefinitely. Ownership of the buffer passes
/// to the sink even when the push is rejected.
pub trait FrameSink: Send + Sync {
    fn set_caps(&self, caps: SinkCaps) -> Result<(), SinkError>;

    fn set_timing(&self, timing: StreamTiming);

    fn push_buffer(&self, buffer: BridgeBuffer) -> Result<(), SinkError>;
}

/// Bounded in-process sink backed by a crossbeam channel
///
/// The consumer receives buffers from the paired [`Receiver`]; dropping a
/// received buffer releases it back to its stream.
pub struct QueueSink {
    tx: Sender<BridgeBuffer>,
    caps: RwLock<Option<SinkCaps>>,
    timing: RwLock<Option<StreamTiming>>,
}

impl QueueSink {
    pub fn new(capacity: usize) -> (Self, Receiver<BridgeBuffer>) {
        let (tx, rx) = channel::bounded(capacity);
        (
            QueueSink {
                tx,
                caps: RwLock::new(None),
                timing: RwLock::new(None),
            },
            rx,
        )
    }

    /// Caps most recently announced to this sink
    pub fn caps(&self) -> Option<SinkCaps> {
        self.caps.read().clone()
    }

    pub fn timing(&self) -> Option<StreamTiming> {
        *self.timing.read()
    }

    pub fn queued(&self) -> usize {
        self.tx.len()
    }
}

impl FrameSink for QueueSink {
    fn set_caps(&self, caps: SinkCaps) -> Result<(), SinkError> {
        if caps.width == 0 || caps.height == 0 {
            return Err(SinkError::Caps(caps.to_string()));
        }
        *self.caps.write() = Some(caps);
        Ok(())
    }

    fn set_timing(&self, timing: StreamTiming) {
        *self.timing.write() = Some(timing);
    }

    fn push_buffer(&self, buffer: BridgeBuffer) -> Result<(), SinkError> {
        match self.tx.try_send(buffer) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::Full),
            Err(TrySendError::Disconnected(_)) => Err(SinkError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BufferBridge, FrameOutcome};
    use crate::stream::{FrameStream, PooledStream};
    use crate::types::{BufferStatus, PixelFormat};
    use std::sync::Arc;

    #[test]
    fn test_caps_string() {
        let caps = SinkCaps::new("video/x-bayer, format=(string)rggb", 2448, 2048);
        assert_eq!(
            caps.to_string(),
            "video/x-bayer, format=(string)rggb, width=(int)2448, height=(int)2048, framerate=(fraction)0/1"
        );
    }

    #[test]
    fn test_queue_sink_stores_configuration() {
        let (sink, _rx) = QueueSink::new(2);
        assert!(sink.caps().is_none());

        sink.set_caps(SinkCaps::new("video/x-raw, format=(string)GRAY8", 640, 480))
            .unwrap();
        sink.set_timing(StreamTiming::live());

        assert_eq!(sink.caps().unwrap().width, 640);
        let timing = sink.timing().unwrap();
        assert!(timing.is_live && timing.do_timestamp);
        assert_eq!(timing.format, TimeFormat::Time);
    }

    #[test]
    fn test_queue_sink_rejects_empty_caps() {
        let (sink, _rx) = QueueSink::new(2);
        let result = sink.set_caps(SinkCaps::new("video/x-raw, format=(string)GRAY8", 0, 480));
        assert!(matches!(result, Err(SinkError::Caps(_))));
    }

    #[test]
    fn test_closed_sink_releases_pushed_buffer() {
        let stream = PooledStream::new(2, 64, 4, PixelFormat::Mono8, None);
        let handle: Arc<dyn FrameStream> = stream.clone();
        let (sink, rx) = QueueSink::new(2);
        drop(rx);
        let bridge = BufferBridge::new(Arc::new(sink));

        let mut frame = stream.acquire_input().unwrap();
        frame.status = BufferStatus::Success;
        stream.complete(frame);

        assert_eq!(bridge.on_frame_ready(&handle), FrameOutcome::Rejected);
        assert_eq!(stream.owned_counts().input, 2);
    }
}
