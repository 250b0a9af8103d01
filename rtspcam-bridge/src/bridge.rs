//! Per-frame bridge from a device stream into the pipeline sink

use crate::buffer::BridgeBuffer;
use crate::sink::FrameSink;
use crate::stream::{FrameCallback, FrameStream};
use crate::stride;
use crate::types::{BufferStatus, FrameBuffer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Why a completed frame was not forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("buffer completed with status {0:?}")]
    Status(BufferStatus),
    #[error("stream owns no buffers")]
    DegeneratePool,
    #[error("payload shorter than {expected} bytes ({actual})")]
    Truncated { expected: usize, actual: usize },
}

/// Result of one frame-ready notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Pushed to the sink, zero-copy or through a scratch copy
    Forwarded { copied: bool },
    /// Signaled but no completed buffer was queued
    Empty,
    /// Returned to the pool without forwarding
    Dropped(DropReason),
    /// The sink refused the buffer; it has already been released
    Rejected,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) forwarded: AtomicU64,
    pub(crate) copied: AtomicU64,
    pub(crate) empty: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) recycled: AtomicU64,
    pub(crate) orphaned: AtomicU64,
    pub(crate) released: AtomicU64,
}

/// Moves completed frames from a stream into a sink
///
/// Holds no locks; the stream pool and the sink provide their own
/// synchronization.
pub struct BufferBridge {
    sink: Arc<dyn FrameSink>,
    counters: Arc<Counters>,
}

impl BufferBridge {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        BufferBridge {
            sink,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Wrap the bridge as a stream frame callback
    pub fn into_callback(self) -> FrameCallback {
        let bridge = Arc::new(self);
        Arc::new(move |stream: &Arc<dyn FrameStream>| {
            bridge.on_frame_ready(stream);
        })
    }

    /// Handle one frame-ready notification from `stream`
    pub fn on_frame_ready(&self, stream: &Arc<dyn FrameStream>) -> FrameOutcome {
        let Some(frame) = stream.pop_buffer() else {
            log::warn!("empty camera buffer, return");
            self.counters.empty.fetch_add(1, Ordering::Relaxed);
            return FrameOutcome::Empty;
        };

        let drop_reason = if !frame.status.is_success() {
            Some(DropReason::Status(frame.status))
        } else if stream.owned_counts().total() == 0 {
            Some(DropReason::DegeneratePool)
        } else {
            None
        };
        if let Some(reason) = drop_reason {
            return self.drop_frame(stream, frame, reason);
        }

        let source_stride = frame.row_stride();
        let scratch = if stride::needs_repair(source_stride) {
            let height = frame.height as usize;
            match stride::repack_rows(
                frame.data(),
                source_stride,
                stride::aligned_stride(source_stride),
                height,
            ) {
                Some(copy) => Some(copy),
                None => {
                    let reason = DropReason::Truncated {
                        expected: source_stride * height,
                        actual: frame.size(),
                    };
                    return self.drop_frame(stream, frame, reason);
                }
            }
        } else {
            None
        };
        let copied = scratch.is_some();

        let buffer = BridgeBuffer::new(frame, scratch, stream, self.counters.clone());

        match self.sink.push_buffer(buffer) {
            Ok(()) => {
                self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
                if copied {
                    self.counters.copied.fetch_add(1, Ordering::Relaxed);
                }
                FrameOutcome::Forwarded { copied }
            }
            Err(e) => {
                log::warn!("sink rejected frame: {}", e);
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                FrameOutcome::Rejected
            }
        }
    }

    fn drop_frame(
        &self,
        stream: &Arc<dyn FrameStream>,
        frame: FrameBuffer,
        reason: DropReason,
    ) -> FrameOutcome {
        log::debug!("dropping frame {}: {}", frame.frame_id, reason);
        stream.push_buffer(frame);
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        FrameOutcome::Dropped(reason)
    }

    /// Shared counters, readable after the bridge moved into a callback
    pub fn stats_handle(&self) -> BridgeStatsHandle {
        BridgeStatsHandle {
            counters: self.counters.clone(),
        }
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats_handle().snapshot()
    }
}

/// Read-only handle on a bridge's counters
#[derive(Clone)]
pub struct BridgeStatsHandle {
    counters: Arc<Counters>,
}

impl BridgeStatsHandle {
    pub fn snapshot(&self) -> BridgeStats {
        let c = &self.counters;
        BridgeStats {
            forwarded: c.forwarded.load(Ordering::Relaxed),
            copied: c.copied.load(Ordering::Relaxed),
            empty: c.empty.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            recycled: c.recycled.load(Ordering::Relaxed),
            orphaned: c.orphaned.load(Ordering::Relaxed),
            released: c.released.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub forwarded: u64,
    pub copied: u64,
    pub empty: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub recycled: u64,
    pub orphaned: u64,
    pub released: u64,
}

impl BridgeStats {
    /// Buffers wrapped and not yet released
    pub fn in_flight(&self) -> u64 {
        (self.forwarded + self.rejected).saturating_sub(self.released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::QueueSink;
    use crate::stream::PooledStream;
    use crate::types::PixelFormat;
    use rand::Rng;
    use std::thread;

    fn produce(stream: &Arc<PooledStream>, status: BufferStatus, fill: bool) {
        let mut frame = stream.acquire_input().unwrap();
        if fill {
            rand::thread_rng().fill(frame.data_mut());
        }
        frame.status = status;
        stream.complete(frame);
    }

    fn setup(
        capacity: usize,
        width: u32,
        height: u32,
        sink_capacity: usize,
    ) -> (
        Arc<PooledStream>,
        Arc<dyn FrameStream>,
        BufferBridge,
        crossbeam::channel::Receiver<BridgeBuffer>,
    ) {
        let stream = PooledStream::new(capacity, width, height, PixelFormat::Mono8, None);
        let handle: Arc<dyn FrameStream> = stream.clone();
        let (sink, rx) = QueueSink::new(sink_capacity);
        (stream, handle, BufferBridge::new(Arc::new(sink)), rx)
    }

    #[test]
    fn test_aligned_width_is_zero_copy() {
        let (stream, handle, bridge, rx) = setup(4, 2448, 8, 4);
        produce(&stream, BufferStatus::Success, true);

        assert_eq!(bridge.on_frame_ready(&handle), FrameOutcome::Forwarded { copied: false });

        let buffer = rx.try_recv().unwrap();
        assert!(buffer.is_zero_copy());
        assert_eq!(buffer.size(), 2448 * 8);
        assert_eq!(buffer.stride(), 2448);
    }

    #[test]
    fn test_misaligned_width_is_repacked() {
        let (stream, handle, bridge, rx) = setup(4, 2450, 8, 4);
        let mut frame = stream.acquire_input().unwrap();
        rand::thread_rng().fill(frame.data_mut());
        frame.status = BufferStatus::Success;
        let source = frame.data().to_vec();
        stream.complete(frame);

        assert_eq!(bridge.on_frame_ready(&handle), FrameOutcome::Forwarded { copied: true });

        let buffer = rx.try_recv().unwrap();
        assert!(!buffer.is_zero_copy());
        assert_eq!(buffer.stride(), 2452);
        assert_eq!(buffer.size(), 8 * 2452);
        for row in 0..8 {
            assert_eq!(
                &buffer.data()[row * 2452..row * 2452 + 2450],
                &source[row * 2450..(row + 1) * 2450]
            );
        }
        assert_eq!(bridge.stats().copied, 1);
    }

    #[test]
    fn test_failed_status_returns_buffer_immediately() {
        let (stream, handle, bridge, rx) = setup(2, 64, 4, 4);
        produce(&stream, BufferStatus::MissingPackets, false);

        assert_eq!(
            bridge.on_frame_ready(&handle),
            FrameOutcome::Dropped(DropReason::Status(BufferStatus::MissingPackets))
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(stream.owned_counts().input, 2);
        assert_eq!(bridge.stats().dropped, 1);
    }

    #[test]
    fn test_degenerate_pool_drops_frame() {
        let (stream, handle, bridge, rx) = setup(1, 64, 4, 4);
        produce(&stream, BufferStatus::Success, false);

        // The only buffer is now out of the pool, so the stream owns nothing
        assert_eq!(
            bridge.on_frame_ready(&handle),
            FrameOutcome::Dropped(DropReason::DegeneratePool)
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(stream.owned_counts().input, 1);
    }

    #[test]
    fn test_truncated_payload_is_dropped() {
        let stream = PooledStream::new(2, 2450, 4, PixelFormat::Mono8, None);
        let handle: Arc<dyn FrameStream> = stream.clone();
        let (sink, _rx) = QueueSink::new(4);
        let bridge = BufferBridge::new(Arc::new(sink));

        // Swap the pooled buffer for one whose payload is two rows short
        let pooled = stream.acquire_input().unwrap();
        drop(pooled);
        let mut short = FrameBuffer::new(2450 * 2, 2450, 4, PixelFormat::Mono8);
        short.status = BufferStatus::Success;
        stream.complete(short);

        assert_eq!(
            bridge.on_frame_ready(&handle),
            FrameOutcome::Dropped(DropReason::Truncated {
                expected: 2450 * 4,
                actual: 2450 * 2
            })
        );
    }

    #[test]
    fn test_empty_stream() {
        let (_stream, handle, bridge, _rx) = setup(2, 64, 4, 4);
        assert_eq!(bridge.on_frame_ready(&handle), FrameOutcome::Empty);
        assert_eq!(bridge.stats().empty, 1);
    }

    #[test]
    fn test_rejected_push_releases_buffer() {
        let (stream, handle, bridge, _rx) = setup(4, 64, 4, 1);
        produce(&stream, BufferStatus::Success, false);
        produce(&stream, BufferStatus::Success, false);

        assert_eq!(bridge.on_frame_ready(&handle), FrameOutcome::Forwarded { copied: false });
        assert_eq!(bridge.on_frame_ready(&handle), FrameOutcome::Rejected);

        let stats = bridge.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.recycled, 1);
        assert_eq!(stats.in_flight(), 1);
        assert_eq!(stream.owned_counts().input, 3);
    }

    #[test]
    fn test_every_forwarded_buffer_released_once() {
        const FRAMES: u64 = 200;
        let (stream, handle, bridge, rx) = setup(8, 2450, 16, 8);

        // Pipeline consumer on its own thread
        let consumer = thread::spawn(move || {
            let mut consumed = 0u64;
            while let Ok(buffer) = rx.recv() {
                assert_eq!(buffer.size(), 2452 * 16);
                drop(buffer);
                consumed += 1;
            }
            consumed
        });

        let mut forwarded = 0;
        while forwarded < FRAMES {
            if let Some(mut frame) = stream.acquire_input() {
                frame.status = BufferStatus::Success;
                frame.frame_id = forwarded;
                stream.complete(frame);
                if let FrameOutcome::Forwarded { .. } = bridge.on_frame_ready(&handle) {
                    forwarded += 1;
                }
            } else {
                thread::yield_now();
            }
        }

        let stats_handle = bridge.stats_handle();
        drop(bridge);
        let consumed = consumer.join().unwrap();

        let stats = stats_handle.snapshot();
        assert_eq!(consumed, FRAMES);
        assert_eq!(stats.released, stats.forwarded + stats.rejected);
        assert_eq!(stats.recycled, stats.released);
        assert_eq!(stats.orphaned, 0);
        assert_eq!(stream.owned_counts().total(), 8, "Every buffer back in the pool");
    }

    #[test]
    fn test_release_after_teardown_drops_frames() {
        let (stream, handle, bridge, rx) = setup(4, 64, 4, 4);
        produce(&stream, BufferStatus::Success, false);
        produce(&stream, BufferStatus::Success, false);
        bridge.on_frame_ready(&handle);
        bridge.on_frame_ready(&handle);

        drop(handle);
        drop(stream);

        let pending: Vec<_> = rx.try_iter().collect();
        assert_eq!(pending.len(), 2);
        drop(pending);

        let stats = bridge.stats();
        assert_eq!(stats.orphaned, 2);
        assert_eq!(stats.recycled, 0);
        assert_eq!(stats.released, 2);
    }

    #[test]
    fn test_callback_drives_bridge() {
        let (sink, rx) = QueueSink::new(4);
        let bridge = BufferBridge::new(Arc::new(sink));
        let stats = bridge.stats_handle();
        let stream = PooledStream::new(4, 64, 4, PixelFormat::Mono8, Some(bridge.into_callback()));
        stream.set_emit_signals(true);

        produce(&stream, BufferStatus::Success, false);

        assert!(rx.try_recv().is_ok());
        assert_eq!(stats.snapshot().forwarded, 1);
    }
}
