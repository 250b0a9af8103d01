//! Device stream: a bounded pool of frame buffers shared between the
//! capture thread (producer) and the bridge (consumer)

use crate::types::{BufferStatus, FrameBuffer, OwnedCounts, PixelFormat};
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Per-frame notification, called on the stream's worker thread
pub type FrameCallback = Arc<dyn Fn(&Arc<dyn FrameStream>) + Send + Sync>;

/// Consumer-side view of a device stream
///
/// Implementations must be safe to pop from and push to concurrently.
pub trait FrameStream: Send + Sync {
    /// Take the oldest completed buffer
    fn pop_buffer(&self) -> Option<FrameBuffer>;

    /// Hand a buffer back to the pool for refilling
    fn push_buffer(&self, buffer: FrameBuffer);

    /// Buffers currently owned by the stream
    fn owned_counts(&self) -> OwnedCounts;

    /// Enable or disable per-frame callbacks
    fn set_emit_signals(&self, enabled: bool);

    fn emits_signals(&self) -> bool;
}

/// Lock-free buffer pool implementing [`FrameStream`]
pub struct PooledStream {
    // Empty buffers waiting for the producer
    input: ArrayQueue<FrameBuffer>,
    // Completed buffers waiting for the consumer
    output: ArrayQueue<FrameBuffer>,
    filling: AtomicU32,
    emit_signals: AtomicBool,
    on_frame: Option<FrameCallback>,
    capacity: usize,

    completed: AtomicU64,
    underruns: AtomicU64,
}

impl PooledStream {
    /// Create a stream with `capacity` buffers sized for the given frame
    pub fn new(
        capacity: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
        on_frame: Option<FrameCallback>,
    ) -> Arc<Self> {
        let slots = capacity.max(1);
        let input = ArrayQueue::new(slots);

        for _ in 0..capacity {
            // Cannot fail: the queue holds exactly `capacity` slots
            let _ = input.push(FrameBuffer::for_frame(width, height, format));
        }

        Arc::new(PooledStream {
            input,
            output: ArrayQueue::new(slots),
            filling: AtomicU32::new(0),
            emit_signals: AtomicBool::new(false),
            on_frame,
            capacity,
            completed: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
        })
    }

    /// Take an empty buffer to fill (producer side)
    pub fn acquire_input(&self) -> Option<FrameBuffer> {
        match self.input.pop() {
            Some(buffer) => {
                self.filling.fetch_add(1, Ordering::AcqRel);
                Some(buffer)
            }
            None => {
                self.underruns.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Queue a filled buffer and notify the consumer (producer side)
    pub fn complete(self: &Arc<Self>, buffer: FrameBuffer) {
        let _ = self
            .filling
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        if self.output.push(buffer).is_err() {
            log::error!("stream output queue overflow, dropping buffer");
            return;
        }
        self.completed.fetch_add(1, Ordering::Relaxed);

        if self.emits_signals() {
            if let Some(on_frame) = &self.on_frame {
                let handle: Arc<dyn FrameStream> = self.clone();
                on_frame(&handle);
            }
        }
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            capacity: self.capacity,
            counts: self.owned_counts(),
            completed: self.completed.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }
}

impl FrameStream for PooledStream {
    fn pop_buffer(&self) -> Option<FrameBuffer> {
        self.output.pop()
    }

    fn push_buffer(&self, mut buffer: FrameBuffer) {
        buffer.status = BufferStatus::Cleared;
        if self.input.push(buffer).is_err() {
            log::error!("stream input queue overflow, dropping buffer");
        }
    }

    fn owned_counts(&self) -> OwnedCounts {
        OwnedCounts {
            input: self.input.len() as u32,
            output: self.output.len() as u32,
            filling: self.filling.load(Ordering::Acquire),
        }
    }

    fn set_emit_signals(&self, enabled: bool) {
        self.emit_signals.store(enabled, Ordering::Release);
    }

    fn emits_signals(&self) -> bool {
        self.emit_signals.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StreamStats {
    pub capacity: usize,
    pub counts: OwnedCounts,
    pub completed: u64,
    pub underruns: u64,
}
