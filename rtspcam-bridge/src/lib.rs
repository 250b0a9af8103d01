//! Camera to pipeline buffer bridge
//!
//! Moves captured frames from a device stream's buffer pool into a streaming
//! pipeline sink with as little copying as the pipeline allows.
//!
//! Key pieces:
//! - Lock-free stream pool (`PooledStream`) shared by capture and release paths
//! - Zero-copy hand-off when rows are already 4-byte aligned
//! - Row repacking (rayon for large frames) when they are not
//! - Release on drop: every wrapped frame returns to its pool exactly once,
//!   or is dropped if the stream has been torn down

pub mod bridge;
pub mod buffer;
pub mod sink;
pub mod stream;
pub mod stride;
pub mod types;

pub use bridge::*;
pub use buffer::*;
pub use sink::*;
pub use stream::*;
pub use stride::{aligned_stride, needs_repair, repack_rows, row_stride, ROW_ALIGNMENT};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_alignment_constant() {
        assert_eq!(ROW_ALIGNMENT, 4);
        assert!(!needs_repair(row_stride(2448, PixelFormat::Mono8.bits_per_pixel())));
    }
}
