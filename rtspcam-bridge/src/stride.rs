//! Row stride computation and repair
//!
//! The pipeline requires every row to start on a 4-byte boundary. Device
//! buffers are tightly packed, so widths whose row size is not a multiple of
//! four have to be re-laid into a padded scratch buffer before hand-off.

use rayon::prelude::*;

/// Downstream row alignment in bytes
pub const ROW_ALIGNMENT: usize = 4;

/// Frames at least this large are repacked on the rayon pool
const PARALLEL_THRESHOLD: usize = 1 << 20;

/// Bytes per tightly packed row
pub fn row_stride(width: u32, bits_per_pixel: u32) -> usize {
    (width as usize * bits_per_pixel as usize) / 8
}

/// Whether a row of `stride` bytes violates the pipeline alignment
pub fn needs_repair(stride: usize) -> bool {
    stride % ROW_ALIGNMENT != 0
}

/// Next aligned stride above a misaligned one
pub fn aligned_stride(stride: usize) -> usize {
    (stride & !(ROW_ALIGNMENT - 1)) + ROW_ALIGNMENT
}

/// Copy `height` rows of `stride` bytes into a buffer of `dst_stride` rows
///
/// Padding bytes at the end of each destination row are zero. Returns `None`
/// if `src` holds fewer than `height * stride` bytes.
pub fn repack_rows(src: &[u8], stride: usize, dst_stride: usize, height: usize) -> Option<Vec<u8>> {
    debug_assert!(dst_stride >= stride);

    let needed = stride.checked_mul(height)?;
    if src.len() < needed || stride == 0 {
        return None;
    }

    let src = &src[..needed];
    let mut dst = vec![0u8; dst_stride * height];

    if dst.len() >= PARALLEL_THRESHOLD {
        dst.par_chunks_mut(dst_stride)
            .zip(src.par_chunks(stride))
            .for_each(|(out_row, in_row)| out_row[..stride].copy_from_slice(in_row));
    } else {
        for (out_row, in_row) in dst.chunks_mut(dst_stride).zip(src.chunks(stride)) {
            out_row[..stride].copy_from_slice(in_row);
        }
    }

    Some(dst)
}
