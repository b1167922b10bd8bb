//! Sum-of-absolute-differences kernels.
//!
//! Every SAD in a calibration pass reduces to row-by-row sums over two equal
//! length byte slices, so the kernel trait is a single row primitive. The
//! block helpers here walk image rows and delegate to the selected kernel.

use crate::image::ImageView;

/// Row-level SAD primitive.
pub trait SadKernel {
    /// Sum of absolute differences of two equal-length rows.
    fn row_sad(a: &[u8], b: &[u8]) -> u32;
}

pub mod scalar;

#[cfg(feature = "simd")]
pub mod simd;

#[cfg(not(feature = "simd"))]
pub(crate) use scalar::ScalarSad as ActiveSad;
#[cfg(feature = "simd")]
pub(crate) use simd::SimdSad as ActiveSad;

/// SAD between the `width x height` reference block at `(rx, ry)` and the
/// comparison block at `(cx, cy)`.
///
/// Returns `None` if either block leaves its image.
#[allow(clippy::too_many_arguments)]
pub fn block_sad<K: SadKernel>(
    reference: ImageView<'_, u8>,
    comparison: ImageView<'_, u8>,
    rx: isize,
    ry: isize,
    cx: isize,
    cy: isize,
    width: usize,
    height: usize,
) -> Option<u64> {
    if !reference.contains_block(rx, ry, width, height)
        || !comparison.contains_block(cx, cy, width, height)
    {
        return None;
    }
    let (rx, ry, cx, cy) = (rx as usize, ry as usize, cx as usize, cy as usize);
    let mut sum = 0u64;
    for row in 0..height {
        let a = reference.row(ry + row)?.get(rx..rx + width)?;
        let b = comparison.row(cy + row)?.get(cx..cx + width)?;
        sum += K::row_sad(a, b) as u64;
    }
    Some(sum)
}

/// SAD between two contiguous blocks stored row-major with the same row width.
pub fn buffer_sad<K: SadKernel>(a: &[u8], b: &[u8], width: usize) -> u64 {
    if width == 0 {
        return 0;
    }
    a.chunks_exact(width)
        .zip(b.chunks_exact(width))
        .map(|(ra, rb)| K::row_sad(ra, rb) as u64)
        .sum()
}
