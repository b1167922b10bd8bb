//! Bilinear sub-pixel block search.
//!
//! The comparison block is resampled at fractional offsets `(k/10, l/10)`
//! for `k, l` in `0..=10` and scored against the reference block by SAD. The
//! interpolated samples are truncated to integers before scoring.

use crate::image::ImageView;
use crate::kernel::{buffer_sad, SadKernel};

/// Number of fractional steps per axis, including both ends of `[0, 1]`.
pub const SUBPIXEL_STEPS: usize = 11;

/// Best fractional offset found by [`subpixel_search`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubPixelMatch {
    /// Fractional x offset in `[0, 1]`.
    pub dx: f64,
    /// Fractional y offset in `[0, 1]`.
    pub dy: f64,
    /// SAD at the best offset.
    pub sad: u64,
}

/// Fills `out` with the `width x height` comparison block at `(x + fx, y + fy)`.
///
/// Source reads are clamped to the image.
#[allow(clippy::too_many_arguments)]
pub fn interpolate_block(
    comparison: ImageView<'_, u8>,
    x: isize,
    y: isize,
    fx: f64,
    fy: f64,
    width: usize,
    height: usize,
    out: &mut [u8],
) {
    let w00 = (1.0 - fx) * (1.0 - fy);
    let w01 = fx * (1.0 - fy);
    let w10 = (1.0 - fx) * fy;
    let w11 = fx * fy;
    for (row, dst) in out.chunks_exact_mut(width).take(height).enumerate() {
        let sy = y + row as isize;
        for (col, px) in dst.iter_mut().enumerate() {
            let sx = x + col as isize;
            let c00 = comparison.clamped(sx, sy) as f64;
            let c01 = comparison.clamped(sx + 1, sy) as f64;
            let c10 = comparison.clamped(sx, sy + 1) as f64;
            let c11 = comparison.clamped(sx + 1, sy + 1) as f64;
            let value = w00 * c00 + w01 * c01 + w10 * c10 + w11 * c11;
            *px = value.clamp(0.0, 255.0) as u8;
        }
    }
}

/// Searches the 11x11 fractional grid anchored at integer `(x, y)`.
///
/// `reference` holds the reference block row-major; `candidate` is scratch of
/// the same length. The first offset with the strictly smallest SAD wins,
/// scanning rows of `dy` in the outer loop.
pub fn subpixel_search<K: SadKernel>(
    reference: &[u8],
    comparison: ImageView<'_, u8>,
    x: isize,
    y: isize,
    width: usize,
    height: usize,
    candidate: &mut [u8],
) -> SubPixelMatch {
    let mut best = SubPixelMatch {
        dx: 0.0,
        dy: 0.0,
        sad: (width * height * 255) as u64,
    };
    for jj in 0..SUBPIXEL_STEPS {
        let fy = jj as f64 / 10.0;
        for ii in 0..SUBPIXEL_STEPS {
            let fx = ii as f64 / 10.0;
            interpolate_block(comparison, x, y, fx, fy, width, height, candidate);
            let sad = buffer_sad::<K>(reference, candidate, width);
            if sad < best.sad {
                best = SubPixelMatch { dx: fx, dy: fy, sad };
            }
        }
    }
    best
}
