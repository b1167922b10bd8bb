//! Coarse horizontal scan.
//!
//! The reference tile is compared against the comparison image along its own
//! row, from zero displacement up to the horizontal search span (clipped at
//! the right image edge). The best column seeds the fine 2D scan.

use crate::image::ImageView;
use crate::kernel::{block_sad, SadKernel};
use crate::mesh::MeshTile;

/// Returns the horizontal displacement with the strictly smallest SAD.
///
/// Displacements that never beat the `255 * area` ceiling leave the result
/// at zero.
pub(crate) fn coarse_scan<K: SadKernel>(
    reference: ImageView<'_, u8>,
    comparison: ImageView<'_, u8>,
    tile: &MeshTile,
    width: usize,
    height: usize,
    span_cols: usize,
) -> i32 {
    let room = comparison.width() as i64 - tile.x as i64 - width as i64;
    let last = (span_cols as i64).min(room);
    let mut best_sad = (width * height * 255) as u64;
    let mut best_di = 0i32;
    let (x, y) = (tile.x as isize, tile.y as isize);
    for di in 0..=last {
        let Some(sad) = block_sad::<K>(
            reference,
            comparison,
            x,
            y,
            x + di as isize,
            y,
            width,
            height,
        ) else {
            continue;
        };
        if sad < best_sad {
            best_sad = sad;
            best_di = di as i32;
        }
    }
    best_di
}
