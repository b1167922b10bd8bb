//! Validity gate, neighbour bias and sub-pixel refinement of a fine match.

use crate::image::ImageView;
use crate::kernel::SadKernel;
use crate::mesh::MeshTile;
use crate::refine::bilinear::subpixel_search;
use crate::search::scan::SadTable;
use crate::search::{MatchParams, MatchResult};

/// Converts a fine-scan minimum into a [`MatchResult`].
///
/// Displacements outside the accepted range report a 0 % ratio at the
/// integer position. Otherwise the anchor moves one pixel up (left) when the
/// upper (left) table neighbour scores lower than the lower (right) one, and
/// the 11x11 fractional grid is searched from there.
#[allow(clippy::too_many_arguments)]
pub(crate) fn refine_match<K: SadKernel>(
    comparison: ImageView<'_, u8>,
    tile: &MeshTile,
    width: usize,
    height: usize,
    table: &SadTable<'_>,
    params: &MatchParams,
    reference_block: &[u8],
    candidate: &mut [u8],
) -> MatchResult {
    let top = tile.y + table.dj;
    let left = tile.x + table.di;
    let (w, h) = (width as i32, height as i32);

    let in_range = table.dj.abs() <= params.max_displacement_height
        && table.di >= 0
        && table.di <= params.max_displacement_width;
    if !in_range {
        return MatchResult::at_integer(left, top, w, h);
    }

    let (row, col) = (table.row as isize, table.col as isize);
    let by = if table.at(row - 1, col) < table.at(row + 1, col) {
        -1
    } else {
        0
    };
    let bx = if table.at(row, col - 1) < table.at(row, col + 1) {
        -1
    } else {
        0
    };
    let anchor_y = top + by;
    let anchor_x = left + bx;

    let best = subpixel_search::<K>(
        reference_block,
        comparison,
        anchor_x as isize,
        anchor_y as isize,
        width,
        height,
        candidate,
    );

    let ceiling = (width * height * 255) as f64;
    let ratio = (1.0 - best.sad as f64 / ceiling) * 100.0;
    let sub_top = anchor_y as f64 + best.dy;
    let sub_left = anchor_x as f64 + best.dx;
    MatchResult {
        matched: ratio > params.min_match_ratio,
        ratio,
        top: sub_top,
        bottom: sub_top + (h - 1) as f64,
        left: sub_left,
        right: sub_left + (w - 1) as f64,
    }
}
