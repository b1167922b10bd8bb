//! Fine 2D scan around the coarse candidate.
//!
//! The table covers every vertical displacement in `-span..=span` and the 21
//! columns `coarse - 10..=coarse + 10`. Placements that leave the comparison
//! image score `u64::MAX`.

use crate::image::ImageView;
use crate::kernel::{block_sad, SadKernel};
use crate::mesh::MeshTile;

/// Half-width of the fine horizontal scan.
pub const FINE_HALF_WIDTH: i32 = 10;
/// Columns in the fine SAD table.
pub const FINE_COLUMNS: usize = (2 * FINE_HALF_WIDTH + 1) as usize;

/// SAD table for one tile plus the location of its minimum.
#[derive(Clone, Debug)]
pub(crate) struct SadTable<'a> {
    cells: &'a [u64],
    rows: usize,
    /// Best horizontal displacement.
    pub di: i32,
    /// Best vertical displacement.
    pub dj: i32,
    /// Table column of the minimum.
    pub col: usize,
    /// Table row of the minimum.
    pub row: usize,
}

impl SadTable<'_> {
    /// Reads a cell, treating positions outside the table as unmatchable.
    pub fn at(&self, row: isize, col: isize) -> u64 {
        if row < 0 || col < 0 || row as usize >= self.rows || col as usize >= FINE_COLUMNS {
            return u64::MAX;
        }
        self.cells
            .get(row as usize * FINE_COLUMNS + col as usize)
            .copied()
            .unwrap_or(u64::MAX)
    }
}

/// Fills `cells` with the fine SAD table and locates its strict minimum.
///
/// `cells` must hold at least `(2 * span_rows + 1) * FINE_COLUMNS` entries.
/// When no placement beats the `255 * area` ceiling the result stays at
/// `(coarse_di, 0)`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn fine_scan<'a, K: SadKernel>(
    reference: ImageView<'_, u8>,
    comparison: ImageView<'_, u8>,
    tile: &MeshTile,
    width: usize,
    height: usize,
    span_rows: usize,
    coarse_di: i32,
    cells: &'a mut [u64],
) -> SadTable<'a> {
    let rows = 2 * span_rows + 1;
    let span = span_rows as i32;
    let (x, y) = (tile.x as isize, tile.y as isize);

    let mut best_sad = (width * height * 255) as u64;
    let mut best = (coarse_di, 0i32, FINE_HALF_WIDTH as usize, span_rows);

    for (row, line) in cells.chunks_exact_mut(FINE_COLUMNS).take(rows).enumerate() {
        let dj = row as i32 - span;
        for (col, cell) in line.iter_mut().enumerate() {
            let di = coarse_di - FINE_HALF_WIDTH + col as i32;
            let sad = block_sad::<K>(
                reference,
                comparison,
                x,
                y,
                x + di as isize,
                y + dj as isize,
                width,
                height,
            )
            .unwrap_or(u64::MAX);
            *cell = sad;
            if sad < best_sad {
                best_sad = sad;
                best = (di, dj, col, row);
            }
        }
    }

    SadTable {
        cells: &cells[..rows * FINE_COLUMNS],
        rows,
        di: best.0,
        dj: best.1,
        col: best.2,
        row: best.3,
    }
}
