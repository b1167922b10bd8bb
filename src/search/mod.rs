//! Block matching of textured tiles between the reference and comparison images.
//!
//! Each textured tile goes through three stages: a coarse horizontal scan
//! along its own row, a fine 2D scan of +/-10 columns around the coarse
//! candidate over the full vertical span, and sub-pixel refinement on a
//! bilinear 0.1-pixel grid. Untextured tiles are skipped and report no match.

pub(crate) mod coarse;
pub(crate) mod refine;
pub(crate) mod scan;

use crate::config::{MeshParameter, MeshThreshold};
use crate::image::ImageView;
use crate::kernel::ActiveSad;
use crate::mesh::{Mesh, MeshTile};
use crate::texture::TextureMetrics;
use crate::trace::{trace_event, trace_span};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

pub use scan::{FINE_COLUMNS, FINE_HALF_WIDTH};

/// Per-tile match outcome with sub-pixel corner positions in the comparison image.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MatchResult {
    /// Ratio exceeded the configured minimum.
    pub matched: bool,
    /// Similarity in percent, `(1 - SAD / (area * 255)) * 100`.
    pub ratio: f64,
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl MatchResult {
    /// Unmatched result at an integer block position.
    pub(crate) fn at_integer(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            matched: false,
            ratio: 0.0,
            top: top as f64,
            bottom: (top + height - 1) as f64,
            left: left as f64,
            right: (left + width - 1) as f64,
        }
    }
}

/// Matching limits resolved from the mesh geometry and thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchParams {
    pub search_span_rows: usize,
    pub search_span_cols: usize,
    pub max_displacement_height: i32,
    pub max_displacement_width: i32,
    pub min_match_ratio: f64,
}

impl MatchParams {
    /// Collects the matching limits from the configuration groups.
    pub fn new(mesh: &MeshParameter, threshold: &MeshThreshold) -> Self {
        Self {
            search_span_rows: mesh.search_span_rows,
            search_span_cols: mesh.search_span_cols,
            max_displacement_height: threshold.max_displacement_height,
            max_displacement_width: threshold.max_displacement_width,
            min_match_ratio: threshold.min_match_ratio,
        }
    }
}

/// Reusable buffers for matching one tile at a time.
///
/// Sized once from the tile geometry and vertical span; reallocated only when
/// that geometry changes.
#[derive(Clone, Debug)]
pub struct MatchScratch {
    sad_cells: Vec<u64>,
    reference: Vec<u8>,
    candidate: Vec<u8>,
}

impl MatchScratch {
    /// Allocates buffers for `tile_width x tile_height` tiles and `span_rows`.
    pub fn new(tile_width: usize, tile_height: usize, span_rows: usize) -> Self {
        let area = tile_width * tile_height;
        Self {
            sad_cells: vec![0; (2 * span_rows + 1) * FINE_COLUMNS],
            reference: vec![0; area],
            candidate: vec![0; area],
        }
    }

    fn fits(&self, tile_width: usize, tile_height: usize, span_rows: usize) -> bool {
        self.reference.len() == tile_width * tile_height
            && self.sad_cells.len() == (2 * span_rows + 1) * FINE_COLUMNS
    }
}

/// Block matcher for one mesh configuration.
#[derive(Clone, Copy, Debug)]
pub struct BlockMatcher {
    params: MatchParams,
}

impl BlockMatcher {
    pub fn new(params: MatchParams) -> Self {
        Self { params }
    }

    /// Returns the matching limits.
    pub fn params(&self) -> &MatchParams {
        &self.params
    }

    /// Matches one tile. The caller guarantees the tile and its vertical
    /// search range lie inside both images.
    pub fn match_tile(
        &self,
        reference: ImageView<'_, u8>,
        comparison: ImageView<'_, u8>,
        mesh: &Mesh,
        tile: &MeshTile,
        scratch: &mut MatchScratch,
    ) -> MatchResult {
        let (w, h) = (mesh.tile_width(), mesh.tile_height());
        let span_rows = self.params.search_span_rows;
        if !scratch.fits(w, h, span_rows) {
            *scratch = MatchScratch::new(w, h, span_rows);
        }

        for (row, dst) in scratch.reference.chunks_exact_mut(w).enumerate() {
            let src = tile.y as usize + row;
            for (col, px) in dst.iter_mut().enumerate() {
                *px = reference
                    .get(tile.x as usize + col, src)
                    .copied()
                    .unwrap_or(0);
            }
        }

        let coarse_di = coarse::coarse_scan::<ActiveSad>(
            reference,
            comparison,
            tile,
            w,
            h,
            self.params.search_span_cols,
        );
        let table = scan::fine_scan::<ActiveSad>(
            reference,
            comparison,
            tile,
            w,
            h,
            span_rows,
            coarse_di,
            &mut scratch.sad_cells,
        );
        refine::refine_match::<ActiveSad>(
            comparison,
            tile,
            w,
            h,
            &table,
            &self.params,
            &scratch.reference,
            &mut scratch.candidate,
        )
    }

    /// Matches every textured tile of `mesh` sequentially.
    pub fn match_mesh(
        &self,
        reference: ImageView<'_, u8>,
        comparison: ImageView<'_, u8>,
        mesh: &Mesh,
        textures: &[TextureMetrics],
        scratch: &mut MatchScratch,
    ) -> Vec<MatchResult> {
        let _span = trace_span!("block_match", tiles = mesh.len()).entered();
        let results: Vec<MatchResult> = mesh
            .tiles()
            .iter()
            .zip(textures)
            .map(|(tile, texture)| {
                if texture.textured {
                    self.match_tile(reference, comparison, mesh, tile, scratch)
                } else {
                    MatchResult::default()
                }
            })
            .collect();
        log_summary(textures, &results);
        results
    }

    /// Matches every textured tile of `mesh` in parallel, one scratch set per worker.
    ///
    /// Produces exactly the same results as [`BlockMatcher::match_mesh`].
    #[cfg(feature = "rayon")]
    pub fn match_mesh_par(
        &self,
        reference: ImageView<'_, u8>,
        comparison: ImageView<'_, u8>,
        mesh: &Mesh,
        textures: &[TextureMetrics],
    ) -> Vec<MatchResult> {
        let _span = trace_span!("block_match", tiles = mesh.len(), parallel = true).entered();
        let (w, h) = (mesh.tile_width(), mesh.tile_height());
        let span_rows = self.params.search_span_rows;
        let results: Vec<MatchResult> = mesh
            .tiles()
            .par_iter()
            .zip(textures.par_iter())
            .map_init(
                || MatchScratch::new(w, h, span_rows),
                |scratch, (tile, texture)| {
                    if texture.textured {
                        self.match_tile(reference, comparison, mesh, tile, scratch)
                    } else {
                        MatchResult::default()
                    }
                },
            )
            .collect();
        log_summary(textures, &results);
        results
    }
}

fn log_summary(textures: &[TextureMetrics], results: &[MatchResult]) {
    let textured = textures.iter().filter(|t| t.textured).count();
    let matched = results.iter().filter(|r| r.matched).count();
    trace_event!("match_summary", textured = textured, matched = matched);
}
