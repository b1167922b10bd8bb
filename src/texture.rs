//! Texture strength classification of mesh tiles.
//!
//! Each tile is scanned once over the reference image. A pixel is a "cross"
//! edge when both its right and lower neighbours differ from it by at least
//! [`EDGE_THRESHOLD`], and a "diagonal" edge when both its upper-right and
//! lower-right neighbours do. Neighbour reads are clamped to the image.

use crate::camera::CameraFamily;
use crate::config::{MeshThreshold, OperationMode};
use crate::image::ImageView;
use crate::mesh::{Mesh, MeshTile};
use crate::util::math::abs_diff_u8;

/// Minimum neighbour difference for an edge pixel.
pub const EDGE_THRESHOLD: u32 = 3;

/// Contrast is only computed when the tile's brightest pixel reaches this value.
pub const CONTRAST_BRIGHTNESS_FLOOR: i32 = 20;

/// Per-tile texture measurements.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextureMetrics {
    /// Integer average brightness.
    pub brightness: i32,
    /// Normalized contrast, truncated toward zero.
    pub contrast: i32,
    /// Percentage of cross edge pixels.
    pub edge_ratio_cross: f64,
    /// Percentage of diagonal edge pixels.
    pub edge_ratio_diagonal: f64,
    /// Usable for block matching.
    pub textured: bool,
}

/// Classifies tiles using thresholds resolved for one camera family and mode.
#[derive(Clone, Copy, Debug)]
pub struct TextureEvaluator {
    min_brightness: i32,
    max_brightness: f64,
    min_contrast: f64,
    min_edge_ratio: f64,
    contrast_offset: i32,
    search_span_rows: i32,
}

impl TextureEvaluator {
    /// Resolves thresholds, applying gradation relaxation when active.
    pub fn new(
        threshold: &MeshThreshold,
        mode: &OperationMode,
        family: CameraFamily,
        search_span_rows: usize,
    ) -> Self {
        let (contrast_factor, brightness_factor) = mode.correction_factors();
        Self {
            min_brightness: threshold.min_brightness,
            max_brightness: threshold.max_brightness as f64 * brightness_factor,
            min_contrast: threshold.min_contrast as f64 * contrast_factor,
            min_edge_ratio: threshold.min_edge_ratio,
            contrast_offset: family.contrast_offset(),
            search_span_rows: search_span_rows as i32,
        }
    }

    /// Evaluates every tile of `mesh` against `image`.
    pub fn evaluate_mesh(&self, image: ImageView<'_, u8>, mesh: &Mesh) -> Vec<TextureMetrics> {
        mesh.tiles()
            .iter()
            .map(|tile| self.evaluate_tile(image, mesh, tile))
            .collect()
    }

    /// Evaluates one tile.
    ///
    /// A tile whose block leaves the image reports zeroed metrics. A tile whose
    /// vertical search range leaves the image is measured but never textured.
    pub fn evaluate_tile(
        &self,
        image: ImageView<'_, u8>,
        mesh: &Mesh,
        tile: &MeshTile,
    ) -> TextureMetrics {
        let (w, h) = (mesh.tile_width(), mesh.tile_height());
        let block_inside = image.contains_block(tile.x as isize, tile.y as isize, w, h);
        if !block_inside {
            return TextureMetrics::default();
        }
        let window_inside = image.contains_block(
            tile.x as isize,
            tile.search_y as isize,
            w,
            h + 2 * self.search_span_rows as usize,
        );

        let mut sum: u64 = 0;
        let mut min = u8::MAX;
        let mut max = u8::MIN;
        let mut edges_cross = 0u32;
        let mut edges_diag = 0u32;

        for y in tile.y as isize..tile.y as isize + h as isize {
            for x in tile.x as isize..tile.x as isize + w as isize {
                let p = image.clamped(x, y);
                let right = image.clamped(x + 1, y);
                let down = image.clamped(x, y + 1);
                let up_right = image.clamped(x + 1, y - 1);
                let down_right = image.clamped(x + 1, y + 1);

                if abs_diff_u8(p, right) >= EDGE_THRESHOLD && abs_diff_u8(p, down) >= EDGE_THRESHOLD
                {
                    edges_cross += 1;
                }
                if abs_diff_u8(p, up_right) >= EDGE_THRESHOLD
                    && abs_diff_u8(p, down_right) >= EDGE_THRESHOLD
                {
                    edges_diag += 1;
                }

                sum += p as u64;
                min = min.min(p);
                max = max.max(p);
            }
        }

        let pixels = (w * h) as f64;
        let edge_ratio_cross = edges_cross as f64 / pixels * 100.0;
        let edge_ratio_diagonal = edges_diag as f64 / pixels * 100.0;
        let brightness = (sum / (w * h) as u64) as i32;

        let mut contrast = 0.0;
        if max as i32 >= CONTRAST_BRIGHTNESS_FLOOR && brightness > 0 {
            let range = (max as i32 - min as i32) * 1000 - self.contrast_offset;
            contrast = range as f64 / brightness as f64;
        }

        let textured = window_inside
            && brightness >= self.min_brightness
            && brightness as f64 <= self.max_brightness
            && contrast >= self.min_contrast
            && edge_ratio_cross >= self.min_edge_ratio
            && edge_ratio_diagonal >= self.min_edge_ratio;

        TextureMetrics {
            brightness,
            contrast: contrast as i32,
            edge_ratio_cross,
            edge_ratio_diagonal,
            textured,
        }
    }
}
