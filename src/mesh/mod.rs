//! Mesh tile geometry.
//!
//! Tiles expand outward from the configured center in four quadrants
//! (right-lower, right-upper, left-upper, left-lower). Within a quadrant each
//! row grows until the next tile's far edge leaves the clip region, and rows
//! stop once the next row's far edge leaves it. The first tile of every row
//! is always placed. Generation halts when [`MESH_CAPACITY`] tiles exist and
//! the mesh is flagged as truncated.

use crate::config::MeshParameter;
use crate::trace::trace_warn;

/// Maximum number of tiles in a mesh.
pub const MESH_CAPACITY: usize = 5000;

/// One sampling tile and its search window origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshTile {
    /// Position in raster order.
    pub index: usize,
    /// Reference block top-left x.
    pub x: i32,
    /// Reference block top-left y.
    pub y: i32,
    /// Search window top-left x in the comparison image.
    pub search_x: i32,
    /// Search window top-left y in the comparison image.
    pub search_y: i32,
}

/// Generated tile set for one mesh configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    tiles: Vec<MeshTile>,
    truncated: bool,
    tile_width: usize,
    tile_height: usize,
    search_width: usize,
    search_height: usize,
}

struct Quadrant {
    di: i32,
    dj: i32,
    offset_x: i32,
    offset_y: i32,
    right: bool,
    lower: bool,
}

const QUADRANTS: [Quadrant; 4] = [
    Quadrant {
        di: 1,
        dj: 1,
        offset_x: 0,
        offset_y: 0,
        right: true,
        lower: true,
    },
    Quadrant {
        di: 1,
        dj: -1,
        offset_x: 0,
        offset_y: -1,
        right: true,
        lower: false,
    },
    Quadrant {
        di: -1,
        dj: -1,
        offset_x: -1,
        offset_y: -1,
        right: false,
        lower: false,
    },
    Quadrant {
        di: -1,
        dj: 1,
        offset_x: -1,
        offset_y: 0,
        right: false,
        lower: true,
    },
];

impl Mesh {
    /// Generates the mesh for `params` on an image `image_width` pixels wide.
    ///
    /// The image width only feeds the raster sort key. Degenerate geometry
    /// (zero-sized tiles or zero quadrant counts) yields an empty mesh.
    pub fn generate(params: &MeshParameter, image_width: usize) -> Self {
        let mut mesh = Mesh {
            tiles: Vec::new(),
            truncated: false,
            tile_width: params.tile_width,
            tile_height: params.tile_height,
            search_width: params.tile_width + params.search_span_cols,
            search_height: params.tile_height + 2 * params.search_span_rows,
        };
        if params.tile_width == 0 || params.tile_height == 0 {
            return mesh;
        }

        let w = params.tile_width as i32;
        let h = params.tile_height as i32;
        let mut corners: Vec<(i32, i32)> = Vec::new();

        'quadrants: for q in &QUADRANTS {
            let cols = if q.right {
                params.tiles_right
            } else {
                params.tiles_left
            };
            let rows = if q.lower {
                params.tiles_down
            } else {
                params.tiles_up
            };

            let mut top = params.center_y + q.offset_y;
            let mut bottom = top + q.dj * (h - 1);
            for _ in 0..rows {
                let mut left = params.center_x + q.offset_x;
                let mut right = left + q.di * (w - 1);
                for _ in 0..cols {
                    corners.push((left.min(right), top.min(bottom)));
                    if corners.len() >= MESH_CAPACITY {
                        mesh.truncated = true;
                        break 'quadrants;
                    }
                    left = right + q.di;
                    right = left + q.di * (w - 1);
                    if right < params.region_left || right > params.region_right {
                        break;
                    }
                }
                top = bottom + q.dj;
                bottom = top + q.dj * (h - 1);
                if bottom < params.region_top || bottom > params.region_bottom {
                    break;
                }
            }
        }

        if mesh.truncated {
            trace_warn!("mesh_truncated", capacity = MESH_CAPACITY);
        }

        let stride = image_width as i64;
        corners.sort_by_key(|&(x, y)| y as i64 * stride + x as i64);

        let span_rows = params.search_span_rows as i32;
        mesh.tiles = corners
            .into_iter()
            .enumerate()
            .map(|(index, (x, y))| MeshTile {
                index,
                x,
                y,
                search_x: x,
                search_y: y - span_rows,
            })
            .collect();
        mesh
    }

    /// Tiles in raster order.
    pub fn tiles(&self) -> &[MeshTile] {
        &self.tiles
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Returns true if the mesh has no tiles.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Returns true if generation stopped at [`MESH_CAPACITY`].
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Tile width in pixels.
    pub fn tile_width(&self) -> usize {
        self.tile_width
    }

    /// Tile height in pixels.
    pub fn tile_height(&self) -> usize {
        self.tile_height
    }

    /// Search window width (tile width plus horizontal span).
    pub fn search_width(&self) -> usize {
        self.search_width
    }

    /// Search window height (tile height plus twice the vertical span).
    pub fn search_height(&self) -> usize {
        self.search_height
    }
}

#[cfg(test)]
mod tests {
    use super::{Mesh, MESH_CAPACITY};
    use crate::config::MeshParameter;

    fn small_params() -> MeshParameter {
        MeshParameter {
            tile_width: 10,
            tile_height: 10,
            center_x: 50,
            center_y: 50,
            tiles_right: 2,
            tiles_left: 2,
            tiles_up: 2,
            tiles_down: 2,
            region_top: 0,
            region_bottom: 100,
            region_left: 0,
            region_right: 100,
            search_span_rows: 3,
            search_span_cols: 20,
        }
    }

    #[test]
    fn quadrants_tile_around_center_without_overlap() {
        let mesh = Mesh::generate(&small_params(), 100);
        assert_eq!(mesh.len(), 16);
        let first = mesh.tiles()[0];
        assert_eq!((first.x, first.y), (30, 30));
        let last = mesh.tiles()[15];
        assert_eq!((last.x, last.y), (60, 60));
        assert!(mesh.tiles().iter().any(|t| (t.x, t.y) == (50, 50)));
        assert!(mesh.tiles().iter().any(|t| (t.x, t.y) == (40, 40)));
        assert!(!mesh.truncated());
    }

    #[test]
    fn tiles_are_in_raster_order_with_search_offset() {
        let mesh = Mesh::generate(&small_params(), 100);
        for (i, pair) in mesh.tiles().windows(2).enumerate() {
            let a = pair[0].y * 100 + pair[0].x;
            let b = pair[1].y * 100 + pair[1].x;
            assert!(a < b, "tile {i} out of order");
        }
        for tile in mesh.tiles() {
            assert_eq!(tile.search_x, tile.x);
            assert_eq!(tile.search_y, tile.y - 3);
        }
        assert_eq!(mesh.search_width(), 30);
        assert_eq!(mesh.search_height(), 16);
    }

    #[test]
    fn region_clips_rows_but_keeps_first_tile() {
        let mut params = small_params();
        params.tiles_right = 10;
        params.region_right = 75;
        let mesh = Mesh::generate(&params, 100);
        let max_x = mesh.tiles().iter().map(|t| t.x).max().unwrap();
        // next tile's right edge (79) leaves the region after the tile at 60
        assert_eq!(max_x, 60);

        params.region_right = 10;
        let mesh = Mesh::generate(&params, 100);
        assert!(mesh.tiles().iter().any(|t| t.x == 50));
    }

    #[test]
    fn capacity_truncates_and_flags() {
        let params = MeshParameter {
            tile_width: 1,
            tile_height: 1,
            center_x: 100,
            center_y: 100,
            tiles_right: 100,
            tiles_left: 100,
            tiles_up: 100,
            tiles_down: 100,
            region_top: 0,
            region_bottom: 200,
            region_left: 0,
            region_right: 200,
            search_span_rows: 1,
            search_span_cols: 1,
        };
        let mesh = Mesh::generate(&params, 200);
        assert_eq!(mesh.len(), MESH_CAPACITY);
        assert!(mesh.truncated());
    }

    #[test]
    fn zero_counts_yield_empty_mesh() {
        let mut params = small_params();
        params.tiles_up = 0;
        params.tiles_down = 0;
        assert!(Mesh::generate(&params, 100).is_empty());
    }
}
