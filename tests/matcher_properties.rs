use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use selfcal::search::{BlockMatcher, MatchParams, MatchScratch};
use selfcal::texture::TextureEvaluator;
use selfcal::{CameraFamily, ImageView, Mesh, MeshParameter, MeshThreshold, OperationMode};

/// Column profile plus a row profile, both piecewise linear.
struct Scene {
    columns: Vec<f64>,
    rows: Vec<f64>,
}

const COLUMN_KNOT: f64 = 3.0;
const ROW_KNOT: f64 = 3.0;

impl Scene {
    fn new(width: usize, height: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let columns = (0..width / 3 + 3)
            .map(|_| rng.random_range(20.0..140.0))
            .collect();
        let rows = (0..height / 3 + 3)
            .map(|_| rng.random_range(0.0..100.0))
            .collect();
        Self { columns, rows }
    }

    fn profile(knots: &[f64], spacing: f64, t: f64) -> f64 {
        let g = t.max(0.0) / spacing;
        let i = (g.floor() as usize).min(knots.len() - 2);
        let f = g - i as f64;
        knots[i] * (1.0 - f) + knots[i + 1] * f
    }

    fn sample(&self, x: f64, y: f64) -> f64 {
        Self::profile(&self.columns, COLUMN_KNOT, x) + Self::profile(&self.rows, ROW_KNOT, y)
    }

    /// Renders the scene moved by `(dx, dy)`.
    fn render(&self, width: usize, height: usize, dx: f64, dy: f64) -> Vec<u8> {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let value = self.sample(x as f64 - dx, y as f64 - dy);
                data.push(value.round().clamp(0.0, 255.0) as u8);
            }
        }
        data
    }
}

fn single_tile_params() -> MeshParameter {
    MeshParameter {
        tile_width: 16,
        tile_height: 16,
        center_x: 60,
        center_y: 50,
        tiles_right: 1,
        tiles_left: 0,
        tiles_up: 0,
        tiles_down: 1,
        region_top: 0,
        region_bottom: 119,
        region_left: 0,
        region_right: 199,
        search_span_rows: 10,
        search_span_cols: 12,
    }
}

fn thresholds() -> MeshThreshold {
    MeshThreshold {
        max_displacement_height: 5,
        max_displacement_width: 40,
        ..MeshThreshold::default()
    }
}

const WIDTH: usize = 200;
const HEIGHT: usize = 120;

#[test]
fn integer_shift_is_recovered_exactly() {
    let scene = Scene::new(WIDTH, HEIGHT, 11);
    let reference = scene.render(WIDTH, HEIGHT, 0.0, 0.0);
    let comparison = scene.render(WIDTH, HEIGHT, 7.0, -2.0);
    let r = ImageView::from_slice(&reference, WIDTH, HEIGHT).unwrap();
    let c = ImageView::from_slice(&comparison, WIDTH, HEIGHT).unwrap();

    let params = single_tile_params();
    let mesh = Mesh::generate(&params, WIDTH);
    assert_eq!(mesh.len(), 1);
    let tile = mesh.tiles()[0];

    let matcher = BlockMatcher::new(MatchParams::new(&params, &thresholds()));
    let mut scratch = MatchScratch::new(16, 16, 10);
    let result = matcher.match_tile(r, c, &mesh, &tile, &mut scratch);

    assert!(result.matched);
    assert!((result.ratio - 100.0).abs() < 1e-9);
    assert!((result.left - (tile.x + 7) as f64).abs() < 1e-9);
    assert!((result.top - (tile.y - 2) as f64).abs() < 1e-9);
    assert!((result.right - result.left - 15.0).abs() < 1e-9);
    assert!((result.bottom - result.top - 15.0).abs() < 1e-9);
}

#[test]
fn fractional_shift_is_refined_to_a_tenth() {
    let scene = Scene::new(WIDTH, HEIGHT, 23);
    let reference = scene.render(WIDTH, HEIGHT, 0.0, 0.0);
    let comparison = scene.render(WIDTH, HEIGHT, 4.3, 0.5);
    let r = ImageView::from_slice(&reference, WIDTH, HEIGHT).unwrap();
    let c = ImageView::from_slice(&comparison, WIDTH, HEIGHT).unwrap();

    let params = single_tile_params();
    let mesh = Mesh::generate(&params, WIDTH);
    let tile = mesh.tiles()[0];
    let threshold = MeshThreshold {
        min_match_ratio: 90.0,
        ..thresholds()
    };
    let matcher = BlockMatcher::new(MatchParams::new(&params, &threshold));
    let mut scratch = MatchScratch::new(16, 16, 10);
    let result = matcher.match_tile(r, c, &mesh, &tile, &mut scratch);

    assert!(result.matched, "ratio {}", result.ratio);
    assert!(result.ratio < 100.0);
    assert!(result.ratio > threshold.min_match_ratio);
    let dx = result.left - tile.x as f64;
    let dy = result.top - tile.y as f64;
    assert!((dx - 4.3).abs() <= 0.1 + 1e-9, "dx {dx}");
    assert!((dy - 0.5).abs() <= 0.1 + 1e-9, "dy {dy}");
}

#[test]
fn displacement_outside_limits_reports_integer_position() {
    let scene = Scene::new(WIDTH, HEIGHT, 5);
    let reference = scene.render(WIDTH, HEIGHT, 0.0, 0.0);
    let comparison = scene.render(WIDTH, HEIGHT, 3.0, 8.0);
    let r = ImageView::from_slice(&reference, WIDTH, HEIGHT).unwrap();
    let c = ImageView::from_slice(&comparison, WIDTH, HEIGHT).unwrap();

    let params = single_tile_params();
    let mesh = Mesh::generate(&params, WIDTH);
    let tile = mesh.tiles()[0];
    let matcher = BlockMatcher::new(MatchParams::new(&params, &thresholds()));
    let mut scratch = MatchScratch::new(16, 16, 10);
    let result = matcher.match_tile(r, c, &mesh, &tile, &mut scratch);

    assert!(!result.matched);
    assert_eq!(result.ratio, 0.0);
    assert_eq!(result.top, (tile.y + 8) as f64);
    assert_eq!(result.left, (tile.x + 3) as f64);
}

#[test]
fn untextured_tiles_are_not_matched() {
    let flat = vec![100u8; WIDTH * HEIGHT];
    let view = ImageView::from_slice(&flat, WIDTH, HEIGHT).unwrap();
    let params = MeshParameter {
        tiles_right: 2,
        tiles_left: 2,
        tiles_up: 1,
        tiles_down: 1,
        ..single_tile_params()
    };
    let mesh = Mesh::generate(&params, WIDTH);
    let threshold = thresholds();
    let evaluator = TextureEvaluator::new(
        &threshold,
        &OperationMode::default(),
        CameraFamily::Xc,
        params.search_span_rows,
    );
    let textures = evaluator.evaluate_mesh(view, &mesh);
    assert!(textures.iter().all(|t| !t.textured));

    let matcher = BlockMatcher::new(MatchParams::new(&params, &threshold));
    let mut scratch = MatchScratch::new(16, 16, 10);
    let results = matcher.match_mesh(view, view, &mesh, &textures, &mut scratch);
    assert_eq!(results.len(), mesh.len());
    assert!(results.iter().all(|m| !m.matched && m.ratio == 0.0));
}

#[test]
fn scratch_is_resized_for_other_geometry() {
    let scene = Scene::new(WIDTH, HEIGHT, 31);
    let reference = scene.render(WIDTH, HEIGHT, 0.0, 0.0);
    let r = ImageView::from_slice(&reference, WIDTH, HEIGHT).unwrap();
    let params = single_tile_params();
    let mesh = Mesh::generate(&params, WIDTH);
    let matcher = BlockMatcher::new(MatchParams::new(&params, &thresholds()));
    let mut scratch = MatchScratch::new(4, 4, 1);
    let result = matcher.match_tile(r, r, &mesh, &mesh.tiles()[0], &mut scratch);
    assert!(result.matched);
    assert_eq!(result.left, mesh.tiles()[0].x as f64);
}
