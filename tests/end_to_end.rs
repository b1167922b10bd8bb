use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use selfcal::{
    AveragingParameter, CalibrationConfig, Calibrator, CameraFamily, Criteria, EngineOptions,
    ImageView, LogicalRegister, MemoryRegisterBank, MeshParameter, SelfCalibrationEngine,
};

const WIDTH: usize = 640;
const HEIGHT: usize = 480;
const KNOT: f64 = 4.0;
/// Comparison camera sits half a pixel lower than the reference.
const DRIFT: f64 = 0.5;

/// Random knot grid sampled bilinearly, so the scene is smooth between knots.
struct Scene {
    knots: Vec<f64>,
    cols: usize,
    rows: usize,
}

impl Scene {
    fn new(seed: u64) -> Self {
        let cols = WIDTH / KNOT as usize + 2;
        let rows = HEIGHT / KNOT as usize + 2;
        let mut rng = StdRng::seed_from_u64(seed);
        let knots = (0..cols * rows)
            .map(|_| rng.random_range(30.0..220.0))
            .collect();
        Self { knots, cols, rows }
    }

    fn sample(&self, x: f64, y: f64) -> f64 {
        let gx = x.max(0.0) / KNOT;
        let gy = y.max(0.0) / KNOT;
        let ix = (gx.floor() as usize).min(self.cols - 2);
        let iy = (gy.floor() as usize).min(self.rows - 2);
        let fx = gx - ix as f64;
        let fy = gy - iy as f64;
        let at = |c: usize, r: usize| self.knots[r * self.cols + c];
        let top = at(ix, iy) * (1.0 - fx) + at(ix + 1, iy) * fx;
        let bottom = at(ix, iy + 1) * (1.0 - fx) + at(ix + 1, iy + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    fn render(&self, dy: f64) -> Vec<u8> {
        let mut data = Vec::with_capacity(WIDTH * HEIGHT);
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                let value = self.sample(x as f64, y as f64 - dy);
                data.push(value.round().clamp(0.0, 255.0) as u8);
            }
        }
        data
    }
}

fn config() -> CalibrationConfig {
    CalibrationConfig {
        mesh: MeshParameter {
            tile_width: 20,
            tile_height: 20,
            center_x: 320,
            center_y: 240,
            tiles_right: 2,
            tiles_left: 2,
            tiles_up: 2,
            tiles_down: 2,
            region_top: 16,
            region_bottom: 463,
            region_left: 16,
            region_right: 623,
            search_span_rows: 6,
            search_span_cols: 40,
        },
        averaging: AveragingParameter {
            min_match_number: 8,
            max_diff_deviation: 1.0,
            average_count: 50,
        },
        criteria: Criteria {
            frame_count: 20,
            ..Criteria::default()
        },
        ..CalibrationConfig::default()
    }
}

// 0.5 px in 1/16 px units, with one refinement step of slack
fn assert_vertical_correction(bank: &MemoryRegisterBank) {
    let comparison = bank.writes_to(LogicalRegister::ComparisonVerticalShift);
    assert_eq!(comparison.len(), 1);
    assert!((7..=9).contains(&comparison[0]), "wrote {}", comparison[0]);
    assert_eq!(
        bank.writes_to(LogicalRegister::ReferenceVerticalShift),
        vec![0]
    );
    assert!(bank
        .writes_to(LogicalRegister::ReferenceRotation)
        .is_empty());
    let base = bank.writes_to(LogicalRegister::BaseVertical);
    assert_eq!(base, vec![(-(comparison[0] as i32) & 0x1FF) as u16]);
    assert_eq!(bank.writes_to(LogicalRegister::EepromControl), vec![0x0004]);
}

#[test]
fn calibrator_measures_drift_and_corrects_once() {
    let scene = Scene::new(42);
    let reference = scene.render(0.0);
    let comparison = scene.render(DRIFT);
    let r = ImageView::from_slice(&reference, WIDTH, HEIGHT).unwrap();
    let c = ImageView::from_slice(&comparison, WIDTH, HEIGHT).unwrap();

    let bank = MemoryRegisterBank::new(CameraFamily::Xc);
    let options = EngineOptions::new(WIDTH, HEIGHT).without_delays();
    let mut cal = Calibrator::new(&options, config(), bank.clone()).unwrap();
    assert_eq!(cal.mesh_tiles().len(), 16);

    let first = cal.run_pass(r, c);
    assert!(first.gated);
    assert!(first.correction.is_none());
    assert!(first.estimate.matched_tiles >= 8);
    assert!((first.estimate.vertical_difference - DRIFT).abs() < 0.1);
    assert!(cal.texture_metrics().iter().filter(|t| t.textured).count() >= 8);
    let matched = cal.match_results().iter().filter(|m| m.matched).count();
    assert_eq!(matched, first.estimate.matched_tiles);

    let mut corrected_at = None;
    for frame in 2..=30 {
        let report = cal.run_pass(r, c);
        if let Some(result) = &report.correction {
            assert!(result.is_ok());
            assert!(corrected_at.is_none(), "corrected twice");
            corrected_at = Some(frame);
        }
    }
    assert_eq!(corrected_at, Some(21));
    assert_vertical_correction(&bank);

    // queues restarted after the correction
    assert_eq!(cal.average_difference().frame_count, 30 - 21);
    let state = cal.current_correction();
    assert!(state.vertical_register < 0);
    assert!((state.vertical_pixels - state.vertical_register as f64 / 16.0).abs() < 1e-12);
    assert!(cal.last_error().is_none());
}

#[test]
fn engine_corrects_drift_in_background() {
    let scene = Scene::new(7);
    let reference = scene.render(0.0);
    let comparison = scene.render(DRIFT);

    let bank = MemoryRegisterBank::new(CameraFamily::Xc);
    let options = EngineOptions::new(WIDTH, HEIGHT).without_delays();
    let engine = SelfCalibrationEngine::initialize(options, config(), bank.clone()).unwrap();

    for _ in 0..30 {
        engine.start();
        assert!(engine.parallelize(&reference, &comparison));
        engine.stop();
    }

    let status = engine.status();
    assert_eq!(status.passes_completed, 30);
    assert_eq!(status.frames_dropped, 0);
    assert_eq!(status.corrections_applied, 1);
    assert_vertical_correction(&bank);
    assert_eq!(engine.average_difference().frame_count, 9);

    let difference = engine.mesh_difference();
    assert_eq!(difference.residuals.len(), 16);
    assert!((difference.estimate.vertical_difference - DRIFT).abs() < 0.1);
    assert_eq!(engine.current_difference(), difference.estimate);
    engine.finalize();
}

#[test]
fn register_failure_is_recorded_and_queues_restart() {
    let scene = Scene::new(42);
    let reference = scene.render(0.0);
    let comparison = scene.render(DRIFT);
    let r = ImageView::from_slice(&reference, WIDTH, HEIGHT).unwrap();
    let c = ImageView::from_slice(&comparison, WIDTH, HEIGHT).unwrap();

    let bank = MemoryRegisterBank::new(CameraFamily::Xc);
    bank.fail_with(-1);
    let options = EngineOptions::new(WIDTH, HEIGHT).without_delays();
    let mut cal = Calibrator::new(&options, config(), bank.clone()).unwrap();

    let mut failures = 0;
    for _ in 0..21 {
        if let Some(Err(_)) = cal.run_pass(r, c).correction {
            failures += 1;
        }
    }
    assert_eq!(failures, 1);
    assert_eq!(cal.average_difference().frame_count, 0);
    assert!(cal.last_error().is_some());
    assert!(bank.writes().is_empty());
}
