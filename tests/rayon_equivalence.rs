#![cfg(feature = "rayon")]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use selfcal::{
    CalibrationConfig, Calibrator, CameraFamily, EngineOptions, ImageView, MemoryRegisterBank,
    MeshParameter,
};

const WIDTH: usize = 640;
const HEIGHT: usize = 480;

fn textured(seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    // 2x2 blocks keep the SAD minimum well defined
    let blocks: Vec<u8> = (0..(WIDTH / 2) * (HEIGHT / 2))
        .map(|_| rng.random_range(30..=200))
        .collect();
    let mut data = Vec::with_capacity(WIDTH * HEIGHT);
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            data.push(blocks[(y / 2) * (WIDTH / 2) + x / 2]);
        }
    }
    data
}

fn shifted(src: &[u8], dx: usize, dy: usize) -> Vec<u8> {
    let mut data = vec![0u8; WIDTH * HEIGHT];
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let sx = x.saturating_sub(dx);
            let sy = y.saturating_sub(dy);
            data[y * WIDTH + x] = src[sy * WIDTH + sx];
        }
    }
    data
}

fn calibrator(parallel: bool) -> Calibrator {
    let mut options = EngineOptions::new(WIDTH, HEIGHT).without_delays();
    options.parallel = parallel;
    let mut config = CalibrationConfig::default();
    config.mesh = MeshParameter {
        center_x: 320,
        center_y: 240,
        tiles_right: 5,
        tiles_left: 5,
        tiles_up: 4,
        tiles_down: 4,
        region_bottom: 463,
        region_right: 623,
        ..MeshParameter::default()
    };
    Calibrator::new(&options, config, MemoryRegisterBank::new(CameraFamily::Xc)).unwrap()
}

#[test]
fn rayon_and_sequential_matching_agree() {
    let reference = textured(11);
    let comparison = shifted(&reference, 3, 1);
    let r = ImageView::from_slice(&reference, WIDTH, HEIGHT).unwrap();
    let c = ImageView::from_slice(&comparison, WIDTH, HEIGHT).unwrap();

    let mut seq = calibrator(false);
    let mut par = calibrator(true);
    assert_eq!(seq.mesh_tiles(), par.mesh_tiles());

    for _ in 0..3 {
        let a = seq.run_pass(r, c);
        let b = par.run_pass(r, c);
        assert_eq!(a.estimate, b.estimate);
        assert_eq!(a.gated, b.gated);
    }
    assert_eq!(seq.texture_metrics(), par.texture_metrics());
    assert_eq!(seq.match_results(), par.match_results());
    assert!(seq.match_results().iter().any(|m| m.matched));
    assert_eq!(seq.average_difference(), par.average_difference());
}
