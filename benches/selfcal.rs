use criterion::{criterion_group, criterion_main, Criterion};
use selfcal::{
    CalibrationConfig, Calibrator, CameraFamily, EngineOptions, ImageView, MemoryRegisterBank,
    MeshParameter,
};
use std::hint::black_box;

fn make_image(width: usize, height: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let value = 40 + (((x * 13) ^ (y * 7) ^ (x * y / 3)) % 120);
            data.push(value as u8);
        }
    }
    data
}

fn shift_down(src: &[u8], width: usize, height: usize, rows: usize) -> Vec<u8> {
    let mut out = vec![0u8; width * height];
    for y in 0..height {
        let sy = y.saturating_sub(rows);
        out[y * width..(y + 1) * width].copy_from_slice(&src[sy * width..(sy + 1) * width]);
    }
    out
}

fn bench_pass(c: &mut Criterion) {
    let (width, height) = (1280, 720);
    let reference = make_image(width, height);
    let comparison = shift_down(&reference, width, height, 1);
    let ref_view = ImageView::from_slice(&reference, width, height).unwrap();
    let cmp_view = ImageView::from_slice(&comparison, width, height).unwrap();

    let options = EngineOptions::new(width, height).without_delays();
    let mut calibrator = Calibrator::new(
        &options,
        CalibrationConfig::default(),
        MemoryRegisterBank::new(CameraFamily::Xc),
    )
    .unwrap();

    c.bench_function("full_pass_default_mesh", |b| {
        b.iter(|| black_box(calibrator.run_pass(ref_view, cmp_view)));
    });

    calibrator.set_mesh_parameter(MeshParameter {
        tiles_right: 4,
        tiles_left: 4,
        tiles_up: 4,
        tiles_down: 4,
        ..MeshParameter::default()
    });
    c.bench_function("full_pass_small_mesh", |b| {
        b.iter(|| black_box(calibrator.run_pass(ref_view, cmp_view)));
    });

    #[cfg(feature = "rayon")]
    {
        let mut parallel_options = options;
        parallel_options.parallel = true;
        let mut parallel = Calibrator::new(
            &parallel_options,
            CalibrationConfig::default(),
            MemoryRegisterBank::new(CameraFamily::Xc),
        )
        .unwrap();
        c.bench_function("full_pass_default_mesh_rayon", |b| {
            b.iter(|| black_box(parallel.run_pass(ref_view, cmp_view)));
        });
    }
}

criterion_group!(benches, bench_pass);
criterion_main!(benches);
