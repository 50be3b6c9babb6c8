use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::Luma;

use cytoquant_core::{
    pipeline, Calibration, PipelineConfig, Plane, PlaneStack,
};

/// A 512x512 plane with a grid of bright disks, roughly the object density of
/// a confocal field of view.
fn synthetic_field() -> Plane {
    let mut plane = Plane::new(512, 512);
    let centers: Vec<(f32, f32)> = (0..8)
        .flat_map(|i| (0..8).map(move |j| (32.0 + i as f32 * 60.0, 32.0 + j as f32 * 60.0)))
        .collect();
    for (x, y, p) in plane.enumerate_pixels_mut() {
        let inside = centers.iter().any(|&(cx, cy)| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            dx * dx + dy * dy <= 8.0 * 8.0
        });
        *p = Luma([if inside { 800.0 } else { 50.0 }]);
    }
    plane
}

fn bench_pipeline(c: &mut Criterion) {
    let volume =
        PlaneStack::from_single_plane("bench", Calibration::default(), synthetic_field());
    let config = PipelineConfig {
        min_area: 50.0,
        max_area: 500.0,
        designated_channel: 1,
        fusion_channels: vec![1],
        ..PipelineConfig::default()
    };

    c.bench_function("run_512x512_64_disks", |b| {
        b.iter(|| {
            let out = pipeline::run(black_box(&volume), black_box(&config))
                .expect("valid config");
            black_box(out.rows.len())
        })
    });

    c.bench_function("segment_stages_512x512", |b| {
        let plane = synthetic_field();
        b.iter(|| {
            let filtered = cytoquant_core::bandpass::dog_filter(black_box(&plane), 2.5, 1.4);
            let mut mask = cytoquant_core::threshold::build_mask(
                &filtered,
                cytoquant_core::ThresholdMethod::Huang,
            );
            cytoquant_core::mask::close_in_place(&mut mask);
            cytoquant_core::mask::fill_holes(&mut mask);
            cytoquant_core::watershed::split_objects(&mut mask, 0.5);
            black_box(mask)
        })
    });
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
