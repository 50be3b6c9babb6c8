//! Minimal end-to-end run on a synthetic two-object plane.
//!
//! ```text
//! cargo run --example two_disks
//! ```

use image::Luma;

use cytoquant_core::{pipeline, Calibration, PipelineConfig, Plane, PlaneStack};

fn main() {
    tracing_subscriber::fmt().init();

    let mut plane = Plane::new(128, 128);
    let disks = [(40.0f32, 64.0f32, 10.0f32), (90.0, 64.0, 6.0)];
    for (x, y, p) in plane.enumerate_pixels_mut() {
        let inside = disks.iter().any(|&(cx, cy, r)| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            dx * dx + dy * dy <= r * r
        });
        *p = Luma([if inside { 900.0 } else { 40.0 }]);
    }

    let volume = PlaneStack::from_single_plane("two_disks", Calibration::default(), plane);
    let config = PipelineConfig {
        min_area: 50.0,
        max_area: 1000.0,
        designated_channel: 1,
        fusion_channels: vec![1],
        ..PipelineConfig::default()
    };

    let out = pipeline::run(&volume, &config).expect("valid config");
    println!("{}", out.columns.join(","));
    for row in &out.rows {
        println!("{}", row.record().join(","));
    }
}
