// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use framelens::{
    assemble, pipelines, render_overlay, CaptureFormat, Classification, InferenceTiming, Layout,
    Size,
};

fn bench_assemble_display_topology(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_display_topology");

    for resolution in ["640x480", "1280x720", "1920x1080"] {
        let format = CaptureFormat::from_parts("/dev/video0", resolution, "30").unwrap();
        let layout = Layout::new(format.size, Size::new(224, 224)).unwrap();
        let fragments = pipelines::camera_display_pipeline(&format, &layout).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(resolution),
            &fragments,
            |b, fragments| {
                b.iter(|| assemble(black_box(fragments)).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_launch_description(c: &mut Criterion) {
    let format = CaptureFormat::from_parts("/dev/video0", "1280x720", "30").unwrap();
    let layout = Layout::new(format.size, Size::new(224, 224)).unwrap();
    let graph = assemble(&pipelines::camera_display_pipeline(&format, &layout).unwrap()).unwrap();

    c.bench_function("launch_description", |b| {
        b.iter(|| black_box(&graph).to_launch_description());
    });
}

fn bench_render_overlay(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_overlay");
    let layout = Layout::new(Size::new(1280, 720), Size::new(224, 224)).unwrap();
    let timing = InferenceTiming::from_millis(12.5).unwrap();

    for count in [1usize, 3, 10] {
        let results: Vec<Classification> = (0..count)
            .map(|i| Classification::new(format!("label {}", i), 0.9 - i as f32 * 0.05))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &results, |b, results| {
            b.iter(|| {
                render_overlay(
                    Some("Edge TPU Image Classifier"),
                    black_box(results),
                    timing,
                    &layout,
                )
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_assemble_display_topology,
    bench_launch_description,
    bench_render_overlay
);
criterion_main!(benches);
