//! Benchmarks for matte post-processing and compositing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use postermaker::{
    composite_with_filter, correct_orientation, normalize_contrast, ProbabilityGrid,
    ResampleFilter,
};

/// Inverted disc, the common failure mode the correction exists for
fn inverted_disc(side: usize) -> ProbabilityGrid {
    let center = (side as f32 - 1.0) / 2.0;
    let radius = side as f32 / 4.0;
    let values = (0..side * side)
        .map(|i| {
            let (x, y) = ((i % side) as f32, (i / side) as f32);
            if (x - center).hypot(y - center) <= radius {
                0.05
            } else {
                0.95
            }
        })
        .collect();
    ProbabilityGrid::new(side, values).expect("valid grid")
}

fn bench_postprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("postprocessing");

    for side in [320usize, 1024] {
        let grid = inverted_disc(side);

        group.bench_with_input(BenchmarkId::new("correct_orientation", side), &grid, |b, grid| {
            b.iter(|| correct_orientation(black_box(grid.clone())));
        });

        group.bench_with_input(BenchmarkId::new("normalize_contrast", side), &grid, |b, grid| {
            b.iter(|| normalize_contrast(black_box(grid)));
        });
    }

    group.finish();
}

fn bench_composite(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite");
    group.sample_size(20);

    let matte = normalize_contrast(&correct_orientation(inverted_disc(320)));
    let photo = DynamicImage::ImageRgb8(RgbImage::from_pixel(1920, 1080, Rgb([180, 120, 60])));

    for filter in [ResampleFilter::Nearest, ResampleFilter::Bilinear, ResampleFilter::Lanczos3] {
        group.bench_with_input(
            BenchmarkId::new("1920x1080", format!("{:?}", filter)),
            &filter,
            |b, &filter| {
                b.iter(|| composite_with_filter(black_box(&photo), black_box(&matte), filter));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_postprocessing, bench_composite);
criterion_main!(benches);
