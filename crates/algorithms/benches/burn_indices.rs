//! Benchmarks for the burn-index chain

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emberline_algorithms::imagery::{classify, compute_delta, normalized_burn_ratio, IndexParams, SeverityThresholds};
use emberline_algorithms::resample::{align, Resampling};
use emberline_core::{GeoTransform, Raster};

fn create_band(size: usize, cell: f64, base: f64) -> Raster<f64> {
    let mut r = Raster::new(size, size);
    r.set_transform(GeoTransform::new(600_000.0, 4_000_000.0, cell, -cell));
    for row in 0..size {
        for col in 0..size {
            let v = base + ((row * 7 + col * 13) % 2000) as f64;
            r.set(row, col, v).unwrap();
        }
    }
    r
}

fn bench_nbr(c: &mut Criterion) {
    let mut group = c.benchmark_group("imagery/nbr");
    let params = IndexParams::default();
    for size in [256, 512, 1024, 2048] {
        let nir = create_band(size, 10.0, 3000.0);
        let swir = create_band(size, 10.0, 1000.0);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| normalized_burn_ratio(black_box(&nir), black_box(&swir), &params).unwrap())
        });
    }
    group.finish();
}

fn bench_dnbr_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("imagery/dnbr_classify");
    let params = IndexParams::default();
    let thresholds = SeverityThresholds::default();
    for size in [256, 512, 1024] {
        let pre = normalized_burn_ratio(
            &create_band(size, 10.0, 4000.0),
            &create_band(size, 10.0, 900.0),
            &params,
        )
        .unwrap();
        let post = normalized_burn_ratio(
            &create_band(size, 10.0, 1200.0),
            &create_band(size, 10.0, 2500.0),
            &params,
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let delta = compute_delta(black_box(&pre), black_box(&post)).unwrap();
                classify(&delta, &thresholds).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_align(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample/align_bilinear");
    for size in [256, 512, 1024] {
        let fine = create_band(size, 10.0, 3000.0);
        let coarse = create_band(size / 2, 20.0, 1000.0);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| align(black_box(&fine), black_box(&coarse), Resampling::Bilinear).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_nbr, bench_dnbr_classify, bench_align);
criterion_main!(benches);
