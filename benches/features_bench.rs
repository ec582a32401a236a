//! Feature extraction and tiling benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{GrayImage, Luma};
use page_inspector::{extract, tile_image};

fn textured(size: u32) -> GrayImage {
    GrayImage::from_fn(size, size, |x, y| {
        Luma([((x * 31 + y * 17) % 256) as u8 ^ ((x / 8 + y / 8) % 2 * 128) as u8])
    })
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    for size in [100u32, 200] {
        let patch = textured(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &patch, |b, patch| {
            b.iter(|| extract(black_box(patch)))
        });
    }
    group.finish();
}

fn bench_tile(c: &mut Criterion) {
    let page = textured(2000);
    c.bench_function("tile_2000_grid_10", |b| {
        b.iter(|| tile_image(black_box(&page), 10).map(|tiles| tiles.len()))
    });
}

criterion_group!(benches, bench_extract, bench_tile);
criterion_main!(benches);
