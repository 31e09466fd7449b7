//! Criterion benches: record serialization and the scalar reference
//! kernel everywhere, plus the real tile sequence when the machine
//! has AMX.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use amxtile::TileConfig;
use amxtile::reference::dpbuud_ref;

fn bench_record(c: &mut Criterion) {
    let mut cfg = TileConfig::new();
    for t in 0..8 {
        cfg.set_tile(t, 16, 64).unwrap();
    }
    c.bench_function("record serialize + parse", |b| {
        b.iter(|| {
            let bytes = black_box(&cfg).to_bytes();
            TileConfig::from_bytes(black_box(&bytes)).unwrap()
        })
    });
}

fn bench_reference_kernel(c: &mut Criterion) {
    let (m, n, k) = (16, 16, 16);
    let a_src: Vec<u8> = (0..m * k * 4).map(|i| i as u8).collect();
    let b_src: Vec<u8> = (0..k * n * 4).map(|i| i as u8).collect();
    c.bench_function("dpbuud reference 16x16x16", |b| {
        b.iter(|| {
            let mut acc = vec![0i32; m * n];
            dpbuud_ref(black_box(&a_src), black_box(&b_src), &mut acc, m, n, k);
            black_box(acc)
        })
    });
}

#[cfg(target_arch = "x86_64")]
fn bench_tile_sequence(c: &mut Criterion) {
    use amxtile::TileEngine;

    if !amxtile::available() {
        eprintln!("skipping hardware bench - AMX not available");
        return;
    }
    let mut cfg = TileConfig::new();
    cfg.set_tile(0, 16, 64).unwrap();
    cfg.set_tile(1, 16, 64).unwrap();
    cfg.set_tile(2, 16, 64).unwrap();
    let mut engine = TileEngine::new(cfg).unwrap();

    let a_src = vec![1u8; 1024];
    let b_src = vec![1u8; 1024];
    let mut out = vec![0u8; 1024];
    c.bench_function("tdpbuud 16x64 load+mul+store", |b| {
        b.iter(|| {
            engine.load(1, black_box(&a_src), 64).unwrap();
            engine.load(2, black_box(&b_src), 64).unwrap();
            engine.zero(0).unwrap();
            engine.dpbuud(0, 1, 2).unwrap();
            engine.store(0, &mut out, 64).unwrap();
            black_box(&out);
        })
    });
}

#[cfg(not(target_arch = "x86_64"))]
fn bench_tile_sequence(_c: &mut Criterion) {}

criterion_group!(
    benches,
    bench_record,
    bench_reference_kernel,
    bench_tile_sequence
);
criterion_main!(benches);
