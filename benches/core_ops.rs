// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Benchmarks for tensor-bridge boundary paths.

use candle_core::Device;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use tensor_bridge::{
    export, export_owned, ingest, translate_compound, translate_slice, AxisSelector, Bridge,
    BridgeConfig, CallArgs, HandleTracker, ShapeDescriptor, TypeDescriptor,
};

/// Benchmark slice translation (runs on every `__getitem__`).
fn bench_slice_translation(c: &mut Criterion) {
    let mut group = c.benchmark_group("slice_translation");

    group.bench_function("translate_slice_negative_step", |b| {
        b.iter(|| {
            black_box(translate_slice(
                black_box(Some(-2)),
                black_box(None),
                black_box(Some(-3)),
                black_box(1024),
            ))
        })
    });

    let shape = ShapeDescriptor::from([16, 32, 64, 128]);
    let selectors = [
        AxisSelector::index(-1),
        AxisSelector::range(4, 20),
        AxisSelector::full(),
    ];
    group.bench_function("translate_compound_rank4", |b| {
        b.iter(|| black_box(translate_compound(black_box(&selectors), black_box(&shape))))
    });

    group.finish();
}

/// Benchmark host buffer ingest and export.
fn bench_buffer_adapter(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_adapter");

    for n in [1_024usize, 65_536, 1_048_576] {
        let data = vec![0.5f32; n];
        let bytes: &[u8] = bytemuck::cast_slice(&data);
        let shape = ShapeDescriptor::from([n]);

        group.bench_with_input(BenchmarkId::new("ingest_f32", n), &n, |b, _| {
            b.iter(|| {
                black_box(ingest(
                    black_box(bytes),
                    &shape,
                    TypeDescriptor::Float32,
                    &Device::Cpu,
                ))
            })
        });

        let tensor = ingest(bytes, &shape, TypeDescriptor::Float32, &Device::Cpu).unwrap();
        group.bench_with_input(BenchmarkId::new("export_view", n), &n, |b, _| {
            b.iter(|| black_box(export(black_box(&tensor)).map(|e| e.as_bytes().len())))
        });
        group.bench_with_input(BenchmarkId::new("export_owned", n), &n, |b, _| {
            b.iter(|| black_box(export_owned(black_box(&tensor))))
        });
    }

    group.finish();
}

/// Benchmark dispatch by name against direct method calls.
fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let bridge = Bridge::init(BridgeConfig::new().with_cpu()).unwrap();
    let t = bridge
        .rand(&ShapeDescriptor::from([64, 64]), TypeDescriptor::Float32, Some(7))
        .unwrap();

    group.bench_function("lookup", |b| {
        let table = bridge.dispatch_table();
        b.iter(|| black_box(table.lookup(black_box("__itruediv__"))))
    });

    group.bench_function("call_add", |b| {
        b.iter(|| black_box(t.call("__add__", CallArgs::Tensor(&t))))
    });

    group.bench_function("direct_add", |b| b.iter(|| black_box(t.add(&t))));

    group.bench_function("call_shape", |b| {
        b.iter(|| black_box(t.call("shape", CallArgs::None)))
    });

    group.finish();
}

/// Benchmark handle accounting (every construction and release).
fn bench_handle_tracker(c: &mut Criterion) {
    let mut group = c.benchmark_group("handle_tracker");

    group.bench_function("allocate_release", |b| {
        let tracker = HandleTracker::with_limit(1_000_000_000);
        b.iter(|| {
            tracker.allocate(black_box(1_000_000)).unwrap();
            tracker.release(black_box(1_000_000));
        })
    });

    group.bench_function("would_fit", |b| {
        let tracker = HandleTracker::with_limit(1_000_000_000);
        tracker.allocate(500_000_000).unwrap();
        b.iter(|| black_box(tracker.would_fit(black_box(400_000_000))))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_slice_translation,
    bench_buffer_adapter,
    bench_dispatch,
    bench_handle_tracker,
);
criterion_main!(benches);
