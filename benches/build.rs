//! Benchmarks for hierarchy build and cut selection
//!
//! Author: Moroya Sakamoto

use alice_nanite::build::{GroupSimplifier, TriangleClusterer};
use alice_nanite::partition::MultilevelPartitioner;
use alice_nanite::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_clusterize(c: &mut Criterion) {
    let mut group = c.benchmark_group("clusterize");
    let config = BuildConfig::default();
    let partitioner = MultilevelPartitioner::default();

    for stacks in [16u32, 32, 64] {
        let mesh = uv_sphere(1.0, stacks, stacks * 2);
        group.throughput(Throughput::Elements(mesh.triangle_count() as u64));
        group.bench_with_input(BenchmarkId::new("sphere", mesh.triangle_count()), &mesh, |b, mesh| {
            let clusterer = TriangleClusterer::new(&config, &partitioner);
            b.iter(|| clusterer.cluster(black_box(mesh), 0).unwrap())
        });
    }

    group.finish();
}

fn bench_simplify(c: &mut Criterion) {
    let mut group = c.benchmark_group("simplify");
    let config = BuildConfig::default();
    let kernels = CpuKernels;
    let simplifier = GroupSimplifier::new(&config, &kernels);

    for n in [16u32, 32] {
        let mesh = grid(2.0, n);
        let mut locked = vec![false; mesh.positions.len()];
        for (i, p) in mesh.positions.iter().enumerate() {
            locked[i] = p.x.abs() >= 0.999 || p.z.abs() >= 0.999;
        }
        group.throughput(Throughput::Elements(mesh.triangle_count() as u64));
        group.bench_with_input(BenchmarkId::new("grid", mesh.triangle_count()), &mesh, |b, mesh| {
            b.iter(|| simplifier.simplify(black_box(mesh), &locked))
        });
    }

    let sphere = uv_sphere(1.0, 12, 24);
    let open = vec![false; sphere.positions.len()];
    group.bench_function("sphere_closed", |b| b.iter(|| simplifier.simplify(black_box(&sphere), &open)));

    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);
    let mesh = uv_sphere(1.0, 32, 64);
    group.throughput(Throughput::Elements(mesh.triangle_count() as u64));
    group.bench_function("sphere", |b| {
        let assembler = HierarchyAssembler::new(BuildConfig::default());
        b.iter(|| assembler.build(black_box(&mesh)).unwrap())
    });
    group.finish();
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");
    let vm = HierarchyAssembler::new(BuildConfig::default())
        .build(&uv_sphere(1.0, 48, 96))
        .unwrap();
    let mut selector = RuntimeSelector::new(&vm, RuntimeConfig::default());

    for distance in [2.0f32, 10.0, 100.0] {
        let camera = Camera::look_at(Vec3::new(distance * 0.6, distance * 0.3, distance * 0.74), Vec3::ZERO);
        group.bench_with_input(BenchmarkId::new("distance", distance), &camera, |b, camera| {
            b.iter(|| selector.select(black_box(camera)))
        });
    }

    let mut cache = StreamingCache::new(StreamingConfig::default());
    let selection = selector.select(&Camera::look_at(Vec3::new(1.2, 0.6, 1.5), Vec3::ZERO));
    group.bench_function("stream_selection", |b| {
        b.iter(|| cache.stream_selection(0, &vm, black_box(&selection)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_clusterize, bench_simplify, bench_build, bench_select);
criterion_main!(benches);
