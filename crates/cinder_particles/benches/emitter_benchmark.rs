//! # Emitter Tick Benchmark
//!
//! Full ticks of representative emitters at steady state.
//!
//! Run with: `cargo bench --package cinder_particles`

// Benchmarks don't need docs
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cinder_particles::module::{
    AccelerationModule, ColorOverLifeModule, InitialVelocityModule, LifetimeModule, OrbitModule,
    SizeByLifeModule,
};
use cinder_particles::{
    ChainMode, EmitterInstance, EmitterTemplate, FloatDistribution, LodLevel, RequiredSettings,
    TickContext, VectorDistribution,
};
use glam::Vec3;

const DT: f32 = 1.0 / 60.0;

fn level(rate: f32) -> LodLevel {
    LodLevel::new(RequiredSettings::with_rate(rate))
        .with_module(LifetimeModule::new(FloatDistribution::uniform(1.0, 2.0)))
        .with_module(InitialVelocityModule::new(VectorDistribution::uniform(
            Vec3::new(-1.0, -1.0, 2.0),
            Vec3::new(1.0, 1.0, 6.0),
        )))
        .with_module(AccelerationModule::new(VectorDistribution::constant(Vec3::new(
            0.0, 0.0, -9.8,
        ))))
        .with_module(SizeByLifeModule::new(VectorDistribution::constant(Vec3::ONE)))
        .with_module(ColorOverLifeModule::new(
            VectorDistribution::constant(Vec3::ONE),
            FloatDistribution::constant(1.0),
        ))
}

/// Ticks until the live count stops climbing.
fn warmed(template: Arc<EmitterTemplate>) -> EmitterInstance {
    let mut emitter = EmitterInstance::new(template, 1);
    emitter.activate().unwrap();
    let ctx = TickContext::new(DT);
    for _ in 0..180 {
        emitter.tick(&ctx).unwrap();
    }
    emitter
}

/// Benchmark: steady-state tick at several spawn rates.
fn bench_steady_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("steady_tick");
    let ctx = TickContext::new(DT);

    for rate in [100.0_f32, 1_000.0, 10_000.0] {
        let mut emitter = warmed(Arc::new(EmitterTemplate::single("steady", level(rate))));
        group.bench_with_input(BenchmarkId::from_parameter(rate), &rate, |b, _| {
            b.iter(|| {
                emitter.tick(&ctx).unwrap();
                black_box(emitter.active_count())
            });
        });
    }

    group.finish();
}

/// Benchmark: tick with a three-link orbit chain.
fn bench_orbit_tick(c: &mut Criterion) {
    let orbiting = level(1_000.0)
        .with_module(OrbitModule::new(Vec3::X, ChainMode::Link).with_rotation_rate(Vec3::Z))
        .with_module(OrbitModule::new(Vec3::Y, ChainMode::Add))
        .with_module(OrbitModule::new(Vec3::Z * 0.5, ChainMode::Link));
    let mut emitter = warmed(Arc::new(EmitterTemplate::single("orbit", orbiting)));
    let ctx = TickContext::new(DT);

    c.bench_function("orbit_tick_1k", |b| {
        b.iter(|| {
            emitter.tick(&ctx).unwrap();
            black_box(emitter.bounds())
        });
    });
}

/// Benchmark: blended tick between two levels.
fn bench_blended_tick(c: &mut Criterion) {
    let template = Arc::new(EmitterTemplate::new("blend", vec![level(1_000.0), level(250.0)]).unwrap());
    let mut emitter = warmed(template);
    let ctx = TickContext::new(DT);

    c.bench_function("blended_tick_1k", |b| {
        b.iter(|| {
            emitter.tick_blended(0, 1, 0.5, &ctx).unwrap();
            black_box(emitter.active_count())
        });
    });
}

/// Benchmark: snapshot export of a populated emitter.
fn bench_snapshot(c: &mut Criterion) {
    let emitter = warmed(Arc::new(EmitterTemplate::single("export", level(5_000.0))));

    c.bench_function("snapshot_5k", |b| {
        b.iter(|| black_box(emitter.snapshot().unwrap()));
    });
}

criterion_group!(
    benches,
    bench_steady_tick,
    bench_orbit_tick,
    bench_blended_tick,
    bench_snapshot,
);

criterion_main!(benches);
