//! # Emitter Scenarios Integration Test
//!
//! Drives whole emitter instances through the public API: steady spawning,
//! bursts, pool growth, orbit chains, LOD blending and the pool invariants
//! that must hold on every tick.

use std::sync::Arc;

use cinder_core::{ParticlePool, PoolError};
use cinder_particles::module::{
    InitialVelocityModule, LifetimeModule, OrbitModule, SourceLinkModule,
};
use cinder_particles::particle::{OrbitPayload, SourceLinkPayload};
use cinder_particles::{
    Burst, ChainMode, EmitterError, EmitterInstance, EmitterState, EmitterTemplate, FloatDistribution,
    LayoutPlanner, LodLevel, ModuleId, RequiredSettings, TickContext, VectorDistribution,
};
use glam::Vec3;

fn active(level: LodLevel, seed: u64) -> EmitterInstance {
    let mut emitter = EmitterInstance::new(Arc::new(EmitterTemplate::single("scenario", level)), seed);
    emitter.activate().expect("activate");
    emitter
}

fn bursts(bursts: Vec<Burst>) -> RequiredSettings {
    RequiredSettings {
        bursts,
        ..RequiredSettings::default()
    }
}

/// Sequence numbers of the live particles, in live order.
fn sequences(emitter: &EmitterInstance, offset: usize) -> Vec<u32> {
    (0..emitter.active_count())
        .filter_map(|live| emitter.particle(live))
        .filter_map(|p| p.payload::<SourceLinkPayload>(offset))
        .map(|link| link.sequence)
        .collect()
}

/// Test: constant rate 10/s at dt 0.1 spawns exactly one per tick.
#[test]
fn test_constant_rate_ten_ticks() {
    let mut emitter = active(LodLevel::new(RequiredSettings::with_rate(10.0)), 1);
    let ctx = TickContext::new(0.1);

    for _ in 0..10 {
        emitter.tick(&ctx).unwrap();
    }

    assert_eq!(emitter.active_count(), 10);
    assert!(emitter.leftover().abs() < 1e-4, "leftover {}", emitter.leftover());
}

/// Test: cumulative spawns follow floor(N * dt * R) within one carry.
#[test]
fn test_cumulative_spawn_count() {
    let mut emitter = active(LodLevel::new(RequiredSettings::with_rate(15.0)), 2);
    let ctx = TickContext::new(1.0 / 60.0);

    for _ in 0..120 {
        emitter.tick(&ctx).unwrap();
    }

    // 120 * (1/60) * 15 = 30
    let count = emitter.active_count();
    assert!((29..=30).contains(&count), "spawned {count}");
    assert!((0.0..1.0).contains(&emitter.leftover()));
}

/// Test: a burst of 5 at time 0 lands on the first tick with no base rate.
#[test]
fn test_burst_on_first_tick() {
    let mut emitter = active(LodLevel::new(bursts(vec![Burst::new(5, 0.0)])), 3);

    emitter.tick(&TickContext::new(0.016)).unwrap();
    assert!(emitter.active_count() >= 5);

    // Fired once for this loop.
    emitter.tick(&TickContext::new(0.016)).unwrap();
    assert_eq!(emitter.active_count(), 5);
}

/// Test: bursts fire again after every loop boundary.
#[test]
fn test_burst_refires_each_loop() {
    let level = LodLevel::new(RequiredSettings {
        duration: 0.5,
        ..bursts(vec![Burst::new(3, 0.0)])
    });
    let mut emitter = active(level, 4);
    let ctx = TickContext::new(0.1);

    for _ in 0..4 {
        emitter.tick(&ctx).unwrap();
    }
    assert_eq!(emitter.active_count(), 3);

    for _ in 0..3 {
        emitter.tick(&ctx).unwrap();
    }
    assert_eq!(emitter.loop_count(), 1);
    assert_eq!(emitter.active_count(), 6);
}

/// Test: growing past capacity keeps earlier particles where they were.
#[test]
fn test_pool_growth_preserves_identity() {
    let level = LodLevel::new(RequiredSettings {
        initial_allocation: 10,
        ..bursts(vec![Burst::new(6, 0.0), Burst::new(6, 0.1)])
    })
    .with_module(SourceLinkModule::default());
    let mut emitter = active(level, 5);
    assert_eq!(emitter.capacity(), 10);
    let offset = emitter.layout().unwrap().module_offset(ModuleId(0));

    emitter.tick(&TickContext::new(0.016)).unwrap();
    let before = sequences(&emitter, offset);
    assert_eq!(before.len(), 6);

    emitter.tick(&TickContext::new(0.1)).unwrap();
    assert_eq!(emitter.active_count(), 12);
    assert!(emitter.capacity() >= 12 + 4 + 1, "capacity {}", emitter.capacity());
    assert_eq!(ParticlePool::grown_capacity(12), Ok(17));

    let after = sequences(&emitter, offset);
    assert_eq!(&after[..6], &before[..]);
    assert!(emitter.is_consistent());
}

/// Test: a burst too large for the pool fails the tick and changes nothing.
#[test]
fn test_oversized_burst_is_fatal() {
    let level = LodLevel::new(RequiredSettings {
        bursts: vec![Burst::new(4, 0.0), Burst::new(u32::MAX, 0.2)],
        ..RequiredSettings::default()
    })
    .with_module(SourceLinkModule::default());
    let mut emitter = active(level, 11);
    let offset = emitter.layout().unwrap().module_offset(ModuleId(0));
    let ctx = TickContext::new(0.125);

    emitter.tick(&ctx).unwrap();
    assert_eq!(emitter.active_count(), 4);
    let capacity = emitter.capacity();
    let live = sequences(&emitter, offset);

    let result = emitter.tick(&ctx);
    assert!(matches!(
        result,
        Err(EmitterError::Pool(PoolError::CapacityOverflow { .. }))
    ));
    assert_eq!(emitter.state(), EmitterState::Active);
    assert!((emitter.seconds() - 0.125).abs() < f32::EPSILON);
    assert!((emitter.emitter_time() - 0.125).abs() < f32::EPSILON);
    assert_eq!(emitter.capacity(), capacity);
    assert_eq!(sequences(&emitter, offset), live);

    // The burst was not consumed: every retry fails the same way.
    for _ in 0..3 {
        assert!(emitter.tick(&ctx).is_err());
    }
    assert!((emitter.seconds() - 0.125).abs() < f32::EPSILON);
    assert_eq!(emitter.active_count(), 4);
}

/// Test: a spawn rate beyond any capacity is an error, not a panic.
#[test]
fn test_huge_rate_is_fatal() {
    let mut emitter = active(LodLevel::new(RequiredSettings::with_rate(1e30)), 12);

    let result = emitter.tick(&TickContext::new(0.1));
    assert!(matches!(
        result,
        Err(EmitterError::Pool(PoolError::CapacityOverflow { .. }))
    ));
    assert_eq!(emitter.seconds(), 0.0);
    assert_eq!(emitter.active_count(), 0);
    assert_eq!(emitter.capacity(), 0);
    assert_eq!(emitter.peak_active(), 0);
    assert!(emitter.is_consistent());
}

/// Test: two link-mode orbits without rotation resolve to their sum.
#[test]
fn test_orbit_links_sum() {
    let level = LodLevel::new(bursts(vec![Burst::new(2, 0.0)]))
        .with_module(OrbitModule::new(Vec3::new(1.0, 0.0, 0.0), ChainMode::Link))
        .with_module(OrbitModule::new(Vec3::new(0.0, 2.0, 0.0), ChainMode::Link));
    let mut emitter = active(level, 6);

    emitter.tick(&TickContext::new(0.016)).unwrap();
    emitter.tick(&TickContext::new(0.016)).unwrap();

    let snapshot = emitter.snapshot().unwrap();
    let offset = snapshot.descriptor().orbit_offset.expect("orbit offset");
    assert_eq!(offset, emitter.layout().unwrap().module_offset(ModuleId(1)));
    for particle in snapshot.particles() {
        let orbit = particle.payload::<OrbitPayload>(offset).unwrap();
        assert!((orbit.offset - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
    }
}

fn lod_pair() -> Arc<EmitterTemplate> {
    let high = LodLevel::new(RequiredSettings::with_rate(30.0))
        .with_module(LifetimeModule::new(FloatDistribution::uniform(0.5, 1.0)))
        .with_module(InitialVelocityModule::new(VectorDistribution::uniform(
            Vec3::new(-1.0, 0.0, 2.0),
            Vec3::new(1.0, 0.5, 4.0),
        )));
    let low = LodLevel::new(RequiredSettings::with_rate(10.0))
        .with_module(LifetimeModule::new(FloatDistribution::constant(2.0)))
        .with_module(InitialVelocityModule::new(VectorDistribution::constant(Vec3::Z)));
    Arc::new(EmitterTemplate::new("pair", vec![high, low]).unwrap())
}

/// Test: blend weights at the extremes match the plain levels exactly.
#[test]
fn test_blend_extremes_match_single_levels() {
    let template = lod_pair();
    let ctx = TickContext::new(0.05);

    for (weight, level) in [(0.0, 1), (1.0, 0)] {
        let mut blended = EmitterInstance::new(Arc::clone(&template), 99);
        let mut single = EmitterInstance::new(Arc::clone(&template), 99);
        blended.activate().unwrap();
        single.set_lod(level).unwrap();
        single.activate().unwrap();

        for _ in 0..30 {
            blended.tick_blended(0, 1, weight, &ctx).unwrap();
            single.tick(&ctx).unwrap();
        }

        let a = blended.snapshot().unwrap();
        let b = single.snapshot().unwrap();
        assert!(a.active_count() > 0);
        assert_eq!(a.active_count(), b.active_count(), "weight {weight}");
        assert_eq!(a.live_indices(), b.live_indices(), "weight {weight}");
        assert_eq!(a.bytes(), b.bytes(), "weight {weight}");
        assert_eq!(blended.bounds(), single.bounds());
    }
}

/// Test: a mid weight blends the spawn rate.
#[test]
fn test_blend_mid_weight_rate() {
    let template = lod_pair();
    let mut emitter = EmitterInstance::new(template, 5);
    emitter.activate().unwrap();

    // 0.5 * 30 + 0.5 * 10 = 20 per second.
    for _ in 0..5 {
        emitter.tick_blended(0, 1, 0.5, &TickContext::new(0.1)).unwrap();
    }
    assert_eq!(emitter.active_count(), 10);
}

/// Test: structurally different levels cannot blend.
#[test]
fn test_blend_mismatch_is_fatal() {
    let high = LodLevel::new(RequiredSettings::with_rate(10.0))
        .with_module(LifetimeModule::new(FloatDistribution::constant(1.0)));
    let low = LodLevel::new(RequiredSettings::with_rate(10.0));
    let template = Arc::new(EmitterTemplate::new("broken", vec![high, low]).unwrap());

    let mut emitter = EmitterInstance::new(template, 0);
    assert!(emitter.initialize().is_err());
    assert_eq!(emitter.state(), EmitterState::Uninitialized);
}

/// Test: heavy churn never breaks the live-index permutation.
#[test]
fn test_churn_keeps_pool_consistent() {
    let level = LodLevel::new(RequiredSettings {
        bursts: vec![Burst {
            count: 40,
            count_low: 10,
            time: 0.2,
        }],
        ..RequiredSettings::with_rate(200.0)
    })
    .with_module(LifetimeModule::new(FloatDistribution::uniform(0.05, 0.4)));
    let mut emitter = active(level, 7);
    let ctx = TickContext::new(1.0 / 60.0);

    for _ in 0..300 {
        emitter.tick(&ctx).unwrap();
        assert!(emitter.active_count() <= emitter.capacity());
        assert!(emitter.is_consistent());
    }
    assert!(emitter.active_count() > 0);
    assert!(emitter.peak_active() >= emitter.active_count());
}

/// Test: bounds contain every live particle after integration.
#[test]
fn test_bounds_contain_particles() {
    let level = LodLevel::new(RequiredSettings::with_rate(50.0))
        .with_module(LifetimeModule::new(FloatDistribution::constant(3.0)))
        .with_module(InitialVelocityModule::new(VectorDistribution::uniform(
            Vec3::splat(-5.0),
            Vec3::splat(5.0),
        )));
    let mut emitter = active(level, 8);
    let ctx = TickContext::new(0.02).at(Vec3::new(10.0, 0.0, -3.0));

    for _ in 0..50 {
        emitter.tick(&ctx).unwrap();
    }

    let snapshot = emitter.snapshot().unwrap();
    let bounds = snapshot.descriptor().bounds;
    assert!(bounds.is_valid);
    for particle in snapshot.particles() {
        assert!(bounds.contains(particle.header().location));
    }
}

/// Test: layouts planned twice from one stack are identical.
#[test]
fn test_layout_planning_is_deterministic() {
    let level = LodLevel::new(RequiredSettings::default())
        .with_module(LifetimeModule::new(FloatDistribution::constant(1.0)))
        .with_module(OrbitModule::new(Vec3::X, ChainMode::Add))
        .with_module(SourceLinkModule::default());

    let (first, _) = LayoutPlanner::plan(level.type_data(), level.modules()).unwrap();
    let (second, _) = LayoutPlanner::plan(level.type_data(), level.modules()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.stride % 16, 0);
}

/// Test: a snapshot does not follow later ticks.
#[test]
fn test_snapshot_diverges_from_pool() {
    let level = LodLevel::new(bursts(vec![Burst::new(4, 0.0)]))
        .with_module(InitialVelocityModule::new(VectorDistribution::constant(Vec3::X)));
    let mut emitter = active(level, 9);
    emitter.tick(&TickContext::new(0.1)).unwrap();

    let snapshot = emitter.snapshot().unwrap();
    let before = snapshot.particle(0).unwrap().header().location;

    emitter.tick(&TickContext::new(0.1)).unwrap();
    let live = emitter.particle(0).unwrap().header().location;

    assert_eq!(snapshot.particle(0).unwrap().header().location, before);
    assert!((live.x - before.x - 0.1).abs() < 1e-5);
}

/// Test: reads past the live range are not found.
#[test]
fn test_out_of_range_reads() {
    let mut emitter = active(LodLevel::new(bursts(vec![Burst::new(2, 0.0)])), 10);
    emitter.tick(&TickContext::new(0.016)).unwrap();

    assert!(emitter.particle(2).is_none());
    assert!(!emitter.kill_particle(2));
    assert!(emitter.snapshot().unwrap().particle(2).is_none());
}
