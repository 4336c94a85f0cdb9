//! # Spawn Pass
//!
//! Turns the tick's spawn rate and bursts into a particle count, grows the
//! pool and initializes every new record.
//!
//! Planning and growth run before the kill pass touches the pool, so a
//! failed growth leaves the pool as it was.
//!
//! ## Leftover Carry
//!
//! ```text
//! new     = old + dt * rate
//! count   = max(floor(new), burst)
//! spacing = 1 / rate, newest particle spawned last
//! carry   = new - floor(new)
//! ```

use cinder_core::{InstanceArena, ParticlePool, PoolError};
use tracing::debug;

use super::lod::{instance_bytes, BurstTally, Dispatch};
use super::{EmitterInstance, Storage};
use crate::context::{EmitterFrame, SimRng};
use crate::error::EmitterResult;
use crate::layout::EmitterLayout;
use crate::module::SpawnContext;
use crate::particle::{ParticleHeader, ParticleMut};

/// Ticks at least this long do not update the peak particle count.
const PEAK_TRACKING_DELTA: f32 = 0.05;

/// Anchor moves shorter than this (squared) do not spread spawns along the path.
const SPREAD_DISTANCE_SQ: f32 = 1.0;

/// How many particles to spawn this tick and when each was born.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SpawnPlan {
    /// Particles to spawn.
    pub count: usize,
    /// Age of the first particle at the end of the tick.
    pub start_time: f32,
    /// Age difference between consecutive particles.
    pub increment: f32,
}

impl SpawnPlan {
    /// Age of particle `i` at the end of the tick.
    #[allow(clippy::cast_precision_loss)]
    #[inline]
    pub fn spawn_time(&self, i: usize) -> f32 {
        self.start_time - i as f32 * self.increment
    }

    /// How far back along the anchor's path particle `i` is placed.
    #[allow(clippy::cast_precision_loss)]
    #[inline]
    pub fn path_fraction(&self, i: usize) -> f32 {
        1.0 - (i + 1) as f32 / self.count as f32
    }
}

/// Splits `rate` (plus bursts) over `dt`.
///
/// Returns the plan, if anything spawns, and the fractional carry for the
/// next tick. A rate at or below zero spawns nothing and keeps the carry.
pub(crate) fn plan_spawn(
    old_leftover: f32,
    rate: f32,
    burst: BurstTally,
    dt: f32,
) -> (Option<SpawnPlan>, f32) {
    let rate = rate + burst.rate;
    if rate.is_nan() || rate <= 0.0 {
        return (None, old_leftover);
    }

    let mut leftover = old_leftover + dt * rate;
    let number = leftover.floor();
    let increment = 1.0 / rate;
    let start_time = dt + old_leftover * increment - increment;
    leftover -= number;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = (number.max(0.0) as usize).max(burst.count as usize);
    if burst.rate > 0.0 && burst.count > 0 {
        #[allow(clippy::cast_precision_loss)]
        let burst_share = burst.rate / burst.count as f32;
        leftover = (leftover - burst_share).max(0.0);
    }

    let plan = (count > 0).then_some(SpawnPlan {
        count,
        start_time,
        increment,
    });
    (plan, leftover)
}

/// Places a new particle along the anchor's path and integrates it forward
/// to the end of the tick.
fn post_spawn(header: &mut ParticleHeader, frame: &EmitterFrame, fraction: f32, spawn_time: f32) {
    if !frame.use_local_space
        && frame.old_location.distance_squared(frame.location) > SPREAD_DISTANCE_SQ
    {
        header.location += fraction * (frame.old_location - frame.location);
    }
    header.old_location = header.location;
    header.location += spawn_time * header.velocity;
}

fn spawn_context<'a>(
    frame: &'a EmitterFrame,
    layout: &'a EmitterLayout,
    pool: &'a mut ParticlePool,
    slot: usize,
    arena: &'a mut InstanceArena,
    range: Option<(usize, usize)>,
    rng: &'a mut SimRng,
) -> Option<SpawnContext<'a>> {
    let particle = ParticleMut::new(pool.record_mut(slot))?;
    Some(SpawnContext {
        frame,
        layout,
        particle,
        slot,
        instance: instance_bytes(arena, range),
        rng,
    })
}

/// Spawns `plan.count` particles into the pool's free slots.
pub(super) fn spawn_particles(
    storage: &mut Storage,
    rng: &mut SimRng,
    frame: &EmitterFrame,
    dispatch: Dispatch<'_>,
    plan: SpawnPlan,
) {
    let layout = &storage.layout;
    let pool = &mut storage.pool;
    let arena = &mut storage.arena;
    let type_data_range = layout.type_data_instance();
    let spawn_ids = dispatch.spawn_ids();

    for i in 0..plan.count {
        let Some(slot) = pool.acquire() else {
            break;
        };
        let spawn_time = plan.spawn_time(i);

        if let Some(mut particle) = ParticleMut::new(pool.record_mut(slot)) {
            particle.clear();
            if !frame.use_local_space {
                particle.header_mut().location = frame.location;
            }
        }

        if dispatch.type_data().is_some() {
            if let Some(mut ctx) = spawn_context(frame, layout, pool, slot, arena, type_data_range, rng) {
                dispatch.spawn_type_data(&mut ctx, layout.type_data_offset, spawn_time);
            }
        }

        for &id in spawn_ids.iter() {
            let range = layout.instance_range(id);
            if let Some(mut ctx) = spawn_context(frame, layout, pool, slot, arena, range, rng) {
                dispatch.spawn_module(id, &mut ctx, layout.module_offset(id), spawn_time);
            }
        }

        if let Some(mut particle) = ParticleMut::new(pool.record_mut(slot)) {
            post_spawn(particle.header_mut(), frame, plan.path_fraction(i), spawn_time);
        }

        if let Some(td) = dispatch.type_data().filter(|td| td.is_enabled()) {
            if let Some(mut ctx) = spawn_context(frame, layout, pool, slot, arena, type_data_range, rng) {
                td.post_spawn(&mut ctx, layout.type_data_offset);
            }
        }
    }
}

impl EmitterInstance {
    /// Plans this tick's spawns and grows the pool to fit them.
    ///
    /// `survivors` is the live count once expired particles are gone.
    /// Returns the plan, if anything spawns, and the new leftover.
    ///
    /// # Errors
    ///
    /// Returns a pool error if the pool cannot grow to fit the plan.
    pub(super) fn plan_spawns(
        &mut self,
        storage: &mut Storage,
        dispatch: Dispatch<'_>,
        frame: &EmitterFrame,
        dt: f32,
        survivors: usize,
    ) -> EmitterResult<(Option<SpawnPlan>, f32)> {
        let old_leftover = self.leftover;

        let (mut rate, process_base) = dispatch.module_spawn_rate(
            frame,
            &storage.layout,
            &mut storage.arena,
            &mut self.rng,
            old_leftover,
            dt,
        );
        if process_base {
            rate += dispatch.base_rate(frame.emitter_time, &mut self.rng);
        }

        let dt = dispatch.burst_delta(dt);
        let burst = dispatch.fire_bursts(&mut self.clock, frame.emitter_time, dt, &mut self.rng);

        let (plan, leftover) = plan_spawn(old_leftover, rate, burst, dt);
        let Some(plan) = plan else {
            return Ok((None, leftover));
        };

        let wanted = survivors
            .checked_add(plan.count)
            .ok_or(PoolError::CapacityOverflow {
                requested: plan.count,
            })?;
        if storage.pool.reserve_for(wanted)? {
            debug!(
                emitter = self.template.name(),
                capacity = storage.pool.capacity(),
                wanted,
                "Grew particle pool"
            );
        }
        if dt < PEAK_TRACKING_DELTA {
            self.peak_active = self.peak_active.max(wanted);
        }

        Ok((Some(plan), leftover))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};

    fn frame(old_location: Vec3, location: Vec3, use_local_space: bool) -> EmitterFrame {
        EmitterFrame {
            emitter_time: 0.0,
            delta_time: 0.1,
            location,
            old_location,
            local_to_world: Mat4::IDENTITY,
            use_local_space,
        }
    }

    #[test]
    fn test_constant_rate_carries_fraction() {
        let (plan, leftover) = plan_spawn(0.0, 15.0, BurstTally::default(), 0.1);
        let plan = plan.unwrap();
        assert_eq!(plan.count, 1);
        assert!((leftover - 0.5).abs() < 1e-5);

        let (plan, leftover) = plan_spawn(leftover, 15.0, BurstTally::default(), 0.1);
        assert_eq!(plan.unwrap().count, 2);
        assert!(leftover.abs() < 1e-5);
    }

    #[test]
    fn test_zero_rate_keeps_leftover() {
        let (plan, leftover) = plan_spawn(0.3, 0.0, BurstTally::default(), 0.1);
        assert!(plan.is_none());
        assert!((leftover - 0.3).abs() < 1e-6);

        let (plan, _) = plan_spawn(0.3, f32::NAN, BurstTally::default(), 0.1);
        assert!(plan.is_none());
    }

    #[test]
    fn test_burst_forces_minimum_count() {
        let burst = BurstTally {
            count: 5,
            rate: 5.0 / 0.016,
        };
        let (plan, leftover) = plan_spawn(0.0, 0.0, burst, 0.016);
        assert_eq!(plan.unwrap().count, 5);
        assert_eq!(leftover, 0.0);
    }

    #[test]
    fn test_spawn_times_spread_over_tick() {
        let (plan, _) = plan_spawn(0.0, 40.0, BurstTally::default(), 0.1);
        let plan = plan.unwrap();
        assert_eq!(plan.count, 4);
        // Oldest first: born 0.075s before the end of the tick, newest at 0.
        assert!((plan.spawn_time(0) - 0.075).abs() < 1e-5);
        assert!(plan.spawn_time(3).abs() < 1e-5);
        assert!((plan.path_fraction(0) - 0.75).abs() < 1e-6);
        assert_eq!(plan.path_fraction(3), 0.0);
    }

    #[test]
    fn test_post_spawn_integrates_velocity() {
        let mut header = ParticleHeader {
            location: Vec3::ZERO,
            velocity: Vec3::new(10.0, 0.0, 0.0),
            ..ParticleHeader::default()
        };
        post_spawn(&mut header, &frame(Vec3::ZERO, Vec3::ZERO, false), 0.0, 0.05);
        assert_eq!(header.old_location, Vec3::ZERO);
        assert!((header.location.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_post_spawn_spreads_along_path() {
        let moved = frame(Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0), false);
        let mut header = ParticleHeader {
            location: Vec3::new(4.0, 0.0, 0.0),
            ..ParticleHeader::default()
        };
        post_spawn(&mut header, &moved, 0.5, 0.0);
        assert_eq!(header.location, Vec3::new(2.0, 0.0, 0.0));

        let local = frame(Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0), true);
        let mut header = ParticleHeader::default();
        post_spawn(&mut header, &local, 0.5, 0.0);
        assert_eq!(header.location, Vec3::ZERO);
    }
}
