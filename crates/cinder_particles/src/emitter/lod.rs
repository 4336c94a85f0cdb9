//! # LOD Dispatch
//!
//! Routes every module call of a tick either to one LOD level or to a
//! high/low pair blended by weight.
//!
//! ## Blending Rules
//!
//! ```text
//! both sides take part   high.blended(low, weight)
//! one side takes part    that side alone, full weight
//! rates and bursts       h * weight + l * (1 - weight)
//! ```
//!
//! Timing (duration, delay, loops) always follows the high level. The low
//! level's spawn-rate modules run on a scratch copy of the instance bytes so
//! they never disturb the high level's state.

use std::borrow::Cow;

use cinder_core::InstanceArena;
use rand::Rng;

use super::clock::EmitterClock;
use crate::context::{EmitterFrame, SimRng};
use crate::layout::EmitterLayout;
use crate::module::{
    blend, ModuleId, ParticleModule, SpawnContext, SpawnRate, TypeDataModule, UpdateContext,
};
use crate::template::{Burst, LodLevel};

/// Bursts never divide by less than this.
const MIN_BURST_DELTA: f32 = 1e-5;

/// Bursts fired in one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct BurstTally {
    /// Particles forced this tick.
    pub count: u32,
    /// Equivalent rate, `count / dt` summed over fired bursts.
    pub rate: f32,
}

/// Fires every unfired burst whose time has come.
pub(crate) fn fire_bursts(
    bursts: &[Burst],
    fired: &mut [bool],
    emitter_time: f32,
    dt: f32,
    rng: &mut SimRng,
) -> BurstTally {
    let mut tally = BurstTally::default();
    for (burst, fired) in bursts.iter().zip(fired.iter_mut()) {
        if *fired || emitter_time < burst.time {
            continue;
        }
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let count = if burst.count_low > 0 && burst.count > burst.count_low {
            (burst.count_low as f32 + rng.gen::<f32>() * (burst.count - burst.count_low) as f32)
                as u32
        } else {
            burst.count
        };
        #[allow(clippy::cast_precision_loss)]
        {
            tally.rate += count as f32 / dt;
        }
        tally.count = tally.count.saturating_add(count);
        *fired = true;
    }
    tally
}

/// Per-instance bytes of a module, empty if it reserved none.
pub(crate) fn instance_bytes(arena: &mut InstanceArena, range: Option<(usize, usize)>) -> &mut [u8] {
    range
        .and_then(|(offset, len)| arena.slice_mut(offset, len).ok())
        .unwrap_or_default()
}

/// Which side(s) of a pair take part in a dispatch.
enum Sides<'m> {
    Both(&'m dyn ParticleModule, &'m dyn ParticleModule),
    One(&'m dyn ParticleModule),
    Neither,
}

fn sides<'m>(
    high: Option<&'m dyn ParticleModule>,
    low: Option<&'m dyn ParticleModule>,
    takes_part: impl Fn(&dyn ParticleModule) -> bool,
) -> Sides<'m> {
    let high = high.filter(|module| module.is_enabled() && takes_part(*module));
    let low = low.filter(|module| module.is_enabled() && takes_part(*module));
    match (high, low) {
        (Some(high), Some(low)) => Sides::Both(high, low),
        (Some(one), None) | (None, Some(one)) => Sides::One(one),
        (None, None) => Sides::Neither,
    }
}

/// Stack positions where either level takes part.
fn union_ids(high: &LodLevel, low: &LodLevel, takes_part: impl Fn(&dyn ParticleModule) -> bool) -> Vec<ModuleId> {
    let count = high.modules().len().max(low.modules().len());
    (0..count)
        .filter_map(|position| u16::try_from(position).ok().map(ModuleId))
        .filter(|&id| {
            high.module(id).is_some_and(&takes_part) || low.module(id).is_some_and(&takes_part)
        })
        .collect()
}

/// Target of a tick's module calls.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Dispatch<'t> {
    /// One level alone.
    Single {
        /// The level.
        level: &'t LodLevel,
        /// Its index in the template.
        index: usize,
    },
    /// Two structurally identical levels blended by `weight`.
    Blended {
        /// Level receiving `weight`.
        high: &'t LodLevel,
        /// Level receiving `1 - weight`.
        low: &'t LodLevel,
        /// Index of `high`.
        high_index: usize,
        /// Index of `low`.
        low_index: usize,
        /// Share of the high level, strictly inside `(0, 1)`.
        weight: f32,
    },
}

impl<'t> Dispatch<'t> {
    /// The level defining timing, type data and layout.
    pub fn primary(self) -> &'t LodLevel {
        match self {
            Self::Single { level, .. } => level,
            Self::Blended { high, .. } => high,
        }
    }

    /// Index of the primary level.
    pub fn timing_index(self) -> usize {
        match self {
            Self::Single { index, .. } => index,
            Self::Blended { high_index, .. } => high_index,
        }
    }

    /// The primary level's type data.
    pub fn type_data(self) -> Option<&'t dyn TypeDataModule> {
        self.primary().type_data()
    }

    /// Positions whose spawn hook runs.
    pub fn spawn_ids(self) -> Cow<'t, [ModuleId]> {
        match self {
            Self::Single { level, .. } => Cow::Borrowed(level.spawn_modules()),
            Self::Blended { high, low, .. } => Cow::Owned(union_ids(high, low, |m| m.spawns())),
        }
    }

    /// Positions whose update hook runs.
    pub fn update_ids(self) -> Cow<'t, [ModuleId]> {
        match self {
            Self::Single { level, .. } => Cow::Borrowed(level.update_modules()),
            Self::Blended { high, low, .. } => Cow::Owned(union_ids(high, low, |m| m.updates())),
        }
    }

    /// Runs the type-data spawn hook.
    pub fn spawn_type_data(self, ctx: &mut SpawnContext<'_>, offset: usize, spawn_time: f32) {
        match self {
            Self::Single { level, .. } => {
                if let Some(td) = level.type_data().filter(|td| td.is_enabled()) {
                    td.spawn(ctx, offset, spawn_time);
                }
            }
            Self::Blended { high, low, weight, .. } => {
                let high = high.type_data().map(|td| td.as_module());
                let low = low.type_data().map(|td| td.as_module());
                match sides(high, low, |_| true) {
                    Sides::Both(high, low) => high.spawn_blended(ctx, offset, spawn_time, low, weight),
                    Sides::One(one) => one.spawn(ctx, offset, spawn_time),
                    Sides::Neither => {}
                }
            }
        }
    }

    /// Runs the spawn hook at stack position `id`.
    pub fn spawn_module(self, id: ModuleId, ctx: &mut SpawnContext<'_>, offset: usize, spawn_time: f32) {
        match self {
            Self::Single { level, .. } => {
                if let Some(module) = level.module(id).filter(|m| m.is_enabled()) {
                    module.spawn(ctx, offset, spawn_time);
                }
            }
            Self::Blended { high, low, weight, .. } => {
                match sides(high.module(id), low.module(id), |m| m.spawns()) {
                    Sides::Both(high, low) => high.spawn_blended(ctx, offset, spawn_time, low, weight),
                    Sides::One(one) => one.spawn(ctx, offset, spawn_time),
                    Sides::Neither => {}
                }
            }
        }
    }

    /// Runs the type-data update hook.
    pub fn update_type_data(self, ctx: &mut UpdateContext<'_>, offset: usize, dt: f32) {
        match self {
            Self::Single { level, .. } => {
                if let Some(td) = level.type_data().filter(|td| td.is_enabled()) {
                    td.update(ctx, offset, dt);
                }
            }
            Self::Blended { high, low, weight, .. } => {
                let high = high.type_data().map(|td| td.as_module());
                let low = low.type_data().map(|td| td.as_module());
                match sides(high, low, |_| true) {
                    Sides::Both(high, low) => high.update_blended(ctx, offset, dt, low, weight),
                    Sides::One(one) => one.update(ctx, offset, dt),
                    Sides::Neither => {}
                }
            }
        }
    }

    /// Runs the update hook at stack position `id`.
    pub fn update_module(self, id: ModuleId, ctx: &mut UpdateContext<'_>, offset: usize, dt: f32) {
        match self {
            Self::Single { level, .. } => {
                if let Some(module) = level.module(id).filter(|m| m.is_enabled()) {
                    module.update(ctx, offset, dt);
                }
            }
            Self::Blended { high, low, weight, .. } => {
                match sides(high.module(id), low.module(id), |m| m.updates()) {
                    Sides::Both(high, low) => high.update_blended(ctx, offset, dt, low, weight),
                    Sides::One(one) => one.update(ctx, offset, dt),
                    Sides::Neither => {}
                }
            }
        }
    }

    /// Sums the spawn-rate modules.
    ///
    /// Returns the rate and whether the level's own rate still applies.
    pub fn module_spawn_rate(
        self,
        frame: &EmitterFrame,
        layout: &EmitterLayout,
        arena: &mut InstanceArena,
        rng: &mut SimRng,
        old_leftover: f32,
        dt: f32,
    ) -> (f32, bool) {
        let mut rate = 0.0;
        let mut process_base = true;
        match self {
            Self::Single { level, .. } => {
                for &id in level.spawn_rate_modules() {
                    let Some(module) = level.module(id).filter(|m| m.is_enabled()) else {
                        continue;
                    };
                    let instance = instance_bytes(arena, layout.instance_range(id));
                    if let Some(contribution) = module.spawn_rate(frame, instance, rng, old_leftover, dt) {
                        rate += contribution.rate;
                        process_base &= contribution.process_base_rate;
                    }
                }
            }
            Self::Blended { high, low, weight, .. } => {
                for id in union_ids(high, low, |m| m.provides_spawn_rate()) {
                    let take = |module: Option<&'t dyn ParticleModule>| {
                        module.filter(|m| m.is_enabled() && m.provides_spawn_rate())
                    };
                    let instance = instance_bytes(arena, layout.instance_range(id));
                    let mut scratch = instance.to_vec();
                    let from_high: Option<SpawnRate> = take(high.module(id))
                        .and_then(|m| m.spawn_rate(frame, instance, rng, old_leftover, dt));
                    let from_low: Option<SpawnRate> = take(low.module(id))
                        .and_then(|m| m.spawn_rate(frame, &mut scratch, rng, old_leftover, dt));

                    rate += blend(
                        from_high.map_or(0.0, |r| r.rate),
                        from_low.map_or(0.0, |r| r.rate),
                        weight,
                    );
                    process_base &= from_high
                        .or(from_low)
                        .map_or(true, |r| r.process_base_rate);
                }
            }
        }
        (rate, process_base)
    }

    /// The levels' own rate distributions at `emitter_time`.
    pub fn base_rate(self, emitter_time: f32, rng: &mut SimRng) -> f32 {
        match self {
            Self::Single { level, .. } => level.required.spawn_rate.sample(emitter_time, rng),
            Self::Blended { high, low, weight, .. } => {
                let high = high.required.spawn_rate.sample(emitter_time, rng);
                let low = low.required.spawn_rate.sample(emitter_time, rng);
                blend(high, low, weight)
            }
        }
    }

    /// The tick length bursts divide by.
    pub fn burst_delta(self, dt: f32) -> f32 {
        let has_bursts = match self {
            Self::Single { level, .. } => !level.required.bursts.is_empty(),
            Self::Blended { high, low, .. } => {
                !high.required.bursts.is_empty() || !low.required.bursts.is_empty()
            }
        };
        if has_bursts {
            dt.max(MIN_BURST_DELTA)
        } else {
            dt
        }
    }

    /// Fires due bursts, blending per-level tallies.
    pub fn fire_bursts(
        self,
        clock: &mut EmitterClock,
        emitter_time: f32,
        dt: f32,
        rng: &mut SimRng,
    ) -> BurstTally {
        match self {
            Self::Single { level, index } => {
                fire_bursts(&level.required.bursts, clock.bursts_mut(index), emitter_time, dt, rng)
            }
            Self::Blended {
                high,
                low,
                high_index,
                low_index,
                weight,
            } => {
                let from_high =
                    fire_bursts(&high.required.bursts, clock.bursts_mut(high_index), emitter_time, dt, rng);
                let from_low =
                    fire_bursts(&low.required.bursts, clock.bursts_mut(low_index), emitter_time, dt, rng);
                #[allow(
                    clippy::cast_precision_loss,
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss
                )]
                let count = blend(from_high.count as f32, from_low.count as f32, weight) as u32;
                BurstTally {
                    count,
                    rate: blend(from_high.rate, from_low.rate, weight),
                }
            }
        }
    }
}
