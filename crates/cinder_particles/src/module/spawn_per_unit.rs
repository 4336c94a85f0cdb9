//! # Spawn Per Unit
//!
//! Emits particles in proportion to the distance the anchor travelled.

use std::any::Any;

use serde::{Deserialize, Serialize};

use super::{default_enabled, ParticleModule, SpawnRate};
use crate::context::{EmitterFrame, SimRng};
use crate::distribution::FloatDistribution;

/// Spawn-rate module driven by anchor movement.
///
/// Keeps the untravelled remainder in its per-instance bytes so that slow
/// movement still spawns once enough distance accumulates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnPerUnitModule {
    /// Particles per `unit_scalar` distance units.
    pub spawn_per_unit: FloatDistribution,
    /// Distance unit.
    #[serde(default = "default_unit_scalar")]
    pub unit_scalar: f32,
    /// Movement (in units) below which the anchor counts as still.
    #[serde(default)]
    pub movement_tolerance: f32,
    /// Suppress the emitter's own rate while moving.
    #[serde(default)]
    pub ignore_spawn_rate_when_moving: bool,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_unit_scalar() -> f32 {
    1.0
}

impl SpawnPerUnitModule {
    /// Spawns `per_unit` particles per distance unit.
    #[must_use]
    pub fn new(per_unit: f32) -> Self {
        Self {
            spawn_per_unit: FloatDistribution::constant(per_unit),
            unit_scalar: default_unit_scalar(),
            movement_tolerance: 0.0,
            ignore_spawn_rate_when_moving: false,
            enabled: true,
        }
    }
}

impl ParticleModule for SpawnPerUnitModule {
    fn name(&self) -> &'static str {
        "spawn_per_unit"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn required_bytes_per_instance(&self) -> usize {
        std::mem::size_of::<f32>()
    }

    fn provides_spawn_rate(&self) -> bool {
        true
    }

    fn spawn_rate(
        &self,
        frame: &EmitterFrame,
        instance: &mut [u8],
        rng: &mut SimRng,
        _old_leftover: f32,
        dt: f32,
    ) -> Option<SpawnRate> {
        let stored = instance.get_mut(..std::mem::size_of::<f32>())?;
        let remainder: f32 = bytemuck::pod_read_unaligned(stored);

        let moved = (frame.location - frame.old_location).length();
        let travelled = moved + remainder;
        let unit_scalar = if self.unit_scalar > 0.0 { self.unit_scalar } else { 1.0 };
        let per_unit = self.spawn_per_unit.sample(frame.emitter_time, rng) / unit_scalar;

        let mut rate = 0.0;
        let mut remainder = travelled;
        if per_unit > 0.0 && dt > 0.0 {
            let number = (travelled * per_unit).floor();
            rate = number / dt;
            remainder = (travelled - number / per_unit).max(0.0);
        }
        stored.copy_from_slice(bytemuck::bytes_of(&remainder));

        let moving = moved > self.movement_tolerance * unit_scalar;
        Some(SpawnRate {
            rate,
            process_base_rate: !(self.ignore_spawn_rate_when_moving && moving),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
