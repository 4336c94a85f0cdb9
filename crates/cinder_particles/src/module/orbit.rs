//! # Orbit Module
//!
//! Places a particle at an offset (optionally rotating) relative to the
//! point resolved by the orbit modules before it. See [`crate::orbit`] for
//! how chains are resolved each tick.

use std::any::Any;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{blend_vec, default_enabled, ChainMode, ParticleModule, SpawnContext};
use crate::distribution::VectorDistribution;
use crate::particle::OrbitPayload;

/// One link of an orbit chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitModule {
    /// Offset from the previous link's point.
    #[serde(default)]
    pub offset: VectorDistribution,
    /// Initial rotation in turns per axis.
    #[serde(default)]
    pub rotation: VectorDistribution,
    /// Rotation rate in turns per second per axis.
    #[serde(default)]
    pub rotation_rate: VectorDistribution,
    /// How this link combines with the previous ones.
    #[serde(default)]
    pub chain_mode: ChainMode,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl OrbitModule {
    /// A fixed offset link with no rotation.
    #[must_use]
    pub fn new(offset: Vec3, chain_mode: ChainMode) -> Self {
        Self {
            offset: VectorDistribution::constant(offset),
            rotation: VectorDistribution::default(),
            rotation_rate: VectorDistribution::default(),
            chain_mode,
            enabled: true,
        }
    }

    /// Sets a constant rotation rate.
    #[must_use]
    pub fn with_rotation_rate(mut self, turns_per_second: Vec3) -> Self {
        self.rotation_rate = VectorDistribution::constant(turns_per_second);
        self
    }

    fn apply(ctx: &mut SpawnContext<'_>, offset: usize, values: [Vec3; 3]) {
        let [base_offset, rotation, rotation_rate] = values;
        if let Some(payload) = ctx.particle.payload_mut::<OrbitPayload>(offset) {
            *payload = OrbitPayload {
                base_offset,
                offset: base_offset,
                rotation,
                base_rotation_rate: rotation_rate,
                rotation_rate,
                previous_offset: base_offset,
            };
        }
    }

    fn sample(&self, ctx: &mut SpawnContext<'_>) -> [Vec3; 3] {
        let time = ctx.frame.emitter_time;
        [
            self.offset.sample(time, ctx.rng),
            self.rotation.sample(time, ctx.rng),
            self.rotation_rate.sample(time, ctx.rng),
        ]
    }
}

impl ParticleModule for OrbitModule {
    fn name(&self) -> &'static str {
        "orbit"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn spawns(&self) -> bool {
        true
    }

    fn required_bytes(&self) -> usize {
        std::mem::size_of::<OrbitPayload>()
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, offset: usize, _spawn_time: f32) {
        let values = self.sample(ctx);
        Self::apply(ctx, offset, values);
    }

    fn spawn_blended(
        &self,
        ctx: &mut SpawnContext<'_>,
        offset: usize,
        spawn_time: f32,
        partner: &dyn ParticleModule,
        weight: f32,
    ) {
        let Some(other) = partner.as_any().downcast_ref::<Self>() else {
            return self.spawn(ctx, offset, spawn_time);
        };
        let high = self.sample(ctx);
        let low = other.sample(ctx);
        let values = [0, 1, 2].map(|i| blend_vec(high[i], low[i], weight));
        Self::apply(ctx, offset, values);
    }

    fn chain_mode(&self) -> Option<ChainMode> {
        Some(self.chain_mode)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
