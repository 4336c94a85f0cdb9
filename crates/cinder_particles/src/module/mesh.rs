//! Mesh rotation initializers. Both write into the mesh rotation payload
//! and do nothing on emitters that carry none.

use std::any::Any;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{blend_vec, default_enabled, ParticleModule, SpawnContext};
use crate::distribution::VectorDistribution;
use crate::particle::MeshRotationPayload;

/// Degrees per turn.
const DEGREES_PER_TURN: f32 = 360.0;

fn with_mesh_payload(ctx: &mut SpawnContext<'_>, f: impl FnOnce(&mut MeshRotationPayload)) {
    let Some(offset) = ctx.layout.mesh_rotation_offset else {
        return;
    };
    if let Some((_, payload)) = ctx.particle.split_payload_mut::<MeshRotationPayload>(offset) {
        f(payload);
    }
}

/// Initial per-axis mesh rotation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshRotationModule {
    /// Rotation in turns per axis.
    pub start_rotation: VectorDistribution,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl MeshRotationModule {
    /// A mesh rotation module.
    #[must_use]
    pub fn new(start_rotation: VectorDistribution) -> Self {
        Self {
            start_rotation,
            enabled: true,
        }
    }

    fn apply(ctx: &mut SpawnContext<'_>, turns: Vec3) {
        with_mesh_payload(ctx, |payload| {
            payload.rotation += turns * DEGREES_PER_TURN;
        });
    }
}

impl ParticleModule for MeshRotationModule {
    fn name(&self) -> &'static str {
        "mesh_rotation"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn spawns(&self) -> bool {
        true
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, _offset: usize, _spawn_time: f32) {
        let turns = self.start_rotation.sample(ctx.frame.emitter_time, ctx.rng);
        Self::apply(ctx, turns);
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
        let time = ctx.frame.emitter_time;
        let turns = blend_vec(
            self.start_rotation.sample(time, ctx.rng),
            other.start_rotation.sample(time, ctx.rng),
            weight,
        );
        Self::apply(ctx, turns);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Initial per-axis mesh rotation rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshRotationRateModule {
    /// Rate in turns per second per axis.
    pub start_rotation_rate: VectorDistribution,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl MeshRotationRateModule {
    /// A mesh rotation rate module.
    #[must_use]
    pub fn new(start_rotation_rate: VectorDistribution) -> Self {
        Self {
            start_rotation_rate,
            enabled: true,
        }
    }

    fn apply(ctx: &mut SpawnContext<'_>, turns: Vec3) {
        with_mesh_payload(ctx, |payload| {
            let rate = turns * DEGREES_PER_TURN;
            payload.rotation_rate += rate;
            payload.base_rotation_rate += rate;
        });
    }
}

impl ParticleModule for MeshRotationRateModule {
    fn name(&self) -> &'static str {
        "mesh_rotation_rate"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn spawns(&self) -> bool {
        true
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, _offset: usize, _spawn_time: f32) {
        let turns = self.start_rotation_rate.sample(ctx.frame.emitter_time, ctx.rng);
        Self::apply(ctx, turns);
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
        let time = ctx.frame.emitter_time;
        let turns = blend_vec(
            self.start_rotation_rate.sample(time, ctx.rng),
            other.start_rotation_rate.sample(time, ctx.rng),
            weight,
        );
        Self::apply(ctx, turns);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
