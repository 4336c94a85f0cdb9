//! # Per-Tick Modifiers
//!
//! Modules that touch every live particle every tick.

use std::any::Any;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{blend, blend_vec, default_enabled, ParticleModule, SpawnContext, UpdateContext};
use crate::distribution::{FloatDistribution, VectorDistribution};

/// Constant acceleration, stored per particle so that each particle keeps
/// the value sampled at its birth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelerationModule {
    /// Acceleration in emitter space, sampled at spawn.
    pub acceleration: VectorDistribution,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl AccelerationModule {
    /// An acceleration module.
    #[must_use]
    pub fn new(acceleration: VectorDistribution) -> Self {
        Self {
            acceleration,
            enabled: true,
        }
    }

    fn apply(ctx: &mut SpawnContext<'_>, offset: usize, acceleration: Vec3, spawn_time: f32) {
        let acceleration = ctx.frame.to_particle_space(acceleration);
        if let Some((header, stored)) = ctx.particle.split_payload_mut::<Vec3>(offset) {
            *stored = acceleration;
            header.velocity += acceleration * spawn_time;
            header.base_velocity += acceleration * spawn_time;
        }
    }
}

impl ParticleModule for AccelerationModule {
    fn name(&self) -> &'static str {
        "acceleration"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn spawns(&self) -> bool {
        true
    }

    fn updates(&self) -> bool {
        true
    }

    fn required_bytes(&self) -> usize {
        std::mem::size_of::<Vec3>()
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, offset: usize, spawn_time: f32) {
        let acceleration = self.acceleration.sample(ctx.frame.emitter_time, ctx.rng);
        Self::apply(ctx, offset, acceleration, spawn_time);
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
        let acceleration = blend_vec(
            self.acceleration.sample(time, ctx.rng),
            other.acceleration.sample(time, ctx.rng),
            weight,
        );
        Self::apply(ctx, offset, acceleration, spawn_time);
    }

    fn update(&self, ctx: &mut UpdateContext<'_>, offset: usize, dt: f32) {
        ctx.for_each_live(|particle| {
            if let Some((header, acceleration)) = particle.split_payload_mut::<Vec3>(offset) {
                header.velocity += *acceleration * dt;
                header.base_velocity += *acceleration * dt;
            }
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Scales size by a curve over the particle's relative lifetime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizeByLifeModule {
    /// Multiplier sampled at relative time.
    pub life_multiplier: VectorDistribution,
    /// Apply to X.
    #[serde(default = "default_enabled")]
    pub multiply_x: bool,
    /// Apply to Y.
    #[serde(default = "default_enabled")]
    pub multiply_y: bool,
    /// Apply to Z.
    #[serde(default = "default_enabled")]
    pub multiply_z: bool,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl SizeByLifeModule {
    /// Scales every axis.
    #[must_use]
    pub fn new(life_multiplier: VectorDistribution) -> Self {
        Self {
            life_multiplier,
            multiply_x: true,
            multiply_y: true,
            multiply_z: true,
            enabled: true,
        }
    }

    fn mask(&self, scale: Vec3) -> Vec3 {
        Vec3::new(
            if self.multiply_x { scale.x } else { 1.0 },
            if self.multiply_y { scale.y } else { 1.0 },
            if self.multiply_z { scale.z } else { 1.0 },
        )
    }
}

impl ParticleModule for SizeByLifeModule {
    fn name(&self) -> &'static str {
        "size_by_life"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn updates(&self) -> bool {
        true
    }

    fn update(&self, ctx: &mut UpdateContext<'_>, _offset: usize, _dt: f32) {
        ctx.for_each_live_with_rng(|particle, rng| {
            let header = particle.header_mut();
            let scale = self.life_multiplier.sample(header.relative_time, rng);
            header.size *= self.mask(scale);
        });
    }

    fn update_blended(
        &self,
        ctx: &mut UpdateContext<'_>,
        offset: usize,
        dt: f32,
        partner: &dyn ParticleModule,
        weight: f32,
    ) {
        let Some(other) = partner.as_any().downcast_ref::<Self>() else {
            return self.update(ctx, offset, dt);
        };
        ctx.for_each_live_with_rng(|particle, rng| {
            let header = particle.header_mut();
            let time = header.relative_time;
            let scale = blend_vec(
                self.mask(self.life_multiplier.sample(time, rng)),
                other.mask(other.life_multiplier.sample(time, rng)),
                weight,
            );
            header.size *= scale;
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Sets color from curves over the particle's relative lifetime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorOverLifeModule {
    /// RGB sampled at relative time.
    pub color_over_life: VectorDistribution,
    /// Alpha sampled at relative time.
    pub alpha_over_life: FloatDistribution,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ColorOverLifeModule {
    /// A color-over-life module.
    #[must_use]
    pub fn new(color_over_life: VectorDistribution, alpha_over_life: FloatDistribution) -> Self {
        Self {
            color_over_life,
            alpha_over_life,
            enabled: true,
        }
    }
}

impl ParticleModule for ColorOverLifeModule {
    fn name(&self) -> &'static str {
        "color_over_life"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn updates(&self) -> bool {
        true
    }

    fn update(&self, ctx: &mut UpdateContext<'_>, _offset: usize, _dt: f32) {
        ctx.for_each_live_with_rng(|particle, rng| {
            let header = particle.header_mut();
            let time = header.relative_time;
            let rgb = self.color_over_life.sample(time, rng);
            let alpha = self.alpha_over_life.sample(time, rng);
            header.color = rgb.extend(alpha);
        });
    }

    fn update_blended(
        &self,
        ctx: &mut UpdateContext<'_>,
        offset: usize,
        dt: f32,
        partner: &dyn ParticleModule,
        weight: f32,
    ) {
        let Some(other) = partner.as_any().downcast_ref::<Self>() else {
            return self.update(ctx, offset, dt);
        };
        ctx.for_each_live_with_rng(|particle, rng| {
            let header = particle.header_mut();
            let time = header.relative_time;
            let rgb = blend_vec(
                self.color_over_life.sample(time, rng),
                other.color_over_life.sample(time, rng),
                weight,
            );
            let alpha = blend(
                self.alpha_over_life.sample(time, rng),
                other.alpha_over_life.sample(time, rng),
                weight,
            );
            header.color = rgb.extend(alpha);
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
