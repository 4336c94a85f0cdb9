//! # Spawn-Time Initializers
//!
//! Modules that only touch a particle when it is born.

use std::any::Any;
use std::f32::consts::TAU;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::{blend, blend_vec, default_enabled, ParticleModule, SpawnContext};
use crate::distribution::{FloatDistribution, VectorDistribution};

/// Downcasts a blend partner to the same module type.
fn same<'a, T: 'static>(partner: &'a dyn ParticleModule) -> Option<&'a T> {
    partner.as_any().downcast_ref::<T>()
}

/// Sets the particle lifetime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LifetimeModule {
    /// Lifetime in seconds, sampled at emitter time.
    pub lifetime: FloatDistribution,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl LifetimeModule {
    /// A lifetime module.
    #[must_use]
    pub fn new(lifetime: FloatDistribution) -> Self {
        Self {
            lifetime,
            enabled: true,
        }
    }

    fn apply(ctx: &mut SpawnContext<'_>, lifetime: f32, spawn_time: f32) {
        let header = ctx.particle.header_mut();
        // Stacked lifetime modules add their lifetimes together.
        header.one_over_max_lifetime = if header.one_over_max_lifetime > 0.0 {
            1.0 / (lifetime + 1.0 / header.one_over_max_lifetime)
        } else if lifetime > 0.0 {
            1.0 / lifetime
        } else {
            0.0
        };
        header.relative_time = spawn_time * header.one_over_max_lifetime;
    }
}

impl ParticleModule for LifetimeModule {
    fn name(&self) -> &'static str {
        "lifetime"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn spawns(&self) -> bool {
        true
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, _offset: usize, spawn_time: f32) {
        let lifetime = self.lifetime.sample(ctx.frame.emitter_time, ctx.rng);
        Self::apply(ctx, lifetime, spawn_time);
    }

    fn spawn_blended(
        &self,
        ctx: &mut SpawnContext<'_>,
        offset: usize,
        spawn_time: f32,
        partner: &dyn ParticleModule,
        weight: f32,
    ) {
        let Some(other) = same::<Self>(partner) else {
            return self.spawn(ctx, offset, spawn_time);
        };
        let time = ctx.frame.emitter_time;
        let lifetime = blend(
            self.lifetime.sample(time, ctx.rng),
            other.lifetime.sample(time, ctx.rng),
            weight,
        );
        Self::apply(ctx, lifetime, spawn_time);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Offsets the spawn position from the anchor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialLocationModule {
    /// Offset in emitter space.
    pub start_location: VectorDistribution,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl InitialLocationModule {
    /// A location module.
    #[must_use]
    pub fn new(start_location: VectorDistribution) -> Self {
        Self {
            start_location,
            enabled: true,
        }
    }

    fn apply(ctx: &mut SpawnContext<'_>, offset: Vec3) {
        let offset = ctx.frame.to_particle_space(offset);
        ctx.particle.header_mut().location += offset;
    }
}

impl ParticleModule for InitialLocationModule {
    fn name(&self) -> &'static str {
        "initial_location"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn spawns(&self) -> bool {
        true
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, _offset: usize, _spawn_time: f32) {
        let value = self.start_location.sample(ctx.frame.emitter_time, ctx.rng);
        Self::apply(ctx, value);
    }

    fn spawn_blended(
        &self,
        ctx: &mut SpawnContext<'_>,
        offset: usize,
        spawn_time: f32,
        partner: &dyn ParticleModule,
        weight: f32,
    ) {
        let Some(other) = same::<Self>(partner) else {
            return self.spawn(ctx, offset, spawn_time);
        };
        let time = ctx.frame.emitter_time;
        let value = blend_vec(
            self.start_location.sample(time, ctx.rng),
            other.start_location.sample(time, ctx.rng),
            weight,
        );
        Self::apply(ctx, value);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Sets the initial velocity, with an optional radial component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialVelocityModule {
    /// Velocity in emitter space.
    pub start_velocity: VectorDistribution,
    /// Speed away from the anchor.
    #[serde(default)]
    pub start_velocity_radial: FloatDistribution,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl InitialVelocityModule {
    /// A velocity module without a radial component.
    #[must_use]
    pub fn new(start_velocity: VectorDistribution) -> Self {
        Self {
            start_velocity,
            start_velocity_radial: FloatDistribution::default(),
            enabled: true,
        }
    }

    fn apply(ctx: &mut SpawnContext<'_>, velocity: Vec3, radial: f32) {
        let frame = ctx.frame;
        let header = ctx.particle.header_mut();
        let from_anchor = if frame.use_local_space {
            header.location
        } else {
            header.location - frame.location
        };
        let velocity =
            frame.to_particle_space(velocity) + from_anchor.normalize_or_zero() * radial;
        header.velocity += velocity;
        header.base_velocity += velocity;
    }
}

impl ParticleModule for InitialVelocityModule {
    fn name(&self) -> &'static str {
        "initial_velocity"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn spawns(&self) -> bool {
        true
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, _offset: usize, _spawn_time: f32) {
        let time = ctx.frame.emitter_time;
        let velocity = self.start_velocity.sample(time, ctx.rng);
        let radial = self.start_velocity_radial.sample(time, ctx.rng);
        Self::apply(ctx, velocity, radial);
    }

    fn spawn_blended(
        &self,
        ctx: &mut SpawnContext<'_>,
        offset: usize,
        spawn_time: f32,
        partner: &dyn ParticleModule,
        weight: f32,
    ) {
        let Some(other) = same::<Self>(partner) else {
            return self.spawn(ctx, offset, spawn_time);
        };
        let time = ctx.frame.emitter_time;
        let velocity = blend_vec(
            self.start_velocity.sample(time, ctx.rng),
            other.start_velocity.sample(time, ctx.rng),
            weight,
        );
        let radial = blend(
            self.start_velocity_radial.sample(time, ctx.rng),
            other.start_velocity_radial.sample(time, ctx.rng),
            weight,
        );
        Self::apply(ctx, velocity, radial);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Sets the initial size.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialSizeModule {
    /// Size per axis.
    pub start_size: VectorDistribution,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl InitialSizeModule {
    /// A size module.
    #[must_use]
    pub fn new(start_size: VectorDistribution) -> Self {
        Self {
            start_size,
            enabled: true,
        }
    }

    fn apply(ctx: &mut SpawnContext<'_>, size: Vec3) {
        let header = ctx.particle.header_mut();
        header.size += size;
        header.base_size += size;
    }
}

impl ParticleModule for InitialSizeModule {
    fn name(&self) -> &'static str {
        "initial_size"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn spawns(&self) -> bool {
        true
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, _offset: usize, _spawn_time: f32) {
        let size = self.start_size.sample(ctx.frame.emitter_time, ctx.rng);
        Self::apply(ctx, size);
    }

    fn spawn_blended(
        &self,
        ctx: &mut SpawnContext<'_>,
        offset: usize,
        spawn_time: f32,
        partner: &dyn ParticleModule,
        weight: f32,
    ) {
        let Some(other) = same::<Self>(partner) else {
            return self.spawn(ctx, offset, spawn_time);
        };
        let time = ctx.frame.emitter_time;
        let size = blend_vec(
            self.start_size.sample(time, ctx.rng),
            other.start_size.sample(time, ctx.rng),
            weight,
        );
        Self::apply(ctx, size);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Sets the initial color.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialColorModule {
    /// RGB.
    pub start_color: VectorDistribution,
    /// Alpha.
    #[serde(default = "opaque")]
    pub start_alpha: FloatDistribution,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn opaque() -> FloatDistribution {
    FloatDistribution::constant(1.0)
}

impl InitialColorModule {
    /// An opaque color module.
    #[must_use]
    pub fn new(start_color: VectorDistribution) -> Self {
        Self {
            start_color,
            start_alpha: opaque(),
            enabled: true,
        }
    }

    fn apply(ctx: &mut SpawnContext<'_>, color: Vec4) {
        let header = ctx.particle.header_mut();
        header.color = color;
        header.base_color = color;
    }
}

impl ParticleModule for InitialColorModule {
    fn name(&self) -> &'static str {
        "initial_color"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn spawns(&self) -> bool {
        true
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, _offset: usize, _spawn_time: f32) {
        let time = ctx.frame.emitter_time;
        let rgb = self.start_color.sample(time, ctx.rng);
        let alpha = self.start_alpha.sample(time, ctx.rng);
        Self::apply(ctx, rgb.extend(alpha));
    }

    fn spawn_blended(
        &self,
        ctx: &mut SpawnContext<'_>,
        offset: usize,
        spawn_time: f32,
        partner: &dyn ParticleModule,
        weight: f32,
    ) {
        let Some(other) = same::<Self>(partner) else {
            return self.spawn(ctx, offset, spawn_time);
        };
        let time = ctx.frame.emitter_time;
        let rgb = blend_vec(
            self.start_color.sample(time, ctx.rng),
            other.start_color.sample(time, ctx.rng),
            weight,
        );
        let alpha = blend(
            self.start_alpha.sample(time, ctx.rng),
            other.start_alpha.sample(time, ctx.rng),
            weight,
        );
        Self::apply(ctx, rgb.extend(alpha));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Adds an initial rotation, in turns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialRotationModule {
    /// Rotation in turns (1.0 = 360 degrees).
    pub start_rotation: FloatDistribution,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl InitialRotationModule {
    /// A rotation module.
    #[must_use]
    pub fn new(start_rotation: FloatDistribution) -> Self {
        Self {
            start_rotation,
            enabled: true,
        }
    }
}

impl ParticleModule for InitialRotationModule {
    fn name(&self) -> &'static str {
        "initial_rotation"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn spawns(&self) -> bool {
        true
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, _offset: usize, _spawn_time: f32) {
        let turns = self.start_rotation.sample(ctx.frame.emitter_time, ctx.rng);
        ctx.particle.header_mut().rotation += TAU * turns;
    }

    fn spawn_blended(
        &self,
        ctx: &mut SpawnContext<'_>,
        offset: usize,
        spawn_time: f32,
        partner: &dyn ParticleModule,
        weight: f32,
    ) {
        let Some(other) = same::<Self>(partner) else {
            return self.spawn(ctx, offset, spawn_time);
        };
        let time = ctx.frame.emitter_time;
        let turns = blend(
            self.start_rotation.sample(time, ctx.rng),
            other.start_rotation.sample(time, ctx.rng),
            weight,
        );
        ctx.particle.header_mut().rotation += TAU * turns;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Adds an initial rotation rate, in turns per second.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialRotationRateModule {
    /// Rate in turns per second.
    pub start_rotation_rate: FloatDistribution,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl InitialRotationRateModule {
    /// A rotation-rate module.
    #[must_use]
    pub fn new(start_rotation_rate: FloatDistribution) -> Self {
        Self {
            start_rotation_rate,
            enabled: true,
        }
    }

    fn apply(ctx: &mut SpawnContext<'_>, turns: f32) {
        let header = ctx.particle.header_mut();
        header.rotation_rate += TAU * turns;
        header.base_rotation_rate += TAU * turns;
    }
}

impl ParticleModule for InitialRotationRateModule {
    fn name(&self) -> &'static str {
        "initial_rotation_rate"
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
        let Some(other) = same::<Self>(partner) else {
            return self.spawn(ctx, offset, spawn_time);
        };
        let time = ctx.frame.emitter_time;
        let turns = blend(
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
