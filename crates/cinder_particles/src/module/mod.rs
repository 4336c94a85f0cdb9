//! # Particle Modules
//!
//! A module is a pluggable unit of behavior. It may reserve bytes inside
//! every particle record and bytes in the instance side buffer, initialize
//! particles when they spawn, and modify them every tick.
//!
//! ## Dispatch Order
//!
//! ```text
//! spawn:   type-data spawn → stack modules (stack order) → post-spawn
//! update:  type-data pre_update → stack modules → type-data update → post_update
//! ```
//!
//! Disabled modules are skipped entirely.

use std::any::Any;
use std::fmt;

use cinder_core::ParticlePool;
use serde::{Deserialize, Serialize};

use crate::context::{EmitterFrame, SimRng};
use crate::layout::EmitterLayout;
use crate::particle::{ParticleHeader, ParticleMut};

mod mesh;
mod orbit;
mod source_link;
mod spawn;
mod spawn_per_unit;
mod sub_image;
mod type_data;
mod update;

pub use mesh::{MeshRotationModule, MeshRotationRateModule};
pub use orbit::OrbitModule;
pub use source_link::SourceLinkModule;
pub use spawn::{
    InitialColorModule, InitialLocationModule, InitialRotationModule, InitialRotationRateModule,
    InitialSizeModule, InitialVelocityModule, LifetimeModule,
};
pub use spawn_per_unit::SpawnPerUnitModule;
pub use sub_image::SubImageModule;
pub use type_data::{
    EmitterKind, MeshTypeData, SpriteTypeData, SubImageMethod, SubImageTypeData,
};
pub use update::{AccelerationModule, ColorOverLifeModule, SizeByLifeModule};

/// Position of a module in its LOD level's stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub u16);

impl ModuleId {
    /// The stack position as an index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// How an orbit module combines with the modules before it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    /// Add into the running total.
    #[default]
    Add,
    /// Multiply into the running total.
    Scale,
    /// Resolve the running total and start a new link.
    Link,
}

/// Named payload kinds the snapshot exposes to renderers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PayloadTag {
    /// Trail linkage, see [`crate::particle::SourceLinkPayload`].
    SourceLink,
}

/// Spawn contribution of a spawn-rate module.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnRate {
    /// Particles per second.
    pub rate: f32,
    /// Whether the emitter's own rate distribution still applies.
    pub process_base_rate: bool,
}

/// Context of one module spawn call for one particle.
pub struct SpawnContext<'a> {
    /// Emitter state this tick.
    pub frame: &'a EmitterFrame,
    /// Record layout of the instance.
    pub layout: &'a EmitterLayout,
    /// The particle being spawned.
    pub particle: ParticleMut<'a>,
    /// Pool slot of the particle.
    pub slot: usize,
    /// This module's per-instance bytes (empty if it reserved none).
    pub instance: &'a mut [u8],
    /// Instance random generator.
    pub rng: &'a mut SimRng,
}

/// Context of one module update call over all live particles.
pub struct UpdateContext<'a> {
    /// Emitter state this tick.
    pub frame: &'a EmitterFrame,
    /// Record layout of the instance.
    pub layout: &'a EmitterLayout,
    /// This module's per-instance bytes (empty if it reserved none).
    pub instance: &'a mut [u8],
    /// Instance random generator.
    pub rng: &'a mut SimRng,
    pool: &'a mut ParticlePool,
}

impl<'a> UpdateContext<'a> {
    /// Creates an update context over `pool`.
    pub fn new(
        frame: &'a EmitterFrame,
        layout: &'a EmitterLayout,
        pool: &'a mut ParticlePool,
        instance: &'a mut [u8],
        rng: &'a mut SimRng,
    ) -> Self {
        Self {
            frame,
            layout,
            instance,
            rng,
            pool,
        }
    }

    /// Number of live particles.
    #[inline]
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }

    /// Calls `f` for every live particle that is not frozen, last to first.
    pub fn for_each_live(&mut self, mut f: impl FnMut(&mut ParticleMut<'_>)) {
        for live in (0..self.pool.active_count()).rev() {
            let Some(mut particle) = self.pool.live_mut(live).and_then(ParticleMut::new) else {
                continue;
            };
            if particle.header().is_frozen() {
                continue;
            }
            f(&mut particle);
        }
    }

    /// Like [`Self::for_each_live`], also handing out the random generator.
    pub fn for_each_live_with_rng(&mut self, mut f: impl FnMut(&mut ParticleMut<'_>, &mut SimRng)) {
        for live in (0..self.pool.active_count()).rev() {
            let Some(mut particle) = self.pool.live_mut(live).and_then(ParticleMut::new) else {
                continue;
            };
            if particle.header().is_frozen() {
                continue;
            }
            f(&mut particle, self.rng);
        }
    }
}

/// The module capability interface.
///
/// Every hook has a no-op default; a module overrides what it takes part in
/// and reports participation through [`ParticleModule::spawns`] and
/// [`ParticleModule::updates`].
pub trait ParticleModule: fmt::Debug + Send + Sync + Any {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Disabled modules are skipped in every dispatch.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Takes part in the spawn dispatch.
    fn spawns(&self) -> bool {
        false
    }

    /// Takes part in the update dispatch.
    fn updates(&self) -> bool {
        false
    }

    /// Bytes reserved in every particle record.
    fn required_bytes(&self) -> usize {
        0
    }

    /// Bytes reserved once per instance, zeroed at initialization.
    fn required_bytes_per_instance(&self) -> usize {
        0
    }

    /// Initializes a freshly spawned particle.
    ///
    /// `offset` is this module's payload offset (0 if it reserved none);
    /// `spawn_time` is how far into the tick the particle was born.
    fn spawn(&self, ctx: &mut SpawnContext<'_>, offset: usize, spawn_time: f32) {
        let _ = (ctx, offset, spawn_time);
    }

    /// Updates every live particle.
    fn update(&self, ctx: &mut UpdateContext<'_>, offset: usize, dt: f32) {
        let _ = (ctx, offset, dt);
    }

    /// Spawn blended with the same-position module of another LOD level.
    ///
    /// `weight` is this module's share. Modules that cannot blend spawn alone.
    fn spawn_blended(
        &self,
        ctx: &mut SpawnContext<'_>,
        offset: usize,
        spawn_time: f32,
        partner: &dyn ParticleModule,
        weight: f32,
    ) {
        let _ = (partner, weight);
        self.spawn(ctx, offset, spawn_time);
    }

    /// Update blended with the same-position module of another LOD level.
    fn update_blended(
        &self,
        ctx: &mut UpdateContext<'_>,
        offset: usize,
        dt: f32,
        partner: &dyn ParticleModule,
        weight: f32,
    ) {
        let _ = (partner, weight);
        self.update(ctx, offset, dt);
    }

    /// Whether this module contributes a spawn rate.
    fn provides_spawn_rate(&self) -> bool {
        false
    }

    /// Spawn-rate contribution for this tick.
    ///
    /// `old_leftover` is the fractional spawn count carried from last tick.
    fn spawn_rate(
        &self,
        frame: &EmitterFrame,
        instance: &mut [u8],
        rng: &mut SimRng,
        old_leftover: f32,
        dt: f32,
    ) -> Option<SpawnRate> {
        let _ = (frame, instance, rng, old_leftover, dt);
        None
    }

    /// Orbit chain mode, for orbit modules.
    fn chain_mode(&self) -> Option<ChainMode> {
        None
    }

    /// Named payload this module owns, if renderers need to find it.
    fn payload_tag(&self) -> Option<PayloadTag> {
        None
    }

    /// Upcast for blend partners.
    fn as_any(&self) -> &dyn Any;
}

/// The module defining what kind of particle an emitter renders.
///
/// Its payload sits right after the header; it also decides which
/// emitter-specific payloads trail the record.
pub trait TypeDataModule: ParticleModule {
    /// The rendering kind.
    fn kind(&self) -> EmitterKind;

    /// Sub-image payload requirements, if the kind uses sub-images.
    fn sub_image(&self) -> Option<SubImageGrid> {
        None
    }

    /// Whether records carry a mesh rotation payload.
    fn uses_mesh_rotation(&self) -> bool {
        false
    }

    /// Runs before the stack's update modules.
    fn pre_update(&self, ctx: &mut UpdateContext<'_>, offset: usize, dt: f32) {
        let _ = (ctx, offset, dt);
    }

    /// Runs after the type-data update hook.
    fn post_update(&self, ctx: &mut UpdateContext<'_>, offset: usize, dt: f32) {
        let _ = (ctx, offset, dt);
    }

    /// Runs after post-spawn integration of each new particle.
    fn post_spawn(&self, ctx: &mut SpawnContext<'_>, offset: usize) {
        let _ = (ctx, offset);
    }

    /// Called for each particle removed by the kill pass.
    fn on_kill(&self, particle: &mut ParticleMut<'_>, layout: &EmitterLayout) {
        let _ = (particle, layout);
    }

    /// Half-extent of a particle's footprint for bounds, if not a point.
    fn bounds_extent(&self, header: &ParticleHeader) -> Option<glam::Vec3> {
        let _ = header;
        None
    }

    /// Upcast to the plain module interface.
    fn as_module(&self) -> &dyn ParticleModule;
}

/// Sub-image grid and selection method carried by sub-image emitters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubImageGrid {
    /// Images per row.
    pub horizontal: u32,
    /// Images per column.
    pub vertical: u32,
    /// Selection method.
    pub method: SubImageMethod,
}

impl SubImageGrid {
    /// Bytes of the sub-image payload for this method.
    #[must_use]
    pub const fn payload_bytes(&self) -> usize {
        if self.method.is_random() {
            std::mem::size_of::<crate::particle::RandomSubImagePayload>()
        } else {
            std::mem::size_of::<crate::particle::SubImagePayload>()
        }
    }
}

/// Serde default for module `enabled` fields.
pub(crate) const fn default_enabled() -> bool {
    true
}

/// Blends two scalars: `a * weight + b * (1 - weight)`.
#[inline]
#[must_use]
pub fn blend(a: f32, b: f32, weight: f32) -> f32 {
    a * weight + b * (1.0 - weight)
}

/// Blends two vectors: `a * weight + b * (1 - weight)`.
#[inline]
#[must_use]
pub fn blend_vec(a: glam::Vec3, b: glam::Vec3, weight: f32) -> glam::Vec3 {
    a * weight + b * (1.0 - weight)
}
