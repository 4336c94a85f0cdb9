//! # Tick Context
//!
//! Everything a tick needs from the outside world is passed in explicitly:
//! owner transform, scale, spawn suppression, warm-up. Randomness comes from
//! the instance's own seeded generator.

use glam::{Mat4, Vec3};

/// Random generator used by every module.
pub type SimRng = rand_chacha::ChaCha8Rng;

/// Per-tick input supplied by the owner of an emitter instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickContext {
    /// Seconds to advance.
    pub delta_time: f32,
    /// Owner's local-to-world transform; its origin is the emitter anchor.
    pub local_to_world: Mat4,
    /// External non-uniform scale applied to particle sizes for bounds.
    pub scale: Vec3,
    /// Skip the spawn pass this tick.
    pub suppress_spawning: bool,
    /// The owner was just attached; the anchor does not interpolate.
    pub just_attached: bool,
    /// Warm-up ticks integrate particles but do not accumulate bounds.
    pub warming_up: bool,
}

impl TickContext {
    /// A context at the origin with unit scale.
    #[must_use]
    pub fn new(delta_time: f32) -> Self {
        Self {
            delta_time,
            local_to_world: Mat4::IDENTITY,
            scale: Vec3::ONE,
            suppress_spawning: false,
            just_attached: false,
            warming_up: false,
        }
    }

    /// Sets the owner transform.
    #[must_use]
    pub fn with_transform(mut self, local_to_world: Mat4) -> Self {
        self.local_to_world = local_to_world;
        self
    }

    /// Moves the anchor to `location`, keeping rotation and scale.
    #[must_use]
    pub fn at(mut self, location: Vec3) -> Self {
        self.local_to_world.w_axis = location.extend(1.0);
        self
    }

    /// Sets the external size scale.
    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Suppresses or allows spawning.
    #[must_use]
    pub fn suppressed(mut self, suppress: bool) -> Self {
        self.suppress_spawning = suppress;
        self
    }

    /// Marks the tick as the first one after attachment.
    #[must_use]
    pub fn just_attached(mut self) -> Self {
        self.just_attached = true;
        self
    }

    /// Marks the tick as a warm-up tick.
    #[must_use]
    pub fn warming_up(mut self) -> Self {
        self.warming_up = true;
        self
    }

    /// The emitter anchor in world space.
    #[inline]
    #[must_use]
    pub fn location(&self) -> Vec3 {
        self.local_to_world.w_axis.truncate()
    }
}

/// Read-only emitter state seen by modules during a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmitterFrame {
    /// Time inside the current loop, delay already subtracted.
    pub emitter_time: f32,
    /// Seconds advanced this tick.
    pub delta_time: f32,
    /// Anchor this tick.
    pub location: Vec3,
    /// Anchor last tick.
    pub old_location: Vec3,
    /// Owner transform.
    pub local_to_world: Mat4,
    /// Particles live in the owner's space.
    pub use_local_space: bool,
}

impl EmitterFrame {
    /// Transforms a direction into the particles' space.
    ///
    /// World-space emitters rotate module-local vectors by the owner
    /// transform; local-space emitters use them as-is.
    #[inline]
    #[must_use]
    pub fn to_particle_space(&self, vector: Vec3) -> Vec3 {
        if self.use_local_space {
            vector
        } else {
            self.local_to_world.transform_vector3(vector)
        }
    }
}
