//! # Bounding Volume Integrator
//!
//! Integrates position and rotation of every live particle and folds the
//! results into one axis-aligned box.

use std::f32::consts::TAU;

use cinder_core::ParticlePool;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::module::TypeDataModule;
use crate::particle::{flags, OrbitPayload, ParticleMut};

/// Fraction of the largest particle size added around the box (`1/sqrt(2)`).
pub const BOUNDS_SCALAR: f32 = 0.707_107;

/// An axis-aligned bounding box. Starts invalid (empty).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
    /// False until the first point is added.
    pub is_valid: bool,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// An empty box.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
            is_valid: false,
        }
    }

    /// Grows the box to contain `point`.
    #[inline]
    pub fn add_point(&mut self, point: Vec3) {
        if self.is_valid {
            self.min = self.min.min(point);
            self.max = self.max.max(point);
        } else {
            self.min = point;
            self.max = point;
            self.is_valid = true;
        }
    }

    /// Returns the box grown by `amount` on every side.
    #[must_use]
    pub fn expand_by(self, amount: f32) -> Self {
        if !self.is_valid {
            return self;
        }
        Self {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
            is_valid: true,
        }
    }

    /// Returns the box enclosing this box transformed by `matrix`.
    #[must_use]
    pub fn transform_by(self, matrix: &Mat4) -> Self {
        if !self.is_valid {
            return self;
        }
        let mut out = Self::empty();
        for corner in 0..8 {
            let point = Vec3::new(
                if corner & 1 == 0 { self.min.x } else { self.max.x },
                if corner & 2 == 0 { self.min.y } else { self.max.y },
                if corner & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.add_point(matrix.transform_point3(point));
        }
        out
    }

    /// Returns true if `point` lies inside or on the box.
    #[must_use]
    pub fn contains(&self, point: Vec3) -> bool {
        self.is_valid && point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

/// Inputs of one integration pass.
pub(crate) struct BoundsPass<'a> {
    pub dt: f32,
    pub scale: Vec3,
    pub warming_up: bool,
    pub use_local_space: bool,
    pub local_to_world: Mat4,
    /// Payload offset of the last orbit module, if the emitter has orbits.
    pub orbit_offset: Option<usize>,
    pub type_data: Option<&'a dyn TypeDataModule>,
}

impl BoundsPass<'_> {
    /// Integrates every live particle and returns the new box.
    pub fn run(&self, pool: &mut ParticlePool) -> Aabb {
        let mut max_size_scale: f32 = 1.0;
        let mut bounds = Aabb::empty();

        for live in 0..pool.active_count() {
            let Some(mut particle) = pool.live_mut(live).and_then(ParticleMut::new) else {
                continue;
            };

            let header = particle.header_mut();
            header.old_location = header.location;
            let mut new_location = header.location;
            let mut new_rotation = header.rotation;
            if !header.has_flag(flags::FREEZE) {
                if !header.has_flag(flags::FREEZE_TRANSLATION) {
                    new_location += self.dt * header.velocity;
                }
                if !header.has_flag(flags::FREEZE_ROTATION) {
                    new_rotation += self.dt * header.rotation_rate;
                }
            }

            let size = header.size * self.scale;
            max_size_scale = max_size_scale.max(size.abs().max_element());

            header.rotation = new_rotation % TAU;
            header.location = new_location;

            if self.warming_up {
                continue;
            }

            let extent = if let Some(offset) = self.orbit_offset {
                particle
                    .payload::<OrbitPayload>(offset)
                    .map(|orbit| Vec3::splat(orbit.offset.abs().max_element()))
            } else {
                self.type_data
                    .and_then(|td| td.bounds_extent(particle.header()))
            };

            match extent {
                Some(extent) => {
                    bounds.add_point(new_location + extent);
                    bounds.add_point(new_location - extent);
                }
                None => bounds.add_point(new_location),
            }
        }

        if self.warming_up {
            return bounds;
        }

        bounds = bounds.expand_by(max_size_scale * BOUNDS_SCALAR);
        if self.use_local_space {
            bounds = bounds.transform_by(&self.local_to_world);
        }
        bounds
    }
}
