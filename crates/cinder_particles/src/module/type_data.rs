//! # Type-Data Modules
//!
//! The type-data module decides what an emitter renders and injects the
//! kind-specific behavior: trailing payloads, mesh rotation integration,
//! sub-image payload cleanup, mesh-sized bounds.

use std::any::Any;

use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    default_enabled, ParticleModule, SpawnContext, SubImageGrid, TypeDataModule, UpdateContext,
};
use crate::layout::EmitterLayout;
use crate::particle::{flags, MeshRotationPayload, ParticleHeader, ParticleMut};

/// What an emitter renders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitterKind {
    /// Camera-facing quads.
    #[default]
    Sprite,
    /// Quads sampling a grid of sub-images.
    SubImage,
    /// Instanced meshes.
    Mesh,
}

/// How sub-images are picked over a particle's life.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubImageMethod {
    /// Step through images, no blending.
    #[default]
    Linear,
    /// Step through images, blending neighbors.
    LinearBlend,
    /// Random image, re-rolled a fixed number of times per life.
    Random,
    /// Random image with blending.
    RandomBlend,
}

impl SubImageMethod {
    /// Random selection methods carry an extra payload float.
    #[inline]
    #[must_use]
    pub const fn is_random(self) -> bool {
        matches!(self, Self::Random | Self::RandomBlend)
    }

    /// Blending methods interpolate between neighboring images.
    #[inline]
    #[must_use]
    pub const fn is_blend(self) -> bool {
        matches!(self, Self::LinearBlend | Self::RandomBlend)
    }
}

/// Plain sprites.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpriteTypeData {}

impl ParticleModule for SpriteTypeData {
    fn name(&self) -> &'static str {
        "sprite"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TypeDataModule for SpriteTypeData {
    fn kind(&self) -> EmitterKind {
        EmitterKind::Sprite
    }

    fn as_module(&self) -> &dyn ParticleModule {
        self
    }
}

/// Sprites that sample a grid of sub-images.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubImageTypeData {
    /// Images per row.
    pub horizontal: u32,
    /// Images per column.
    pub vertical: u32,
    /// Selection method.
    #[serde(default)]
    pub method: SubImageMethod,
}

impl SubImageTypeData {
    /// A sub-image grid.
    #[must_use]
    pub const fn new(horizontal: u32, vertical: u32, method: SubImageMethod) -> Self {
        Self {
            horizontal,
            vertical,
            method,
        }
    }
}

impl ParticleModule for SubImageTypeData {
    fn name(&self) -> &'static str {
        "sub_image"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TypeDataModule for SubImageTypeData {
    fn kind(&self) -> EmitterKind {
        EmitterKind::SubImage
    }

    fn sub_image(&self) -> Option<SubImageGrid> {
        Some(SubImageGrid {
            horizontal: self.horizontal.max(1),
            vertical: self.vertical.max(1),
            method: self.method,
        })
    }

    fn on_kill(&self, particle: &mut ParticleMut<'_>, layout: &EmitterLayout) {
        let Some(slot) = layout.sub_image else {
            return;
        };
        if let Some(bytes) = particle.payload_bytes_mut(slot.offset, slot.grid.payload_bytes()) {
            bytes.fill(0);
        }
    }

    fn as_module(&self) -> &dyn ParticleModule {
        self
    }
}

/// Instanced meshes with per-axis rotation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshTypeData {
    /// Bounding sphere radius of the mesh at unit size.
    #[serde(default = "unit_radius")]
    pub sphere_radius: f32,
    /// Orient the mesh X axis along the velocity.
    #[serde(default)]
    pub velocity_aligned: bool,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn unit_radius() -> f32 {
    1.0
}

impl Default for MeshTypeData {
    fn default() -> Self {
        Self {
            sphere_radius: unit_radius(),
            velocity_aligned: false,
            enabled: true,
        }
    }
}

/// Euler angles in degrees turning +X onto `velocity`.
fn velocity_euler_degrees(velocity: Vec3) -> Option<Vec3> {
    let direction = velocity.try_normalize()?;
    let (x, y, z) = Quat::from_rotation_arc(Vec3::X, direction).to_euler(EulerRot::XYZ);
    Some(Vec3::new(x, y, z) * (180.0 / std::f32::consts::PI))
}

impl ParticleModule for MeshTypeData {
    fn name(&self) -> &'static str {
        "mesh"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl TypeDataModule for MeshTypeData {
    fn kind(&self) -> EmitterKind {
        EmitterKind::Mesh
    }

    fn uses_mesh_rotation(&self) -> bool {
        true
    }

    fn pre_update(&self, ctx: &mut UpdateContext<'_>, _offset: usize, _dt: f32) {
        let Some(offset) = ctx.layout.mesh_rotation_offset else {
            return;
        };
        let aligned = self.velocity_aligned;
        ctx.for_each_live(|particle| {
            let Some((header, payload)) = particle.split_payload_mut::<MeshRotationPayload>(offset)
            else {
                return;
            };
            payload.rotation_rate = payload.base_rotation_rate;
            if aligned {
                if let Some(euler) = velocity_euler_degrees(header.velocity) {
                    payload.rotation = euler;
                }
            }
        });
    }

    fn post_update(&self, ctx: &mut UpdateContext<'_>, _offset: usize, dt: f32) {
        let Some(offset) = ctx.layout.mesh_rotation_offset else {
            return;
        };
        ctx.for_each_live(|particle| {
            let Some((header, payload)) = particle.split_payload_mut::<MeshRotationPayload>(offset)
            else {
                return;
            };
            if !header.has_flag(flags::FREEZE_ROTATION) {
                payload.rotation += dt * payload.rotation_rate;
            }
        });
    }

    fn post_spawn(&self, ctx: &mut SpawnContext<'_>, _offset: usize) {
        if !self.velocity_aligned {
            return;
        }
        let Some(offset) = ctx.layout.mesh_rotation_offset else {
            return;
        };
        if let Some((header, payload)) = ctx.particle.split_payload_mut::<MeshRotationPayload>(offset) {
            if let Some(euler) = velocity_euler_degrees(header.velocity) {
                payload.rotation += euler;
            }
        }
    }

    fn bounds_extent(&self, header: &ParticleHeader) -> Option<Vec3> {
        Some((header.size * self.sphere_radius).abs())
    }

    fn as_module(&self) -> &dyn ParticleModule {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_image_payload_sizes() {
        let linear = SubImageTypeData::new(4, 4, SubImageMethod::Linear);
        let random = SubImageTypeData::new(4, 4, SubImageMethod::RandomBlend);
        assert_eq!(linear.sub_image().unwrap().payload_bytes(), 20);
        assert_eq!(random.sub_image().unwrap().payload_bytes(), 24);
    }

    #[test]
    fn test_sub_image_grid_is_never_empty() {
        let grid = SubImageTypeData::new(0, 0, SubImageMethod::Linear).sub_image().unwrap();
        assert_eq!((grid.horizontal, grid.vertical), (1, 1));
    }

    #[test]
    fn test_velocity_alignment() {
        let euler = velocity_euler_degrees(Vec3::new(0.0, 5.0, 0.0)).unwrap();
        assert!((euler.z - 90.0).abs() < 1e-3);
        assert!(velocity_euler_degrees(Vec3::ZERO).is_none());
    }

    #[test]
    fn test_mesh_bounds_extent() {
        let mesh = MeshTypeData {
            sphere_radius: 2.0,
            ..MeshTypeData::default()
        };
        let header = ParticleHeader {
            size: Vec3::new(1.0, -3.0, 0.5),
            ..ParticleHeader::default()
        };
        assert_eq!(mesh.bounds_extent(&header), Some(Vec3::new(2.0, 6.0, 1.0)));
    }
}
