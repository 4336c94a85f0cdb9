//! # Layout Planner
//!
//! Computes, once per instance, where each module's data lives.
//!
//! ## Record Layout
//!
//! ```text
//! ┌──────────┬───────────┬──────────┬─────┬──────────┬───────────┬─────────┬─────┐
//! │ header   │ type data │ module 0 │ ... │ module n │ sub-image │ mesh    │ pad │
//! │ 128 B    │           │          │     │          │ (sub-img) │ (mesh)  │     │
//! └──────────┴───────────┴──────────┴─────┴──────────┴───────────┴─────────┴─────┘
//! ```
//!
//! Modules reserving no bytes get no range. The stride is rounded up to
//! [`RECORD_ALIGNMENT`]. Per-instance bytes are planned the same way into an
//! [`InstanceArena`], which is zero-filled once.

use std::collections::HashMap;

use cinder_core::{InstanceArena, RECORD_ALIGNMENT};
use tracing::debug;

use crate::error::{EmitterError, EmitterResult};
use crate::module::{ModuleId, ParticleModule, SubImageGrid, TypeDataModule};
use crate::particle::{MeshRotationPayload, HEADER_SIZE};

/// Byte granularity every module requirement must honor.
const PAYLOAD_GRANULARITY: usize = 4;

/// Location of the sub-image payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubImageSlot {
    /// Byte offset inside the record.
    pub offset: usize,
    /// Grid the payload describes.
    pub grid: SubImageGrid,
}

/// Offsets of every module's data, fixed for the instance's lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmitterLayout {
    /// Bytes per particle record.
    pub stride: usize,
    /// Offset of the type-data module's payload.
    pub type_data_offset: usize,
    /// Offset where the trailing emitter payloads begin.
    pub payload_offset: usize,
    /// Sub-image payload, for sub-image emitters.
    pub sub_image: Option<SubImageSlot>,
    /// Mesh rotation payload, for mesh emitters.
    pub mesh_rotation_offset: Option<usize>,
    /// Total per-instance bytes.
    pub instance_bytes: usize,
    type_data_instance: Option<(usize, usize)>,
    module_offsets: HashMap<ModuleId, usize>,
    instance_ranges: HashMap<ModuleId, (usize, usize)>,
}

impl EmitterLayout {
    /// Record offset of a module's payload, or 0 if it reserved none.
    #[inline]
    #[must_use]
    pub fn module_offset(&self, id: ModuleId) -> usize {
        self.module_offsets.get(&id).copied().unwrap_or(0)
    }

    /// Whether a module owns a range inside each record.
    #[inline]
    #[must_use]
    pub fn has_payload(&self, id: ModuleId) -> bool {
        self.module_offsets.contains_key(&id)
    }

    /// `(offset, len)` of a module's per-instance bytes.
    #[inline]
    #[must_use]
    pub fn instance_range(&self, id: ModuleId) -> Option<(usize, usize)> {
        self.instance_ranges.get(&id).copied()
    }

    /// `(offset, len)` of the type-data module's per-instance bytes.
    #[inline]
    #[must_use]
    pub const fn type_data_instance(&self) -> Option<(usize, usize)> {
        self.type_data_instance
    }

    /// Number of modules owning a record range.
    #[inline]
    #[must_use]
    pub fn payload_module_count(&self) -> usize {
        self.module_offsets.len()
    }
}

/// Plans [`EmitterLayout`]s.
pub struct LayoutPlanner;

impl LayoutPlanner {
    /// Walks the type-data module and the stack and returns the layout with
    /// its zero-filled instance buffer.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::MisalignedModuleBytes` if any requirement is
    /// not a multiple of 4, or a pool error if the instance buffer cannot be
    /// allocated.
    pub fn plan(
        type_data: Option<&dyn TypeDataModule>,
        modules: &[Box<dyn ParticleModule>],
    ) -> EmitterResult<(EmitterLayout, InstanceArena)> {
        let mut arena = InstanceArena::new();
        let mut size = HEADER_SIZE;

        let type_data_offset = HEADER_SIZE;
        let mut type_data_instance = None;
        if let Some(td) = type_data {
            let per_particle = checked(td.as_module(), 0, td.required_bytes(), "particle")?;
            size += per_particle;
            let per_instance = checked(
                td.as_module(),
                0,
                td.required_bytes_per_instance(),
                "instance",
            )?;
            if per_instance > 0 {
                type_data_instance = Some((arena.reserve(per_instance), per_instance));
            }
        }

        let mut module_offsets = HashMap::new();
        let mut instance_ranges = HashMap::new();
        for (position, module) in modules.iter().enumerate() {
            let id = module_id(position);
            let per_particle = checked(module.as_ref(), position, module.required_bytes(), "particle")?;
            if per_particle > 0 {
                module_offsets.insert(id, size);
                size += per_particle;
            }
            let per_instance = checked(
                module.as_ref(),
                position,
                module.required_bytes_per_instance(),
                "instance",
            )?;
            if per_instance > 0 {
                instance_ranges.insert(id, (arena.reserve(per_instance), per_instance));
            }
        }

        let payload_offset = size;
        let sub_image = type_data.and_then(|td| td.sub_image()).map(|grid| {
            let slot = SubImageSlot { offset: size, grid };
            size += grid.payload_bytes();
            slot
        });
        let mesh_rotation_offset = type_data
            .is_some_and(|td| td.uses_mesh_rotation())
            .then(|| {
                let offset = size;
                size += std::mem::size_of::<MeshRotationPayload>();
                offset
            });

        let stride = size.next_multiple_of(RECORD_ALIGNMENT);
        arena.allocate()?;

        debug!(
            stride,
            payload_offset,
            instance_bytes = arena.len(),
            modules = modules.len(),
            "Planned emitter layout"
        );

        Ok((
            EmitterLayout {
                stride,
                type_data_offset,
                payload_offset,
                sub_image,
                mesh_rotation_offset,
                instance_bytes: arena.len(),
                type_data_instance,
                module_offsets,
                instance_ranges,
            },
            arena,
        ))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn module_id(position: usize) -> ModuleId {
    ModuleId(position as u16)
}

fn checked(
    module: &dyn ParticleModule,
    position: usize,
    bytes: usize,
    scope: &'static str,
) -> EmitterResult<usize> {
    if bytes % PAYLOAD_GRANULARITY == 0 {
        Ok(bytes)
    } else {
        Err(EmitterError::MisalignedModuleBytes {
            module: module.name(),
            position,
            bytes,
            scope,
        })
    }
}
