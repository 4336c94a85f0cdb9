//! # Render Snapshots
//!
//! A [`Snapshot`] is an owned copy of an emitter's particle storage plus the
//! descriptor a renderer needs to decode it. It shares nothing with the
//! live pool, so it can be moved to another thread and read there while the
//! simulation keeps running.
//!
//! ```text
//! simulation thread                      render thread
//! ─────────────────                      ─────────────
//! tick()
//! publish_snapshot() ──► SnapshotPublisher ──► SnapshotReceiver::try_take()
//! tick()                  (latest wins)         draw(snapshot)
//! ```

use cinder_core::ParticlePool;
use glam::Vec3;

use crate::bounds::Aabb;
use crate::layout::SubImageSlot;
use crate::module::{EmitterKind, PayloadTag};
use crate::particle::ParticleRef;

/// Vertices per particle quad.
const VERTICES_PER_PARTICLE: usize = 4;
/// Indices per particle quad.
const INDICES_PER_PARTICLE: usize = 6;

/// Everything a renderer needs to decode a snapshot's bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotDescriptor {
    /// Number of live particles.
    pub active_count: usize,
    /// Records in the copied buffer.
    pub capacity: usize,
    /// Bytes per record.
    pub stride: usize,
    /// Rendering kind.
    pub kind: EmitterKind,
    /// External size scale of the owner.
    pub scale: Vec3,
    /// Particles are in the owner's space.
    pub use_local_space: bool,
    /// Bounds after the tick.
    pub bounds: Aabb,
    /// Offset of the type-data payload.
    pub type_data_offset: usize,
    /// Resolved orbit offset (last orbit module's payload).
    pub orbit_offset: Option<usize>,
    /// Sub-image payload and grid.
    pub sub_image: Option<SubImageSlot>,
    /// Mesh rotation payload.
    pub mesh_rotation_offset: Option<usize>,
    /// Trail linkage payload.
    pub source_link_offset: Option<usize>,
    /// Upper bound on particles to draw, if the emitter sets one.
    pub max_draw_count: Option<usize>,
}

impl SnapshotDescriptor {
    /// Particles a renderer should draw.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.max_draw_count
            .map_or(self.active_count, |max| self.active_count.min(max))
    }

    /// Quad vertices needed for the drawn particles.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.draw_count() * VERTICES_PER_PARTICLE
    }

    /// Quad indices needed for the drawn particles.
    #[must_use]
    pub fn index_count(&self) -> usize {
        self.draw_count() * INDICES_PER_PARTICLE
    }

    /// Offset of a named payload.
    #[must_use]
    pub fn payload_offset(&self, tag: PayloadTag) -> Option<usize> {
        match tag {
            PayloadTag::SourceLink => self.source_link_offset,
        }
    }
}

/// An immutable, independently owned copy of simulation state.
#[derive(Clone, Debug)]
pub struct Snapshot {
    descriptor: SnapshotDescriptor,
    data: Box<[u8]>,
    indices: Box<[u32]>,
}

impl Snapshot {
    /// Copies `pool` under `descriptor`.
    pub(crate) fn capture(pool: &ParticlePool, descriptor: SnapshotDescriptor) -> Self {
        Self {
            descriptor,
            data: pool.as_bytes().into(),
            indices: pool.indices().into(),
        }
    }

    /// The descriptor.
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &SnapshotDescriptor {
        &self.descriptor
    }

    /// Number of live particles.
    #[inline]
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.descriptor.active_count
    }

    /// Returns true if no particle is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptor.active_count == 0
    }

    /// Bytes per record.
    #[inline]
    #[must_use]
    pub fn stride(&self) -> usize {
        self.descriptor.stride
    }

    /// The whole copied record buffer.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// The whole copied index table.
    #[inline]
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Slot indices of live particles.
    #[inline]
    #[must_use]
    pub fn live_indices(&self) -> &[u32] {
        &self.indices[..self.descriptor.active_count.min(self.indices.len())]
    }

    /// The live particle at `live_pos`, or None past the live range.
    #[must_use]
    pub fn particle(&self, live_pos: usize) -> Option<ParticleRef<'_>> {
        let slot = *self.live_indices().get(live_pos)? as usize;
        let start = slot.checked_mul(self.descriptor.stride)?;
        let bytes = self.data.get(start..start + self.descriptor.stride)?;
        ParticleRef::new(bytes)
    }

    /// Iterates live particles in live-table order.
    pub fn particles(&self) -> impl Iterator<Item = ParticleRef<'_>> + '_ {
        (0..self.active_count()).filter_map(|live| self.particle(live))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{ParticleMut, HEADER_SIZE};

    fn descriptor(active_count: usize, capacity: usize) -> SnapshotDescriptor {
        SnapshotDescriptor {
            active_count,
            capacity,
            stride: HEADER_SIZE,
            kind: EmitterKind::Sprite,
            scale: Vec3::ONE,
            use_local_space: false,
            bounds: Aabb::empty(),
            type_data_offset: HEADER_SIZE,
            orbit_offset: None,
            sub_image: None,
            mesh_rotation_offset: None,
            source_link_offset: Some(HEADER_SIZE),
            max_draw_count: None,
        }
    }

    #[test]
    fn test_capture_is_independent() {
        let mut pool = ParticlePool::new(HEADER_SIZE).unwrap();
        pool.resize(4).unwrap();
        let slot = pool.acquire().unwrap();
        ParticleMut::new(pool.record_mut(slot)).unwrap().header_mut().location = Vec3::X;

        let snapshot = Snapshot::capture(&pool, descriptor(pool.active_count(), pool.capacity()));
        ParticleMut::new(pool.record_mut(slot)).unwrap().header_mut().location = Vec3::Y;

        assert_eq!(snapshot.particle(0).unwrap().header().location, Vec3::X);
        assert!(snapshot.particle(1).is_none());
        assert_eq!(snapshot.particles().count(), 1);
    }

    #[test]
    fn test_draw_counts() {
        let mut desc = descriptor(10, 16);
        assert_eq!(desc.vertex_count(), 40);
        assert_eq!(desc.index_count(), 60);

        desc.max_draw_count = Some(3);
        assert_eq!(desc.draw_count(), 3);
        assert_eq!(desc.index_count(), 18);
        assert_eq!(desc.payload_offset(PayloadTag::SourceLink), Some(HEADER_SIZE));
    }

    #[test]
    fn test_empty_snapshot() {
        let pool = ParticlePool::new(HEADER_SIZE).unwrap();
        let snapshot = Snapshot::capture(&pool, descriptor(0, 0));
        assert!(snapshot.is_empty());
        assert!(snapshot.bytes().is_empty());
        assert_eq!(snapshot.particles().count(), 0);
    }
}
