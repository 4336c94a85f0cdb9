//! # Particle Records
//!
//! Every particle is a fixed 128-byte header followed by module payloads.
//!
//! ## Memory Layout
//!
//! ```text
//! offset   0  old_location.xyz   relative_time
//! offset  16  location.xyz       one_over_max_lifetime
//! offset  32  base_velocity.xyz  rotation
//! offset  48  velocity.xyz       base_rotation_rate
//! offset  64  base_size.xyz      rotation_rate
//! offset  80  size.xyz           flags
//! offset  96  color.rgba
//! offset 112  base_color.rgba
//! offset 128  type-data payload, module payloads, emitter payloads
//! ```

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Size of [`ParticleHeader`] in bytes.
pub const HEADER_SIZE: usize = 128;

/// Particle state flags stored in [`ParticleHeader::flags`].
pub mod flags {
    /// Skip every per-frame integration and module update.
    pub const FREEZE: u32 = 0x1;
    /// Collision modules ignore this particle.
    pub const IGNORE_COLLISIONS: u32 = 0x2;
    /// Position is not integrated.
    pub const FREEZE_TRANSLATION: u32 = 0x4;
    /// Rotation is not integrated.
    pub const FREEZE_ROTATION: u32 = 0x8;
    /// Collision checks are postponed for this particle.
    pub const DELAY_COLLISIONS: u32 = 0x10;
}

/// The fixed header at the start of every particle record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ParticleHeader {
    /// Position at the start of the previous integration.
    pub old_location: Vec3,
    /// Fraction of lifetime elapsed; the particle dies above 1.0.
    pub relative_time: f32,
    /// Current position.
    pub location: Vec3,
    /// Inverse lifetime; zero means immortal.
    pub one_over_max_lifetime: f32,
    /// Velocity restored every tick before module updates.
    pub base_velocity: Vec3,
    /// Rotation in radians.
    pub rotation: f32,
    /// Velocity after module updates.
    pub velocity: Vec3,
    /// Rotation rate restored every tick.
    pub base_rotation_rate: f32,
    /// Size restored every tick.
    pub base_size: Vec3,
    /// Rotation rate after module updates, radians per second.
    pub rotation_rate: f32,
    /// Size after module updates.
    pub size: Vec3,
    /// State flags, see [`flags`].
    pub flags: u32,
    /// Color after module updates.
    pub color: Vec4,
    /// Color restored every tick.
    pub base_color: Vec4,
}

const _: () = assert!(std::mem::size_of::<ParticleHeader>() == HEADER_SIZE);

impl ParticleHeader {
    /// Returns true if every bit of `flag` is set.
    #[inline]
    #[must_use]
    pub const fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag == flag
    }

    /// Returns true if the particle is fully frozen.
    #[inline]
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.has_flag(flags::FREEZE)
    }

    /// Restores the transient fields from their base values and ages the
    /// particle by `dt`.
    #[inline]
    pub fn reset_transients(&mut self, dt: f32) {
        self.velocity = self.base_velocity;
        self.size = self.base_size;
        self.rotation_rate = self.base_rotation_rate;
        self.color = self.base_color;
        self.relative_time += self.one_over_max_lifetime * dt;
    }
}

/// Orbit chain state of one orbit module for one particle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct OrbitPayload {
    /// Offset chosen at spawn.
    pub base_offset: Vec3,
    /// Offset for this tick; the last module in a chain holds the resolved total.
    pub offset: Vec3,
    /// Accumulated rotation in turns.
    pub rotation: Vec3,
    /// Rotation rate chosen at spawn, turns per second.
    pub base_rotation_rate: Vec3,
    /// Rotation rate for this tick.
    pub rotation_rate: Vec3,
    /// Offset of the previous tick.
    pub previous_offset: Vec3,
}

/// Sub-image interpolation state written for sub-image emitters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct SubImagePayload {
    /// Blend factor between the current and next image.
    pub interpolation: f32,
    /// Current image column.
    pub image_h: f32,
    /// Current image row.
    pub image_v: f32,
    /// Next image column.
    pub next_image_h: f32,
    /// Next image row.
    pub next_image_v: f32,
}

/// Sub-image state for random image selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct RandomSubImagePayload {
    /// Shared sub-image fields.
    pub image: SubImagePayload,
    /// Relative time of the last random pick.
    pub random_image_time: f32,
}

/// Per-axis mesh rotation state written for mesh emitters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MeshRotationPayload {
    /// Euler rotation in degrees.
    pub rotation: Vec3,
    /// Rotation rate for this tick, degrees per second.
    pub rotation_rate: Vec3,
    /// Rotation rate restored every tick.
    pub base_rotation_rate: Vec3,
}

/// Trail linkage between consecutively spawned particles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct SourceLinkPayload {
    /// Slot of the particle spawned just before this one, or -1.
    pub previous_slot: i32,
    /// Spawn sequence number within the instance.
    pub sequence: u32,
}

/// Read-only view of one particle record.
///
/// Works over unaligned bytes, so it can read snapshot copies as well as
/// live pool records. Reads return copies.
#[derive(Clone, Copy, Debug)]
pub struct ParticleRef<'a> {
    bytes: &'a [u8],
}

impl<'a> ParticleRef<'a> {
    /// Wraps a record. Returns None if the bytes cannot hold a header.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Option<Self> {
        (bytes.len() >= HEADER_SIZE).then_some(Self { bytes })
    }

    /// Copies out the header.
    #[inline]
    #[must_use]
    pub fn header(&self) -> ParticleHeader {
        bytemuck::pod_read_unaligned(&self.bytes[..HEADER_SIZE])
    }

    /// Copies out a payload at `offset`, or None if it leaves the record.
    #[must_use]
    pub fn payload<T: Pod>(&self, offset: usize) -> Option<T> {
        let end = offset.checked_add(std::mem::size_of::<T>())?;
        self.bytes
            .get(offset..end)
            .map(bytemuck::pod_read_unaligned)
    }

    /// The raw record bytes.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Mutable view of one aligned pool record.
#[derive(Debug)]
pub struct ParticleMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> ParticleMut<'a> {
    /// Wraps a pool record.
    ///
    /// Returns None if the bytes are too short or not aligned for the header.
    #[must_use]
    pub fn new(bytes: &'a mut [u8]) -> Option<Self> {
        if bytes.len() < HEADER_SIZE
            || bytemuck::try_from_bytes::<ParticleHeader>(&bytes[..HEADER_SIZE]).is_err()
        {
            return None;
        }
        Some(Self { bytes })
    }

    /// The header.
    #[inline]
    #[must_use]
    pub fn header(&self) -> &ParticleHeader {
        bytemuck::from_bytes(&self.bytes[..HEADER_SIZE])
    }

    /// The header, mutably.
    #[inline]
    pub fn header_mut(&mut self) -> &mut ParticleHeader {
        bytemuck::from_bytes_mut(&mut self.bytes[..HEADER_SIZE])
    }

    /// The payload at `offset`, or None if it leaves the record or is
    /// misaligned.
    pub fn payload_mut<T: Pod>(&mut self, offset: usize) -> Option<&mut T> {
        let end = offset.checked_add(std::mem::size_of::<T>())?;
        let bytes = self.bytes.get_mut(offset..end)?;
        bytemuck::try_from_bytes_mut(bytes).ok()
    }

    /// Copies out the payload at `offset`.
    #[must_use]
    pub fn payload<T: Pod>(&self, offset: usize) -> Option<T> {
        let end = offset.checked_add(std::mem::size_of::<T>())?;
        self.bytes
            .get(offset..end)
            .map(bytemuck::pod_read_unaligned)
    }

    /// The header together with a payload past it.
    ///
    /// Returns None if `offset` overlaps the header, leaves the record, or is
    /// misaligned.
    pub fn split_payload_mut<T: Pod>(
        &mut self,
        offset: usize,
    ) -> Option<(&mut ParticleHeader, &mut T)> {
        if offset < HEADER_SIZE {
            return None;
        }
        let end = offset.checked_add(std::mem::size_of::<T>())?;
        if end > self.bytes.len() {
            return None;
        }
        let (head, tail) = self.bytes.split_at_mut(HEADER_SIZE);
        let range = offset - HEADER_SIZE..end - HEADER_SIZE;
        let payload = bytemuck::try_from_bytes_mut(&mut tail[range]).ok()?;
        Some((bytemuck::from_bytes_mut(head), payload))
    }

    /// Raw bytes of a payload region, or None if it leaves the record.
    pub fn payload_bytes_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        self.bytes.get_mut(offset..end)
    }

    /// Zeroes the whole record.
    #[inline]
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Read-only view of the same record.
    #[inline]
    #[must_use]
    pub fn as_view(&self) -> ParticleRef<'_> {
        ParticleRef { bytes: self.bytes }
    }
}
