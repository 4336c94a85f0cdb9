//! # Particle Pool
//!
//! Variable-stride record storage with a live-index permutation table.

use bytemuck::{Pod, Zeroable};

use crate::error::{PoolError, PoolResult};

/// Alignment (and stride granularity) of every record in the pool.
pub const RECORD_ALIGNMENT: usize = 16;

/// One 16-byte aligned storage block.
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, align(16))]
struct Block([u8; RECORD_ALIGNMENT]);

/// A pool of fixed-stride particle records.
///
/// Records are raw bytes; the caller decides what lives inside them. The
/// pool owns a permutation table `indices` over `[0, capacity)`: the first
/// `active_count` entries name live slots, the rest are free.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. It is owned by the simulation thread.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = ParticlePool::new(144)?;
///
/// // Grow with slack - O(n) once, amortized by over-allocation
/// pool.reserve_for(12)?;
///
/// // Spawn - O(1), no heap allocation
/// let slot = pool.acquire().unwrap();
///
/// // Kill - O(1) swap-remove
/// pool.kill(0);
/// ```
pub struct ParticlePool {
    /// Backing storage, `capacity * stride` bytes.
    blocks: Vec<Block>,
    /// Live-index permutation table.
    indices: Vec<u32>,
    /// Bytes per record (multiple of `RECORD_ALIGNMENT`).
    stride: usize,
    /// Number of records the storage holds.
    capacity: usize,
    /// Number of live records.
    active_count: usize,
}

impl ParticlePool {
    /// Creates an empty pool. No storage is allocated until first growth.
    ///
    /// # Arguments
    ///
    /// * `stride` - Bytes per record, a non-zero multiple of 16
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidStride` for a misaligned stride.
    pub fn new(stride: usize) -> PoolResult<Self> {
        if stride == 0 || stride % RECORD_ALIGNMENT != 0 {
            return Err(PoolError::InvalidStride {
                stride,
                alignment: RECORD_ALIGNMENT,
            });
        }

        Ok(Self {
            blocks: Vec::new(),
            indices: Vec::new(),
            stride,
            capacity: 0,
            active_count: 0,
        })
    }

    /// Returns the record stride in bytes.
    #[inline]
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the total capacity in records.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of live records.
    #[inline]
    #[must_use]
    pub const fn active_count(&self) -> usize {
        self.active_count
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub const fn free_count(&self) -> usize {
        self.capacity - self.active_count
    }

    /// Returns true if no record is live.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.active_count == 0
    }

    /// Grows the pool to hold `new_capacity` records.
    ///
    /// Existing slots keep their bytes and their position in the index
    /// table. New slots are zeroed and self-mapped. Requests at or below the
    /// current capacity are ignored.
    ///
    /// # Returns
    ///
    /// `true` if the pool grew.
    ///
    /// # Errors
    ///
    /// Fails if the capacity overflows the index type or the allocator
    /// refuses the request. The pool is left unchanged on failure.
    pub fn resize(&mut self, new_capacity: usize) -> PoolResult<bool> {
        if new_capacity <= self.capacity {
            return Ok(false);
        }
        if u32::try_from(new_capacity).is_err() {
            return Err(PoolError::CapacityOverflow {
                requested: new_capacity,
            });
        }

        let blocks_per_record = self.stride / RECORD_ALIGNMENT;
        let new_blocks = new_capacity
            .checked_mul(blocks_per_record)
            .ok_or(PoolError::CapacityOverflow {
                requested: new_capacity,
            })?;
        let bytes = new_blocks
            .checked_mul(RECORD_ALIGNMENT)
            .ok_or(PoolError::CapacityOverflow {
                requested: new_capacity,
            })?;

        let extra_blocks = new_blocks - self.blocks.len();
        let extra_indices = new_capacity - self.indices.len();
        self.blocks
            .try_reserve_exact(extra_blocks)
            .map_err(|_| PoolError::AllocationFailed { bytes })?;
        self.indices
            .try_reserve_exact(extra_indices)
            .map_err(|_| PoolError::AllocationFailed {
                bytes: new_capacity * std::mem::size_of::<u32>(),
            })?;

        self.blocks.resize(new_blocks, Block::zeroed());
        // Checked above: every index fits in u32.
        #[allow(clippy::cast_possible_truncation)]
        self.indices
            .extend((self.capacity..new_capacity).map(|slot| slot as u32));
        self.capacity = new_capacity;

        Ok(true)
    }

    /// Grows the pool so that `new_count` live records fit with slack.
    ///
    /// When `new_count` reaches the capacity the pool is resized to
    /// `new_count + ceil(sqrt(new_count)) + 1`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::CapacityOverflow` if the grown capacity does not
    /// fit in `usize`, and propagates `resize` failures.
    pub fn reserve_for(&mut self, new_count: usize) -> PoolResult<bool> {
        if new_count < self.capacity {
            return Ok(false);
        }
        self.resize(Self::grown_capacity(new_count)?)
    }

    /// Capacity chosen when `count` records must fit.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::CapacityOverflow` if the slack overflows `usize`.
    pub fn grown_capacity(count: usize) -> PoolResult<usize> {
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let slack = (count as f64).sqrt().ceil() as usize;
        count
            .checked_add(slack)
            .and_then(|grown| grown.checked_add(1))
            .ok_or(PoolError::CapacityOverflow { requested: count })
    }

    /// Activates the next free slot and returns its slot index.
    ///
    /// The slot's bytes are left as they were; the caller initializes them.
    ///
    /// # Returns
    ///
    /// The slot index, or None if the pool is full.
    pub fn acquire(&mut self) -> Option<usize> {
        if self.active_count >= self.capacity {
            return None;
        }
        let slot = self.indices[self.active_count] as usize;
        self.active_count += 1;
        Some(slot)
    }

    /// Kills the record at live position `live_pos`.
    ///
    /// The index entry is swapped with the last live entry and the live
    /// count drops by one. Callers iterating the live range must walk it
    /// backward so no survivor is skipped.
    ///
    /// # Returns
    ///
    /// The slot index that was freed, or None if `live_pos` is not live.
    pub fn kill(&mut self, live_pos: usize) -> Option<usize> {
        if live_pos >= self.active_count {
            return None;
        }
        let last = self.active_count - 1;
        self.indices.swap(live_pos, last);
        self.active_count = last;
        Some(self.indices[last] as usize)
    }

    /// Kills every live record. Capacity is kept.
    #[inline]
    pub fn kill_all(&mut self) {
        self.active_count = 0;
    }

    /// Returns the slot index stored at live position `live_pos`.
    #[inline]
    #[must_use]
    pub fn slot_at(&self, live_pos: usize) -> Option<usize> {
        if live_pos < self.active_count {
            Some(self.indices[live_pos] as usize)
        } else {
            None
        }
    }

    /// Bounds-checked read of the live record at `live_pos`.
    #[must_use]
    pub fn live(&self, live_pos: usize) -> Option<&[u8]> {
        self.slot_at(live_pos).map(|slot| self.record(slot))
    }

    /// Bounds-checked write access to the live record at `live_pos`.
    pub fn live_mut(&mut self, live_pos: usize) -> Option<&mut [u8]> {
        let slot = self.slot_at(live_pos)?;
        Some(self.record_mut(slot))
    }

    /// Returns the bytes of `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= capacity`.
    #[inline]
    #[must_use]
    pub fn record(&self, slot: usize) -> &[u8] {
        let start = slot * self.stride;
        &self.as_bytes()[start..start + self.stride]
    }

    /// Returns the mutable bytes of `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= capacity`.
    #[inline]
    pub fn record_mut(&mut self, slot: usize) -> &mut [u8] {
        let start = slot * self.stride;
        let stride = self.stride;
        &mut self.as_bytes_mut()[start..start + stride]
    }

    /// The whole backing buffer, `capacity * stride` bytes, 16-byte aligned.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.blocks)
    }

    /// Mutable view of the whole backing buffer.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.blocks)
    }

    /// The live-index permutation table, `capacity` entries.
    #[inline]
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// The live prefix of the index table.
    #[inline]
    #[must_use]
    pub fn live_indices(&self) -> &[u32] {
        &self.indices[..self.active_count]
    }

    /// Checks that the index table is a bijection over `[0, capacity)`.
    #[must_use]
    pub fn is_permutation(&self) -> bool {
        if self.indices.len() != self.capacity || self.active_count > self.capacity {
            return false;
        }
        let mut seen = vec![false; self.capacity];
        for &slot in &self.indices {
            let slot = slot as usize;
            if slot >= self.capacity || seen[slot] {
                return false;
            }
            seen[slot] = true;
        }
        true
    }
}

impl std::fmt::Debug for ParticlePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticlePool")
            .field("stride", &self.stride)
            .field("capacity", &self.capacity)
            .field("active_count", &self.active_count)
            .finish_non_exhaustive()
    }
}
