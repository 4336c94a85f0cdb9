//! # Instance Arena
//!
//! Per-instance (not per-particle) side buffer for module-private state.

use crate::error::{PoolError, PoolResult};

/// A bump-planned, zero-filled byte buffer.
///
/// Ranges are handed out with [`InstanceArena::reserve`] while a layout is
/// being planned, then the buffer is zero-filled once by
/// [`InstanceArena::allocate`]. Offsets stay valid for the arena's lifetime.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. It belongs to one emitter instance.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena = InstanceArena::new();
/// let offset = arena.reserve(4);
/// arena.allocate()?;
///
/// arena.slice_mut(offset, 4)?.copy_from_slice(&1.0f32.to_ne_bytes());
/// ```
#[derive(Debug, Default)]
pub struct InstanceArena {
    /// The backing storage.
    storage: Vec<u8>,
    /// Bytes handed out so far.
    reserved: usize,
}

impl Clone for InstanceArena {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            reserved: self.reserved,
        }
    }

    /// Copies `source` into the existing buffer without reallocating when
    /// the sizes match.
    fn clone_from(&mut self, source: &Self) {
        self.storage.clone_from(&source.storage);
        self.reserved = source.reserved;
    }
}

impl InstanceArena {
    /// Creates an empty arena with nothing reserved.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            storage: Vec::new(),
            reserved: 0,
        }
    }

    /// Reserves `len` bytes and returns their offset.
    ///
    /// Ranges are laid out back to back in reservation order.
    ///
    /// # Arguments
    ///
    /// * `len` - Size of the range in bytes
    pub fn reserve(&mut self, len: usize) -> usize {
        let offset = self.reserved;
        self.reserved += len;
        offset
    }

    /// Returns the number of reserved bytes.
    #[inline]
    #[must_use]
    pub const fn reserved(&self) -> usize {
        self.reserved
    }

    /// Returns the allocated size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns true if nothing has been allocated.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Allocates the reserved bytes, zero-filled.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AllocationFailed` if the allocator refuses.
    pub fn allocate(&mut self) -> PoolResult<()> {
        let bytes = self.reserved;
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(bytes)
            .map_err(|_| PoolError::AllocationFailed { bytes })?;
        storage.resize(bytes, 0);
        self.storage = storage;
        Ok(())
    }

    /// Zeroes the whole buffer in place.
    #[inline]
    pub fn clear(&mut self) {
        self.storage.fill(0);
    }

    /// Bounds-checked read access to `offset..offset + len`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::OutOfBounds` if the range leaves the buffer.
    pub fn slice(&self, offset: usize, len: usize) -> PoolResult<&[u8]> {
        let end = self.check(offset, len)?;
        Ok(&self.storage[offset..end])
    }

    /// Bounds-checked write access to `offset..offset + len`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::OutOfBounds` if the range leaves the buffer.
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> PoolResult<&mut [u8]> {
        let end = self.check(offset, len)?;
        Ok(&mut self.storage[offset..end])
    }

    /// The whole buffer.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage
    }

    fn check(&self, offset: usize, len: usize) -> PoolResult<usize> {
        let end = offset.saturating_add(len);
        if end > self.storage.len() {
            return Err(PoolError::OutOfBounds {
                offset,
                end,
                len: self.storage.len(),
            });
        }
        Ok(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_reserve_is_cumulative() {
        let mut arena = InstanceArena::new();
        assert_eq!(arena.reserve(4), 0);
        assert_eq!(arena.reserve(8), 4);
        assert_eq!(arena.reserve(0), 12);
        assert_eq!(arena.reserved(), 12);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_arena_allocation_is_zeroed() {
        let mut arena = InstanceArena::new();
        let offset = arena.reserve(16);
        arena.allocate().unwrap();

        assert_eq!(arena.len(), 16);
        assert!(arena.slice(offset, 16).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_arena_bounds() {
        let mut arena = InstanceArena::new();
        let _ = arena.reserve(8);
        arena.allocate().unwrap();

        assert!(arena.slice(4, 4).is_ok());
        assert!(arena.slice(6, 4).is_err());
        assert!(arena.slice_mut(usize::MAX, 2).is_err());
    }

    #[test]
    fn test_arena_clear() {
        let mut arena = InstanceArena::new();
        let offset = arena.reserve(4);
        arena.allocate().unwrap();
        arena.slice_mut(offset, 4).unwrap().fill(7);

        arena.clear();
        assert_eq!(arena.as_bytes(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_arena_clone_from_restores_bytes() {
        let mut arena = InstanceArena::new();
        let offset = arena.reserve(4);
        arena.allocate().unwrap();
        let saved = arena.clone();

        arena.slice_mut(offset, 4).unwrap().fill(9);
        arena.clone_from(&saved);

        assert_eq!(arena.as_bytes(), &[0, 0, 0, 0]);
        assert_eq!(arena.reserved(), 4);
    }
}
