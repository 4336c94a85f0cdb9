//! # CINDER Core
//!
//! Memory and synchronization primitives for the particle simulation:
//! - Variable-stride particle pool with O(1) swap-remove kills
//! - Zero-filled per-instance side buffers
//! - Move-only snapshot handoff between the simulation and render threads
//!
//! ## Architecture Rules
//!
//! 1. **Records are bytes** - The pool knows strides, not particle types
//! 2. **Growth is geometric** - The pool grows with sqrt slack and never shrinks
//! 3. **No shared mutable state across threads** - Only owned values cross
//!
//! ## Example
//!
//! ```rust,ignore
//! use cinder_core::ParticlePool;
//!
//! let mut pool = ParticlePool::new(144)?;
//! pool.reserve_for(12)?;
//! let slot = pool.acquire().expect("capacity reserved");
//! pool.record_mut(slot)[0] = 1;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod memory;
pub mod sync;

pub use error::{PoolError, PoolResult};
pub use memory::{InstanceArena, ParticlePool, RECORD_ALIGNMENT};
pub use sync::{snapshot_slot, HandoffStats, PublishOutcome, SnapshotPublisher, SnapshotReceiver};
