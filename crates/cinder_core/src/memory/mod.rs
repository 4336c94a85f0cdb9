//! # Memory Management
//!
//! Particle storage and per-instance side buffers.
//!
//! ## Design Philosophy
//!
//! Storage is sized once per demand spike and then reused:
//! - Growth over-allocates by `ceil(sqrt(n)) + 1` records
//! - Capacity never shrinks while an instance lives
//! - Killing a particle never moves record bytes, only index entries

mod arena;
mod pool;

pub use arena::InstanceArena;
pub use pool::{ParticlePool, RECORD_ALIGNMENT};
