//! # Snapshot Handoff Between Simulation and Render Threads
//!
//! ARCHITECT'S ORDER: The render thread never sees the live pool.
//!
//! ## The Problem
//!
//! ```text
//! Thread 1 (Simulation):  MUTATE the particle pool every tick
//! Thread 2 (Render):      READ particle state for drawing
//!
//! Shared pool:            TORN RECORDS → GARBAGE VERTICES
//! Lock around the pool:   RENDER STALLS THE SIMULATION
//! ```
//!
//! ## The Solution: Move-Only Handoff
//!
//! ```text
//! Tick N:
//!   Simulation copies the pool into an owned Snapshot
//!   Snapshot is MOVED into a one-element slot (older one is replaced)
//!
//! Render:
//!   Takes the newest Snapshot when one is ready
//!   Keeps drawing its current one otherwise
//! ```
//!
//! No shared mutable memory. The producer never waits for the consumer.

mod handoff;

pub use handoff::{snapshot_slot, HandoffStats, PublishOutcome, SnapshotPublisher, SnapshotReceiver};
