//! # CINDER Particles
//!
//! Module-driven particle emitter simulation:
//! - Variable-stride particle records planned once per template
//! - Pluggable spawn/update module stacks with sprite, sub-image and mesh type data
//! - Fractional spawn accounting reconciled with bursts
//! - Two-level LOD blending for preview tooling
//! - Chained orbit offsets and bounds integration
//! - Owned snapshots handed to a render thread by move
//!
//! ## Architecture Rules
//!
//! 1. **One writer per instance** - An emitter is ticked by exactly one thread
//! 2. **Records are planned, not declared** - Module payload offsets come from the layout planner
//! 3. **The render thread never sees the live pool** - Only [`Snapshot`]s cross threads
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cinder_particles::{EmitterConfig, EmitterInstance, EmitterTemplate, TickContext};
//!
//! let config = EmitterConfig::from_toml_file("data/emitters/sparks.toml")?;
//! let template = Arc::new(EmitterTemplate::from_config(&config)?);
//! let mut emitter = EmitterInstance::new(template, config.seed);
//! emitter.activate()?;
//!
//! loop {
//!     emitter.tick(&TickContext::new(1.0 / 60.0))?;
//!     emitter.publish_snapshot()?;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bounds;
pub mod config;
pub mod context;
pub mod distribution;
pub mod emitter;
pub mod error;
pub mod layout;
pub mod module;
pub mod orbit;
pub mod particle;
pub mod snapshot;
pub mod template;

pub use bounds::{Aabb, BOUNDS_SCALAR};
pub use config::{EmitterConfig, LodConfig, ModuleConfig, TypeDataConfig};
pub use context::{EmitterFrame, SimRng, TickContext};
pub use distribution::{CurvePoint, FloatDistribution, VectorCurvePoint, VectorDistribution};
pub use emitter::{EmitterInstance, EmitterState};
pub use error::{EmitterError, EmitterResult};
pub use layout::{EmitterLayout, LayoutPlanner, SubImageSlot};
pub use module::{
    ChainMode, EmitterKind, ModuleId, ParticleModule, PayloadTag, SpawnContext, SpawnRate,
    SubImageGrid, SubImageMethod, TypeDataModule, UpdateContext,
};
pub use particle::{ParticleHeader, ParticleMut, ParticleRef, HEADER_SIZE};
pub use snapshot::{Snapshot, SnapshotDescriptor};
pub use template::{Burst, EmitterTemplate, LodLevel, RequiredSettings};
