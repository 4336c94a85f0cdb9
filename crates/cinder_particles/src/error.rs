//! # Emitter Error Types
//!
//! All errors that can occur while building or simulating an emitter.

use cinder_core::PoolError;
use thiserror::Error;

use crate::emitter::EmitterState;

/// Errors that can occur in the particle system.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmitterError {
    /// A module reported a byte requirement the layout cannot honor.
    #[error("module {module} at stack position {position} requests {bytes} bytes per {scope}, not a multiple of 4")]
    MisalignedModuleBytes {
        /// Module name.
        module: &'static str,
        /// Position in the module stack.
        position: usize,
        /// Requested bytes.
        bytes: usize,
        /// "particle" or "instance".
        scope: &'static str,
    },

    /// The template has no LOD levels.
    #[error("emitter template {0:?} has no LOD levels")]
    NoLodLevels(String),

    /// A LOD index is out of range.
    #[error("LOD level {level} out of range (template has {count})")]
    InvalidLod {
        /// Requested level.
        level: usize,
        /// Number of levels.
        count: usize,
    },

    /// Two LOD levels do not share one layout.
    #[error("LOD levels {high} and {low} are structurally different: {reason}")]
    LodMismatch {
        /// First level.
        high: usize,
        /// Second level.
        low: usize,
        /// What differs.
        reason: String,
    },

    /// An operation was attempted in the wrong lifecycle state.
    #[error("cannot {operation} an emitter in state {state:?}")]
    InvalidState {
        /// What was attempted.
        operation: &'static str,
        /// Current state.
        state: EmitterState,
    },

    /// Particle storage could not be sized.
    #[error("particle storage: {0}")]
    Pool(#[from] PoolError),

    /// Configuration file could not be read.
    #[error("failed to read config {path}: {reason}")]
    ConfigIo {
        /// File path.
        path: String,
        /// IO error text.
        reason: String,
    },

    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for emitter operations.
pub type EmitterResult<T> = Result<T, EmitterError>;
