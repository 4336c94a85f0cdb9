//! # Emitter Configuration
//!
//! Emitters are described in TOML, loaded once at startup and turned into
//! immutable [`EmitterTemplate`]s.
//!
//! ## File shape
//!
//! ```toml
//! name = "sparks"
//! seed = 7
//!
//! [[lods]]
//! [lods.required]
//! duration = 2.0
//! spawn_rate = { type = "constant", value = 20.0 }
//! bursts = [{ count = 10, time = 0.0 }]
//!
//! [lods.type_data]
//! type = "sub_image"
//! horizontal = 4
//! vertical = 4
//! method = "linear_blend"
//!
//! [[lods.modules]]
//! type = "lifetime"
//! lifetime = { type = "uniform", min = 1.0, max = 2.0 }
//!
//! [[lods.modules]]
//! type = "initial_velocity"
//! start_velocity = { type = "constant", value = [0.0, 0.0, 5.0] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EmitterError, EmitterResult};
use crate::module::{
    AccelerationModule, ColorOverLifeModule, InitialColorModule, InitialLocationModule,
    InitialRotationModule, InitialRotationRateModule, InitialSizeModule, InitialVelocityModule,
    LifetimeModule, MeshRotationModule, MeshRotationRateModule, MeshTypeData, OrbitModule,
    ParticleModule, SizeByLifeModule, SourceLinkModule, SpawnPerUnitModule, SpriteTypeData,
    SubImageModule, SubImageTypeData, TypeDataModule,
};
use crate::template::{EmitterTemplate, LodLevel, RequiredSettings};

/// A whole emitter file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmitterConfig {
    /// Template name, used in logs.
    pub name: String,
    /// Default seed for instances built from this file.
    #[serde(default)]
    pub seed: u64,
    /// Detail levels, highest first.
    pub lods: Vec<LodConfig>,
}

/// One detail level.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LodConfig {
    /// Timing and emission settings.
    #[serde(default)]
    pub required: RequiredSettings,
    /// What the level renders; sprites when absent.
    #[serde(default)]
    pub type_data: Option<TypeDataConfig>,
    /// The module stack, in order.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

/// Type-data section of a level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypeDataConfig {
    /// Plain sprites.
    Sprite(SpriteTypeData),
    /// Sprites sampling a sub-image grid.
    SubImage(SubImageTypeData),
    /// Instanced meshes.
    Mesh(MeshTypeData),
}

impl TypeDataConfig {
    fn build(&self) -> Box<dyn TypeDataModule> {
        match self {
            Self::Sprite(td) => Box::new(td.clone()),
            Self::SubImage(td) => Box::new(td.clone()),
            Self::Mesh(td) => Box::new(td.clone()),
        }
    }
}

/// One entry of a module stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModuleConfig {
    /// Sets the lifetime.
    Lifetime(LifetimeModule),
    /// Offsets the spawn position.
    InitialLocation(InitialLocationModule),
    /// Sets the initial velocity.
    InitialVelocity(InitialVelocityModule),
    /// Sets the initial size.
    InitialSize(InitialSizeModule),
    /// Sets the initial color.
    InitialColor(InitialColorModule),
    /// Adds an initial rotation.
    InitialRotation(InitialRotationModule),
    /// Adds an initial rotation rate.
    InitialRotationRate(InitialRotationRateModule),
    /// Accelerates every tick.
    Acceleration(AccelerationModule),
    /// Scales size over life.
    SizeByLife(SizeByLifeModule),
    /// Colors over life.
    ColorOverLife(ColorOverLifeModule),
    /// Spawns by distance travelled.
    SpawnPerUnit(SpawnPerUnitModule),
    /// One orbit chain link.
    Orbit(OrbitModule),
    /// Trail linkage.
    SourceLink(SourceLinkModule),
    /// Initial mesh rotation.
    MeshRotation(MeshRotationModule),
    /// Initial mesh rotation rate.
    MeshRotationRate(MeshRotationRateModule),
    /// Sub-image selection.
    SubImage(SubImageModule),
}

impl ModuleConfig {
    fn build(&self) -> Box<dyn ParticleModule> {
        match self {
            Self::Lifetime(m) => Box::new(m.clone()),
            Self::InitialLocation(m) => Box::new(m.clone()),
            Self::InitialVelocity(m) => Box::new(m.clone()),
            Self::InitialSize(m) => Box::new(m.clone()),
            Self::InitialColor(m) => Box::new(m.clone()),
            Self::InitialRotation(m) => Box::new(m.clone()),
            Self::InitialRotationRate(m) => Box::new(m.clone()),
            Self::Acceleration(m) => Box::new(m.clone()),
            Self::SizeByLife(m) => Box::new(m.clone()),
            Self::ColorOverLife(m) => Box::new(m.clone()),
            Self::SpawnPerUnit(m) => Box::new(m.clone()),
            Self::Orbit(m) => Box::new(m.clone()),
            Self::SourceLink(m) => Box::new(m.clone()),
            Self::MeshRotation(m) => Box::new(m.clone()),
            Self::MeshRotationRate(m) => Box::new(m.clone()),
            Self::SubImage(m) => Box::new(m.clone()),
        }
    }
}

impl EmitterConfig {
    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::InvalidConfig` with the parser's message.
    pub fn from_toml_str(text: &str) -> EmitterResult<Self> {
        toml::from_str(text).map_err(|e| EmitterError::InvalidConfig(e.to_string()))
    }

    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::ConfigIo` if the file cannot be read, or
    /// `EmitterError::InvalidConfig` if it does not parse.
    pub fn from_toml_file(path: impl AsRef<Path>) -> EmitterResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| EmitterError::ConfigIo {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(
            path = %path.display(),
            emitter = config.name.as_str(),
            lods = config.lods.len(),
            "Loaded emitter config"
        );
        Ok(config)
    }

    /// Serializes back to TOML.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::InvalidConfig` if a value has no TOML form.
    pub fn to_toml_string(&self) -> EmitterResult<String> {
        toml::to_string(self).map_err(|e| EmitterError::InvalidConfig(e.to_string()))
    }
}

impl LodConfig {
    /// Builds the runtime level.
    #[must_use]
    pub fn build(&self) -> LodLevel {
        LodLevel::from_parts(
            self.required.clone(),
            self.type_data.as_ref().map(TypeDataConfig::build),
            self.modules.iter().map(ModuleConfig::build).collect(),
        )
    }
}

impl EmitterTemplate {
    /// Builds a template from a parsed config.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::NoLodLevels` if the config has no levels.
    pub fn from_config(config: &EmitterConfig) -> EmitterResult<Self> {
        Self::new(
            config.name.clone(),
            config.lods.iter().map(LodConfig::build).collect(),
        )
    }
}
