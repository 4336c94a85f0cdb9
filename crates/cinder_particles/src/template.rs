//! # Emitter Templates
//!
//! Immutable emitter descriptions shared by every instance spawned from
//! them. A template holds one or more LOD levels; level 0 is the highest
//! detail and defines the record layout.

use serde::{Deserialize, Serialize};

use crate::distribution::FloatDistribution;
use crate::error::{EmitterError, EmitterResult};
use crate::module::{EmitterKind, ModuleId, ParticleModule, TypeDataModule};

/// A scheduled one-time emission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Burst {
    /// Particles to emit.
    pub count: u32,
    /// When non-zero, the count is random in `[count_low, count]`.
    #[serde(default)]
    pub count_low: u32,
    /// Emitter time at which the burst fires, in seconds.
    #[serde(default)]
    pub time: f32,
}

impl Burst {
    /// A fixed-count burst at `time`.
    #[must_use]
    pub const fn new(count: u32, time: f32) -> Self {
        Self {
            count,
            count_low: 0,
            time,
        }
    }
}

const fn default_duration() -> f32 {
    1.0
}

/// Timing and emission settings every LOD level carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequiredSettings {
    /// Loop duration in seconds (upper bound when a range is used).
    #[serde(default = "default_duration")]
    pub duration: f32,
    /// Lower bound of the duration range.
    #[serde(default)]
    pub duration_low: f32,
    /// Pick the duration uniformly in `[duration_low, duration]`.
    #[serde(default)]
    pub duration_use_range: bool,
    /// Re-pick the duration at every loop boundary.
    #[serde(default)]
    pub duration_recalc_each_loop: bool,
    /// Number of loops; zero loops forever.
    #[serde(default)]
    pub loops: u32,
    /// Start-up delay in seconds.
    #[serde(default)]
    pub delay: f32,
    /// Apply the delay to the first loop only.
    #[serde(default)]
    pub delay_first_loop_only: bool,
    /// Continuous emission rate in particles per second, over emitter time.
    #[serde(default)]
    pub spawn_rate: FloatDistribution,
    /// Scheduled emissions.
    #[serde(default)]
    pub bursts: Vec<Burst>,
    /// Particles live in the owner's space.
    #[serde(default)]
    pub use_local_space: bool,
    /// Kill every particle once the emitter completes.
    #[serde(default)]
    pub kill_on_completed: bool,
    /// Records allocated at activation; zero allocates on first demand.
    #[serde(default)]
    pub initial_allocation: usize,
    /// Upper bound on particles a renderer should draw.
    #[serde(default)]
    pub max_draw_count: Option<usize>,
}

impl Default for RequiredSettings {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            duration_low: 0.0,
            duration_use_range: false,
            duration_recalc_each_loop: false,
            loops: 0,
            delay: 0.0,
            delay_first_loop_only: false,
            spawn_rate: FloatDistribution::default(),
            bursts: Vec::new(),
            use_local_space: false,
            kill_on_completed: false,
            initial_allocation: 0,
            max_draw_count: None,
        }
    }
}

impl RequiredSettings {
    /// Settings emitting `rate` particles per second, looping forever.
    #[must_use]
    pub fn with_rate(rate: f32) -> Self {
        Self {
            spawn_rate: FloatDistribution::constant(rate),
            ..Self::default()
        }
    }
}

/// One detail level: settings, type data and the module stack.
#[derive(Debug)]
pub struct LodLevel {
    /// Timing and emission settings.
    pub required: RequiredSettings,
    type_data: Option<Box<dyn TypeDataModule>>,
    modules: Vec<Box<dyn ParticleModule>>,
    spawn_modules: Vec<ModuleId>,
    update_modules: Vec<ModuleId>,
    spawn_rate_modules: Vec<ModuleId>,
    orbit_modules: Vec<ModuleId>,
}

impl LodLevel {
    /// A sprite level with an empty stack.
    #[must_use]
    pub fn new(required: RequiredSettings) -> Self {
        Self::from_parts(required, None, Vec::new())
    }

    /// Builds a level from its parts.
    #[must_use]
    pub fn from_parts(
        required: RequiredSettings,
        type_data: Option<Box<dyn TypeDataModule>>,
        modules: Vec<Box<dyn ParticleModule>>,
    ) -> Self {
        let mut level = Self {
            required,
            type_data,
            modules,
            spawn_modules: Vec::new(),
            update_modules: Vec::new(),
            spawn_rate_modules: Vec::new(),
            orbit_modules: Vec::new(),
        };
        level.cache_module_lists();
        level
    }

    /// Sets the type-data module.
    #[must_use]
    pub fn with_type_data(mut self, type_data: impl TypeDataModule + 'static) -> Self {
        self.type_data = Some(Box::new(type_data));
        self
    }

    /// Appends a module to the stack.
    #[must_use]
    pub fn with_module(mut self, module: impl ParticleModule + 'static) -> Self {
        self.modules.push(Box::new(module));
        self.cache_module_lists();
        self
    }

    fn cache_module_lists(&mut self) {
        self.spawn_modules.clear();
        self.update_modules.clear();
        self.spawn_rate_modules.clear();
        self.orbit_modules.clear();
        for (position, module) in self.modules.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let id = ModuleId(position as u16);
            if module.spawns() {
                self.spawn_modules.push(id);
            }
            if module.updates() {
                self.update_modules.push(id);
            }
            if module.provides_spawn_rate() {
                self.spawn_rate_modules.push(id);
            }
            if module.chain_mode().is_some() {
                self.orbit_modules.push(id);
            }
        }
    }

    /// The type-data module, if any.
    #[inline]
    #[must_use]
    pub fn type_data(&self) -> Option<&dyn TypeDataModule> {
        self.type_data.as_deref()
    }

    /// The rendering kind; levels without type data render sprites.
    #[must_use]
    pub fn kind(&self) -> EmitterKind {
        self.type_data().map_or(EmitterKind::Sprite, |td| td.kind())
    }

    /// The module stack in order.
    #[inline]
    #[must_use]
    pub fn modules(&self) -> &[Box<dyn ParticleModule>] {
        &self.modules
    }

    /// The module at stack position `id`.
    #[inline]
    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&dyn ParticleModule> {
        self.modules.get(id.index()).map(|module| &**module)
    }

    /// Modules with a spawn hook, in stack order.
    #[inline]
    #[must_use]
    pub fn spawn_modules(&self) -> &[ModuleId] {
        &self.spawn_modules
    }

    /// Modules with an update hook, in stack order.
    #[inline]
    #[must_use]
    pub fn update_modules(&self) -> &[ModuleId] {
        &self.update_modules
    }

    /// Modules contributing a spawn rate, in stack order.
    #[inline]
    #[must_use]
    pub fn spawn_rate_modules(&self) -> &[ModuleId] {
        &self.spawn_rate_modules
    }

    /// Orbit modules, in stack order.
    #[inline]
    #[must_use]
    pub fn orbit_modules(&self) -> &[ModuleId] {
        &self.orbit_modules
    }

    /// Checks that `other` can share this level's record layout and be
    /// blended with it.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::LodMismatch` naming the first difference.
    pub fn check_compatible(&self, other: &Self, high: usize, low: usize) -> EmitterResult<()> {
        let mismatch = |reason: String| EmitterError::LodMismatch { high, low, reason };

        if self.modules.len() != other.modules.len() {
            return Err(mismatch(format!(
                "module count {} vs {}",
                self.modules.len(),
                other.modules.len()
            )));
        }
        match (self.type_data(), other.type_data()) {
            (None, None) => {}
            (Some(a), Some(b)) => {
                if a.kind() != b.kind() {
                    return Err(mismatch(format!("type data {:?} vs {:?}", a.kind(), b.kind())));
                }
                if a.required_bytes() != b.required_bytes()
                    || a.sub_image().map(|g| g.payload_bytes()) != b.sub_image().map(|g| g.payload_bytes())
                {
                    return Err(mismatch("type data payload size differs".to_string()));
                }
            }
            _ => return Err(mismatch("type data present on one level only".to_string())),
        }
        for (position, (a, b)) in self.modules.iter().zip(&other.modules).enumerate() {
            if a.required_bytes() != b.required_bytes()
                || a.required_bytes_per_instance() != b.required_bytes_per_instance()
            {
                return Err(mismatch(format!(
                    "module {position} ({} vs {}) reserves different bytes",
                    a.name(),
                    b.name()
                )));
            }
        }
        Ok(())
    }
}

/// A named emitter description with one or more LOD levels.
#[derive(Debug)]
pub struct EmitterTemplate {
    name: String,
    lods: Vec<LodLevel>,
}

impl EmitterTemplate {
    /// Creates a template.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::NoLodLevels` if `lods` is empty.
    pub fn new(name: impl Into<String>, lods: Vec<LodLevel>) -> EmitterResult<Self> {
        let name = name.into();
        if lods.is_empty() {
            return Err(EmitterError::NoLodLevels(name));
        }
        Ok(Self { name, lods })
    }

    /// A template with a single level.
    #[must_use]
    pub fn single(name: impl Into<String>, level: LodLevel) -> Self {
        Self {
            name: name.into(),
            lods: vec![level],
        }
    }

    /// Template name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of LOD levels.
    #[inline]
    #[must_use]
    pub fn lod_count(&self) -> usize {
        self.lods.len()
    }

    /// The level at `index`.
    #[inline]
    #[must_use]
    pub fn lod(&self, index: usize) -> Option<&LodLevel> {
        self.lods.get(index)
    }

    /// The level at `index`, or `EmitterError::InvalidLod`.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::InvalidLod` if `index` is out of range.
    pub fn lod_checked(&self, index: usize) -> EmitterResult<&LodLevel> {
        self.lods.get(index).ok_or(EmitterError::InvalidLod {
            level: index,
            count: self.lods.len(),
        })
    }

    /// The highest-detail level.
    #[inline]
    #[must_use]
    pub fn highest(&self) -> &LodLevel {
        &self.lods[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::VectorDistribution;
    use crate::module::{
        AccelerationModule, ChainMode, LifetimeModule, MeshTypeData, OrbitModule, SpawnPerUnitModule,
        SpriteTypeData,
    };
    use glam::Vec3;

    fn level() -> LodLevel {
        LodLevel::new(RequiredSettings::with_rate(10.0))
            .with_module(LifetimeModule::new(FloatDistribution::constant(1.0)))
            .with_module(SpawnPerUnitModule::new(2.0))
            .with_module(OrbitModule::new(Vec3::X, ChainMode::Link))
            .with_module(AccelerationModule::new(VectorDistribution::default()))
    }

    #[test]
    fn test_module_lists_are_cached() {
        let level = level();
        assert_eq!(level.spawn_modules(), &[ModuleId(0), ModuleId(2), ModuleId(3)]);
        assert_eq!(level.update_modules(), &[ModuleId(3)]);
        assert_eq!(level.spawn_rate_modules(), &[ModuleId(1)]);
        assert_eq!(level.orbit_modules(), &[ModuleId(2)]);
        assert_eq!(level.kind(), EmitterKind::Sprite);
    }

    #[test]
    fn test_empty_template_rejected() {
        assert!(matches!(
            EmitterTemplate::new("empty", Vec::new()),
            Err(EmitterError::NoLodLevels(_))
        ));
    }

    #[test]
    fn test_lod_compatibility() {
        assert!(level().check_compatible(&level(), 0, 1).is_ok());

        let shorter = LodLevel::new(RequiredSettings::default())
            .with_module(LifetimeModule::new(FloatDistribution::constant(1.0)));
        assert!(matches!(
            level().check_compatible(&shorter, 0, 1),
            Err(EmitterError::LodMismatch { high: 0, low: 1, .. })
        ));

        let sprite = LodLevel::new(RequiredSettings::default()).with_type_data(SpriteTypeData::default());
        let mesh = LodLevel::new(RequiredSettings::default()).with_type_data(MeshTypeData::default());
        assert!(sprite.check_compatible(&mesh, 0, 1).is_err());
    }

    #[test]
    fn test_lod_lookup() {
        let template = EmitterTemplate::new("t", vec![level(), level()]).unwrap();
        assert_eq!(template.lod_count(), 2);
        assert!(template.lod(1).is_some());
        assert!(matches!(
            template.lod_checked(2),
            Err(EmitterError::InvalidLod { level: 2, count: 2 })
        ));
    }
}
