//! # Emitter Instances
//!
//! One running simulation of a particle stream.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──initialize──▶ Initialized ──activate──▶ Active ──▶ Completed
//!       │                                                  ▲            │
//!       └──────────────────────activate────────────────────┘◀─activate──┘
//!                                   any state ──destroy──▶ Destroyed
//! ```
//!
//! ## Tick Order
//!
//! 1. Advance the clock, subtract the delay
//! 2. Kill expired particles (last to first)
//! 3. Spawn (rate + bursts)
//! 4. Reset transient fields from their base values
//! 5. Type-data pre-update, stack updates, type-data update and post-update
//! 6. Resolve orbit chains, integrate and bound
//! 7. Add the delay back
//!
//! The spawn plan and any pool growth are settled before step 2 mutates the
//! pool. If growth fails the instance is rolled back to where it stood
//! before the tick and the error is returned.

mod clock;
mod lod;
mod spawn;

use std::fmt;
use std::sync::Arc;

use cinder_core::{InstanceArena, ParticlePool, PublishOutcome, SnapshotPublisher};
use glam::{Mat4, Vec3};
use rand::SeedableRng;
use tracing::{debug, info, warn};

use self::clock::EmitterClock;
use self::lod::{instance_bytes, Dispatch};
use crate::bounds::{Aabb, BoundsPass};
use crate::context::{EmitterFrame, SimRng, TickContext};
use crate::error::{EmitterError, EmitterResult};
use crate::layout::{EmitterLayout, LayoutPlanner};
use crate::module::{PayloadTag, TypeDataModule, UpdateContext};
use crate::orbit::{self, OrbitLink};
use crate::particle::{ParticleMut, ParticleRef};
use crate::snapshot::{Snapshot, SnapshotDescriptor};
use crate::template::{EmitterTemplate, LodLevel};

/// Lifecycle state of an [`EmitterInstance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EmitterState {
    /// Created; no storage planned yet.
    Uninitialized,
    /// Layout planned and storage allocated; not yet ticking.
    Initialized,
    /// Ticking.
    Active,
    /// Finite loops spent and no particle left.
    Completed,
    /// Storage freed. Terminal.
    Destroyed,
}

/// Storage owned by an initialized instance.
struct Storage {
    layout: EmitterLayout,
    pool: ParticlePool,
    arena: InstanceArena,
    checkpoint: Checkpoint,
}

/// Instance state as it stood before the current tick.
///
/// Buffers are reused from tick to tick.
struct Checkpoint {
    clock: EmitterClock,
    rng: SimRng,
    arena: InstanceArena,
    leftover: f32,
    location: Vec3,
    old_location: Vec3,
    local_to_world: Mat4,
    scale: Vec3,
}

impl Checkpoint {
    fn capture(instance: &EmitterInstance, arena: &InstanceArena) -> Self {
        Self {
            clock: instance.clock.clone(),
            rng: instance.rng.clone(),
            arena: arena.clone(),
            leftover: instance.leftover,
            location: instance.location,
            old_location: instance.old_location,
            local_to_world: instance.local_to_world,
            scale: instance.scale,
        }
    }

    fn save(&mut self, instance: &EmitterInstance, arena: &InstanceArena) {
        self.clock.clone_from(&instance.clock);
        self.rng.clone_from(&instance.rng);
        self.arena.clone_from(arena);
        self.leftover = instance.leftover;
        self.location = instance.location;
        self.old_location = instance.old_location;
        self.local_to_world = instance.local_to_world;
        self.scale = instance.scale;
    }

    fn restore(&self, instance: &mut EmitterInstance, arena: &mut InstanceArena) {
        instance.clock.clone_from(&self.clock);
        instance.rng.clone_from(&self.rng);
        arena.clone_from(&self.arena);
        instance.leftover = self.leftover;
        instance.location = self.location;
        instance.old_location = self.old_location;
        instance.local_to_world = self.local_to_world;
        instance.scale = self.scale;
    }
}

/// One running simulation of a template.
///
/// # Thread Safety
///
/// An instance is driven by one simulation thread. The render thread only
/// sees [`Snapshot`]s moved to it through an attached publisher.
///
/// # Example
///
/// ```rust,ignore
/// let template = Arc::new(EmitterTemplate::single("sparks", level));
/// let mut emitter = EmitterInstance::new(template, 7);
/// emitter.activate()?;
///
/// let ctx = TickContext::new(1.0 / 60.0);
/// emitter.tick(&ctx)?;
/// let snapshot = emitter.snapshot()?;
/// ```
pub struct EmitterInstance {
    template: Arc<EmitterTemplate>,
    state: EmitterState,
    lod: usize,
    rng: SimRng,
    clock: EmitterClock,
    storage: Option<Storage>,
    /// Anchor this tick and last tick.
    location: Vec3,
    old_location: Vec3,
    local_to_world: Mat4,
    scale: Vec3,
    leftover: f32,
    peak_active: usize,
    bounds: Aabb,
    publisher: Option<SnapshotPublisher<Snapshot>>,
}

impl EmitterInstance {
    /// Creates an uninitialized instance of `template`.
    ///
    /// `seed` drives every random choice the instance makes.
    #[must_use]
    pub fn new(template: Arc<EmitterTemplate>, seed: u64) -> Self {
        let mut rng = SimRng::seed_from_u64(seed);
        let clock = EmitterClock::new(&template, &mut rng);
        Self {
            template,
            state: EmitterState::Uninitialized,
            lod: 0,
            rng,
            clock,
            storage: None,
            location: Vec3::ZERO,
            old_location: Vec3::ZERO,
            local_to_world: Mat4::IDENTITY,
            scale: Vec3::ONE,
            leftover: 0.0,
            peak_active: 0,
            bounds: Aabb::empty(),
            publisher: None,
        }
    }

    /// Plans the layout and allocates the instance buffer.
    ///
    /// Every LOD level is checked against level 0, which defines the layout.
    /// Initializing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::LodMismatch` or `EmitterError::MisalignedModuleBytes`
    /// for a template that cannot be simulated, pool errors if storage cannot
    /// be created, and `EmitterError::InvalidState` after destruction.
    pub fn initialize(&mut self) -> EmitterResult<()> {
        match self.state {
            EmitterState::Uninitialized => {}
            EmitterState::Destroyed => return Err(self.invalid("initialize")),
            _ => return Ok(()),
        }

        let highest = self.template.highest();
        for index in 1..self.template.lod_count() {
            let level = self.template.lod_checked(index)?;
            highest.check_compatible(level, 0, index)?;
        }

        let (layout, arena) = LayoutPlanner::plan(highest.type_data(), highest.modules())?;
        let pool = ParticlePool::new(layout.stride)?;

        info!(
            emitter = self.template.name(),
            stride = layout.stride,
            instance_bytes = layout.instance_bytes,
            lods = self.template.lod_count(),
            "Emitter initialized"
        );

        let checkpoint = Checkpoint::capture(self, &arena);
        self.storage = Some(Storage {
            layout,
            pool,
            arena,
            checkpoint,
        });
        self.state = EmitterState::Initialized;
        Ok(())
    }

    /// Starts ticking, initializing first if needed.
    ///
    /// A completed instance is rewound. The pool is pre-sized to the current
    /// level's `initial_allocation`.
    ///
    /// # Errors
    ///
    /// Propagates initialization errors; `EmitterError::InvalidState` after
    /// destruction.
    pub fn activate(&mut self) -> EmitterResult<()> {
        match self.state {
            EmitterState::Destroyed => return Err(self.invalid("activate")),
            EmitterState::Uninitialized => self.initialize()?,
            EmitterState::Completed => self.rewind(),
            EmitterState::Initialized | EmitterState::Active => {}
        }

        let initial = self.level().required.initial_allocation;
        if initial > 0 {
            if let Some(storage) = self.storage.as_mut() {
                storage.pool.resize(initial)?;
            }
        }

        self.state = EmitterState::Active;
        info!(emitter = self.template.name(), lod = self.lod, "Emitter activated");
        Ok(())
    }

    /// Advances the simulation by `ctx.delta_time` on the current LOD level.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::InvalidState` unless the instance is active, or
    /// a pool error if growing storage fails.
    pub fn tick(&mut self, ctx: &TickContext) -> EmitterResult<()> {
        self.ensure_active("tick")?;
        let template = Arc::clone(&self.template);
        let level = template.lod_checked(self.lod)?;
        self.tick_with(
            Dispatch::Single {
                level,
                index: self.lod,
            },
            ctx,
        )
    }

    /// Advances the simulation driving two LOD levels blended by `weight`.
    ///
    /// `weight` is the share of `high`. A weight of 1 or more runs `high`
    /// alone; 0 or less runs `low` alone.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::InvalidLod` for a bad index,
    /// `EmitterError::LodMismatch` if the levels differ in structure, and the
    /// errors of [`Self::tick`].
    pub fn tick_blended(
        &mut self,
        high: usize,
        low: usize,
        weight: f32,
        ctx: &TickContext,
    ) -> EmitterResult<()> {
        self.ensure_active("tick")?;
        let template = Arc::clone(&self.template);
        let high_level = template.lod_checked(high)?;
        let low_level = template.lod_checked(low)?;
        high_level.check_compatible(low_level, high, low)?;

        let dispatch = if high == low || weight >= 1.0 || weight.is_nan() {
            Dispatch::Single {
                level: high_level,
                index: high,
            }
        } else if weight <= 0.0 {
            Dispatch::Single {
                level: low_level,
                index: low,
            }
        } else {
            Dispatch::Blended {
                high: high_level,
                low: low_level,
                high_index: high,
                low_index: low,
                weight,
            }
        };
        self.tick_with(dispatch, ctx)
    }

    /// Ticks repeatedly with warm-up contexts until `seconds` have passed.
    ///
    /// Warm-up ticks simulate normally but leave the bounds untouched.
    ///
    /// # Errors
    ///
    /// Returns the first tick error.
    pub fn warm_up(&mut self, seconds: f32, step: f32, ctx: &TickContext) -> EmitterResult<()> {
        if step <= 0.0 {
            return Ok(());
        }
        let mut remaining = seconds;
        while remaining > 0.0 {
            let dt = step.min(remaining);
            let warm = TickContext {
                delta_time: dt,
                ..ctx.warming_up()
            };
            self.tick(&warm)?;
            remaining -= dt;
        }
        debug!(emitter = self.template.name(), seconds, "Emitter warmed up");
        Ok(())
    }

    fn tick_with(&mut self, dispatch: Dispatch<'_>, ctx: &TickContext) -> EmitterResult<()> {
        let Some(mut storage) = self.storage.take() else {
            return Err(self.invalid("tick"));
        };
        let result = self.run_tick(&mut storage, dispatch, ctx);
        self.storage = Some(storage);
        result
    }

    fn run_tick(
        &mut self,
        storage: &mut Storage,
        dispatch: Dispatch<'_>,
        ctx: &TickContext,
    ) -> EmitterResult<()> {
        let dt = ctx.delta_time;
        let primary = dispatch.primary();
        let required = &primary.required;
        let timing = dispatch.timing_index();

        storage.checkpoint.save(self, &storage.arena);

        if ctx.just_attached {
            self.location = ctx.location();
            self.old_location = self.location;
        } else {
            self.old_location = self.location;
            self.location = ctx.location();
        }
        self.local_to_world = ctx.local_to_world;
        self.scale = ctx.scale;

        let first_time = self.clock.advance(&self.template, timing, dt, &mut self.rng);
        let delay = self.clock.delay(required);
        self.clock.emitter_time -= delay;

        let frame = self.frame(dt, required.use_local_space);
        let mut plan = None;
        if !ctx.suppress_spawning && self.clock.may_spawn(required, timing, first_time) {
            let survivors = storage.pool.active_count() - expired_count(&storage.pool);
            match self.plan_spawns(storage, dispatch, &frame, dt, survivors) {
                Ok((planned, leftover)) => {
                    plan = planned;
                    self.leftover = leftover;
                }
                Err(error) => {
                    storage.checkpoint.restore(self, &mut storage.arena);
                    warn!(
                        emitter = self.template.name(),
                        error = %error,
                        "Tick failed, instance rolled back"
                    );
                    return Err(error);
                }
            }
        }

        kill_expired(storage, dispatch.type_data());
        if let Some(plan) = plan {
            spawn::spawn_particles(storage, &mut self.rng, &frame, dispatch, plan);
        }

        let links = orbit_links(primary, &storage.layout);
        reset_parameters(&mut storage.pool, &links, dt);
        update_modules(storage, &mut self.rng, &frame, dispatch, dt);
        orbit::resolve_pool(&mut storage.pool, &links, dt);

        let bounds = BoundsPass {
            dt,
            scale: self.scale,
            warming_up: ctx.warming_up,
            use_local_space: required.use_local_space,
            local_to_world: self.local_to_world,
            orbit_offset: links.last().map(|link| link.offset),
            type_data: dispatch.type_data(),
        }
        .run(&mut storage.pool);
        if !ctx.warming_up {
            self.bounds = bounds;
        }

        self.clock.emitter_time += delay;

        if self.clock.loops_exhausted(required, timing) {
            if required.kill_on_completed && !storage.pool.is_empty() {
                debug!(
                    emitter = self.template.name(),
                    killed = storage.pool.active_count(),
                    "Killing particles on completion"
                );
                storage.pool.kill_all();
            }
            if storage.pool.is_empty() {
                self.state = EmitterState::Completed;
                info!(
                    emitter = self.template.name(),
                    loops = self.clock.loop_count,
                    "Emitter completed"
                );
            }
        }
        Ok(())
    }

    fn frame(&self, dt: f32, use_local_space: bool) -> EmitterFrame {
        EmitterFrame {
            emitter_time: self.clock.emitter_time,
            delta_time: dt,
            location: self.location,
            old_location: self.old_location,
            local_to_world: self.local_to_world,
            use_local_space,
        }
    }

    /// Resets the clock to the start of the first loop.
    ///
    /// Live particles are kept.
    pub fn rewind(&mut self) {
        self.clock.rewind();
        self.leftover = 0.0;
        if self.state == EmitterState::Completed {
            self.state = EmitterState::Active;
        }
        debug!(emitter = self.template.name(), "Emitter rewound");
    }

    /// True once finite loops are spent and no particle is live.
    #[must_use]
    pub fn has_completed(&self) -> bool {
        self.clock.loops_exhausted(&self.level().required, self.lod) && self.active_count() == 0
    }

    /// Switches the level driving [`Self::tick`].
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::InvalidLod` if `index` is out of range.
    pub fn set_lod(&mut self, index: usize) -> EmitterResult<()> {
        self.template.lod_checked(index)?;
        if index != self.lod {
            debug!(emitter = self.template.name(), from = self.lod, to = index, "LOD changed");
            self.lod = index;
        }
        Ok(())
    }

    /// Grows the pool to at least `capacity` records.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::InvalidState` before initialization or after
    /// destruction, or a pool error.
    pub fn resize(&mut self, capacity: usize) -> EmitterResult<bool> {
        let Some(storage) = self.storage.as_mut() else {
            return Err(self.invalid("resize"));
        };
        Ok(storage.pool.resize(capacity)?)
    }

    /// Kills the particle at live position `live_pos`.
    ///
    /// The last live particle takes its position. Returns false if no
    /// particle lives there.
    pub fn kill_particle(&mut self, live_pos: usize) -> bool {
        let template = Arc::clone(&self.template);
        let type_data = template.lod(self.lod).and_then(LodLevel::type_data);
        let Some(storage) = self.storage.as_mut() else {
            return false;
        };
        if live_pos >= storage.pool.active_count() {
            return false;
        }
        if let Some(td) = type_data {
            if let Some(mut particle) = storage.pool.live_mut(live_pos).and_then(ParticleMut::new) {
                td.on_kill(&mut particle, &storage.layout);
            }
        }
        storage.pool.kill(live_pos).is_some()
    }

    /// Kills every live particle. Capacity is kept.
    pub fn kill_particles_forced(&mut self) {
        if let Some(storage) = self.storage.as_mut() {
            storage.pool.kill_all();
        }
    }

    /// The live particle at `live_pos`.
    #[must_use]
    pub fn particle(&self, live_pos: usize) -> Option<ParticleRef<'_>> {
        self.storage
            .as_ref()?
            .pool
            .live(live_pos)
            .and_then(ParticleRef::new)
    }

    /// Mutable access to the live particle at `live_pos`.
    pub fn particle_mut(&mut self, live_pos: usize) -> Option<ParticleMut<'_>> {
        self.storage
            .as_mut()?
            .pool
            .live_mut(live_pos)
            .and_then(ParticleMut::new)
    }

    /// Slot indices of live particles, in live order.
    #[must_use]
    pub fn live_indices(&self) -> &[u32] {
        self.storage
            .as_ref()
            .map_or(&[], |storage| storage.pool.live_indices())
    }

    /// True if the live-index table is a valid permutation.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.storage
            .as_ref()
            .map_or(true, |storage| storage.pool.is_permutation())
    }

    /// Hands snapshots to the consumer behind `publisher`.
    ///
    /// A previously attached publisher is closed.
    pub fn attach_publisher(&mut self, publisher: SnapshotPublisher<Snapshot>) {
        if let Some(previous) = self.publisher.replace(publisher) {
            let _ = previous.close();
        }
    }

    /// Copies the current state into an owned snapshot.
    ///
    /// # Errors
    ///
    /// Returns `EmitterError::InvalidState` before initialization or after
    /// destruction.
    pub fn snapshot(&self) -> EmitterResult<Snapshot> {
        let Some(storage) = self.storage.as_ref() else {
            return Err(self.invalid("snapshot"));
        };
        let level = self.level();
        let layout = &storage.layout;

        let orbit_offset = orbit_links(level, layout).last().map(|link| link.offset);
        let source_link_offset = level
            .modules()
            .iter()
            .enumerate()
            .find(|(_, module)| module.payload_tag() == Some(PayloadTag::SourceLink))
            .and_then(|(position, _)| u16::try_from(position).ok())
            .map(crate::module::ModuleId)
            .filter(|&id| layout.has_payload(id))
            .map(|id| layout.module_offset(id));

        let descriptor = SnapshotDescriptor {
            active_count: storage.pool.active_count(),
            capacity: storage.pool.capacity(),
            stride: layout.stride,
            kind: level.kind(),
            scale: self.scale,
            use_local_space: level.required.use_local_space,
            bounds: self.bounds,
            type_data_offset: layout.type_data_offset,
            orbit_offset,
            sub_image: layout.sub_image,
            mesh_rotation_offset: layout.mesh_rotation_offset,
            source_link_offset,
            max_draw_count: level.required.max_draw_count,
        };
        Ok(Snapshot::capture(&storage.pool, descriptor))
    }

    /// Publishes a fresh snapshot to the attached consumer.
    ///
    /// Returns None if no publisher is attached.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::snapshot`].
    pub fn publish_snapshot(&self) -> EmitterResult<Option<PublishOutcome>> {
        let Some(publisher) = self.publisher.as_ref() else {
            return Ok(None);
        };
        let snapshot = self.snapshot()?;
        Ok(Some(publisher.publish(snapshot)))
    }

    /// Closes the snapshot handoff and frees all storage.
    ///
    /// A snapshot already handed off stays valid; it owns its data.
    pub fn destroy(&mut self) {
        if self.state == EmitterState::Destroyed {
            return;
        }
        if let Some(publisher) = self.publisher.take() {
            let pending = publisher.close();
            if pending {
                warn!(
                    emitter = self.template.name(),
                    "Snapshot still pending at destroy; consumer keeps its copy"
                );
            }
        }
        self.storage = None;
        self.state = EmitterState::Destroyed;
        info!(
            emitter = self.template.name(),
            peak = self.peak_active,
            "Emitter destroyed"
        );
    }

    /// Lifecycle state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> EmitterState {
        self.state
    }

    /// The template this instance runs.
    #[inline]
    #[must_use]
    pub fn template(&self) -> &Arc<EmitterTemplate> {
        &self.template
    }

    /// Current LOD index.
    #[inline]
    #[must_use]
    pub const fn lod(&self) -> usize {
        self.lod
    }

    /// Number of live particles.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.storage.as_ref().map_or(0, |storage| storage.pool.active_count())
    }

    /// Pool capacity in records.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.as_ref().map_or(0, |storage| storage.pool.capacity())
    }

    /// The planned layout, once initialized.
    #[must_use]
    pub fn layout(&self) -> Option<&EmitterLayout> {
        self.storage.as_ref().map(|storage| &storage.layout)
    }

    /// Bounds after the last non-warm-up tick.
    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Time inside the current loop.
    #[inline]
    #[must_use]
    pub const fn emitter_time(&self) -> f32 {
        self.clock.emitter_time
    }

    /// Seconds since activation or the last rewind.
    #[inline]
    #[must_use]
    pub const fn seconds(&self) -> f32 {
        self.clock.seconds
    }

    /// Completed loops.
    #[inline]
    #[must_use]
    pub const fn loop_count(&self) -> u32 {
        self.clock.loop_count
    }

    /// Loop duration of the current level, delay included.
    #[must_use]
    pub fn duration(&self) -> f32 {
        self.clock.duration(self.lod)
    }

    /// Fractional spawn count carried to the next tick.
    #[inline]
    #[must_use]
    pub const fn leftover(&self) -> f32 {
        self.leftover
    }

    /// Highest live count reached on short ticks.
    #[inline]
    #[must_use]
    pub const fn peak_active(&self) -> usize {
        self.peak_active
    }

    fn level(&self) -> &LodLevel {
        self.template
            .lod(self.lod)
            .unwrap_or_else(|| self.template.highest())
    }

    fn ensure_active(&self, operation: &'static str) -> EmitterResult<()> {
        if self.state == EmitterState::Active {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn invalid(&self, operation: &'static str) -> EmitterError {
        EmitterError::InvalidState {
            operation,
            state: self.state,
        }
    }
}

impl fmt::Debug for EmitterInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterInstance")
            .field("template", &self.template.name())
            .field("state", &self.state)
            .field("lod", &self.lod)
            .field("active_count", &self.active_count())
            .field("capacity", &self.capacity())
            .field("seconds", &self.clock.seconds)
            .field("loop_count", &self.clock.loop_count)
            .finish_non_exhaustive()
    }
}

/// Orbit modules of `level` that own a payload, in stack order.
fn orbit_links(level: &LodLevel, layout: &EmitterLayout) -> Vec<OrbitLink> {
    level
        .orbit_modules()
        .iter()
        .filter(|&&id| layout.has_payload(id))
        .filter_map(|&id| {
            let module = level.module(id)?;
            Some(OrbitLink {
                offset: layout.module_offset(id),
                mode: module.chain_mode()?,
                enabled: module.is_enabled(),
            })
        })
        .collect()
}

/// Live particles past the end of their life.
fn expired_count(pool: &ParticlePool) -> usize {
    (0..pool.active_count())
        .filter_map(|live| pool.live(live).and_then(ParticleRef::new))
        .filter(|particle| particle.header().relative_time > 1.0)
        .count()
}

/// Removes every particle past the end of its life, last to first.
fn kill_expired(storage: &mut Storage, type_data: Option<&dyn TypeDataModule>) {
    let layout = &storage.layout;
    let pool = &mut storage.pool;
    for live in (0..pool.active_count()).rev() {
        let Some(mut particle) = pool.live_mut(live).and_then(ParticleMut::new) else {
            continue;
        };
        if particle.header().relative_time <= 1.0 {
            continue;
        }
        if let Some(td) = type_data {
            td.on_kill(&mut particle, layout);
        }
        pool.kill(live);
    }
}

/// Restores transient fields and ages every live particle.
fn reset_parameters(pool: &mut ParticlePool, links: &[OrbitLink], dt: f32) {
    for live in 0..pool.active_count() {
        let Some(mut particle) = pool.live_mut(live).and_then(ParticleMut::new) else {
            continue;
        };
        particle.header_mut().reset_transients(dt);
        orbit::reset_payloads(&mut particle, links);
    }
}

/// Runs the update dispatch in order.
fn update_modules(
    storage: &mut Storage,
    rng: &mut SimRng,
    frame: &EmitterFrame,
    dispatch: Dispatch<'_>,
    dt: f32,
) {
    let layout = &storage.layout;
    let pool = &mut storage.pool;
    let arena = &mut storage.arena;
    let td_offset = layout.type_data_offset;
    let td_range = layout.type_data_instance();
    let type_data = dispatch.type_data().filter(|td| td.is_enabled());

    if let Some(td) = type_data {
        let mut ctx = UpdateContext::new(frame, layout, pool, instance_bytes(arena, td_range), rng);
        td.pre_update(&mut ctx, td_offset, dt);
    }

    for &id in dispatch.update_ids().iter() {
        let instance = instance_bytes(arena, layout.instance_range(id));
        let mut ctx = UpdateContext::new(frame, layout, pool, instance, rng);
        dispatch.update_module(id, &mut ctx, layout.module_offset(id), dt);
    }

    if let Some(td) = type_data {
        let mut ctx = UpdateContext::new(frame, layout, pool, instance_bytes(arena, td_range), rng);
        dispatch.update_type_data(&mut ctx, td_offset, dt);
        td.post_update(&mut ctx, td_offset, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::FloatDistribution;
    use crate::module::{
        ChainMode, LifetimeModule, OrbitModule, SourceLinkModule, SubImageMethod, SubImageTypeData,
    };
    use crate::particle::SourceLinkPayload;
    use crate::template::{Burst, RequiredSettings};
    use rand::Rng;

    fn instance(level: LodLevel) -> EmitterInstance {
        EmitterInstance::new(Arc::new(EmitterTemplate::single("test", level)), 42)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut emitter = instance(LodLevel::new(RequiredSettings::with_rate(10.0)));
        assert_eq!(emitter.state(), EmitterState::Uninitialized);
        assert!(matches!(
            emitter.tick(&TickContext::new(0.1)),
            Err(EmitterError::InvalidState { operation: "tick", state: EmitterState::Uninitialized })
        ));

        emitter.initialize().unwrap();
        assert_eq!(emitter.state(), EmitterState::Initialized);
        emitter.activate().unwrap();
        assert_eq!(emitter.state(), EmitterState::Active);

        emitter.destroy();
        assert_eq!(emitter.state(), EmitterState::Destroyed);
        assert!(emitter.activate().is_err());
        assert!(emitter.snapshot().is_err());
        assert_eq!(emitter.active_count(), 0);
    }

    #[test]
    fn test_lifetime_expiry_kills() {
        let level = LodLevel::new(RequiredSettings {
            bursts: vec![Burst::new(3, 0.0)],
            ..RequiredSettings::default()
        })
        .with_module(LifetimeModule::new(FloatDistribution::constant(0.25)));
        let mut emitter = instance(level);
        emitter.activate().unwrap();

        emitter.tick(&TickContext::new(0.1)).unwrap();
        assert_eq!(emitter.active_count(), 3);

        for _ in 0..3 {
            emitter.tick(&TickContext::new(0.1)).unwrap();
        }
        assert_eq!(emitter.active_count(), 0);
        assert!(emitter.is_consistent());
    }

    #[test]
    fn test_finite_loops_complete() {
        let level = LodLevel::new(RequiredSettings {
            duration: 0.5,
            loops: 1,
            bursts: vec![Burst::new(2, 0.0)],
            kill_on_completed: true,
            ..RequiredSettings::default()
        });
        let mut emitter = instance(level);
        emitter.activate().unwrap();

        emitter.tick(&TickContext::new(0.25)).unwrap();
        assert_eq!(emitter.active_count(), 2);
        assert!(!emitter.has_completed());

        emitter.tick(&TickContext::new(0.25)).unwrap();
        assert_eq!(emitter.state(), EmitterState::Completed);
        assert!(emitter.has_completed());
        assert!(emitter.tick(&TickContext::new(0.1)).is_err());

        emitter.activate().unwrap();
        assert_eq!(emitter.state(), EmitterState::Active);
        assert_eq!(emitter.loop_count(), 0);
        emitter.tick(&TickContext::new(0.1)).unwrap();
        assert_eq!(emitter.active_count(), 2);
    }

    #[test]
    fn test_delay_holds_spawning() {
        let level = LodLevel::new(RequiredSettings {
            delay: 0.3,
            ..RequiredSettings::with_rate(10.0)
        });
        let mut emitter = instance(level);
        emitter.activate().unwrap();

        emitter.tick(&TickContext::new(0.2)).unwrap();
        assert_eq!(emitter.active_count(), 0);
        assert!((emitter.emitter_time() - 0.2).abs() < 1e-6);

        emitter.tick(&TickContext::new(0.05)).unwrap();
        assert_eq!(emitter.active_count(), 0);
        emitter.tick(&TickContext::new(0.2)).unwrap();
        assert_eq!(emitter.active_count(), 2);
    }

    #[test]
    fn test_failed_growth_rolls_back_tick() {
        let level = LodLevel::new(RequiredSettings {
            bursts: vec![Burst::new(u32::MAX, 0.5)],
            ..RequiredSettings::with_rate(10.0)
        })
        .with_module(LifetimeModule::new(FloatDistribution::constant(0.1)));
        let mut emitter = instance(level);
        emitter.activate().unwrap();
        let ctx = TickContext::new(0.25);

        // Both particles are past their lifetime after one tick.
        emitter.tick(&ctx).unwrap();
        assert_eq!(emitter.active_count(), 2);
        let before = emitter.snapshot().unwrap();
        let (seconds, time, leftover) = (emitter.seconds(), emitter.emitter_time(), emitter.leftover());
        let rng = emitter.rng.clone();

        let result = emitter.tick(&ctx.at(Vec3::new(5.0, 0.0, 0.0)));
        assert!(matches!(
            result,
            Err(EmitterError::Pool(cinder_core::PoolError::CapacityOverflow { .. }))
        ));

        assert_eq!(emitter.state(), EmitterState::Active);
        assert_eq!(emitter.seconds(), seconds);
        assert_eq!(emitter.emitter_time(), time);
        assert_eq!(emitter.leftover(), leftover);
        assert!(!emitter.clock.bursts_mut(0)[0]);
        assert_eq!(emitter.rng.clone().gen::<u64>(), rng.clone().gen::<u64>());
        assert_eq!(emitter.location, Vec3::ZERO);

        // The kill pass never ran.
        let after = emitter.snapshot().unwrap();
        assert_eq!(emitter.active_count(), 2);
        assert_eq!(after.bytes(), before.bytes());
        assert_eq!(after.indices(), before.indices());
        assert!(emitter.is_consistent());

        // Still fatal on retry.
        assert!(emitter.tick(&ctx).is_err());
        assert_eq!(emitter.seconds(), seconds);
    }

    #[test]
    fn test_suppressed_spawning() {
        let mut emitter = instance(LodLevel::new(RequiredSettings::with_rate(100.0)));
        emitter.activate().unwrap();
        emitter.tick(&TickContext::new(0.1).suppressed(true)).unwrap();
        assert_eq!(emitter.active_count(), 0);
    }

    #[test]
    fn test_kill_particle_swaps_last() {
        let level = LodLevel::new(RequiredSettings {
            bursts: vec![Burst::new(4, 0.0)],
            ..RequiredSettings::default()
        })
        .with_module(SourceLinkModule::default());
        let mut emitter = instance(level);
        emitter.activate().unwrap();
        emitter.tick(&TickContext::new(0.016)).unwrap();
        assert_eq!(emitter.active_count(), 4);

        let offset = emitter.layout().unwrap().module_offset(crate::module::ModuleId(0));
        let sequence = |emitter: &EmitterInstance, live| {
            emitter
                .particle(live)
                .and_then(|p| p.payload::<SourceLinkPayload>(offset))
                .map(|link| link.sequence)
        };
        let last = sequence(&emitter, 3);

        assert!(emitter.kill_particle(1));
        assert_eq!(emitter.active_count(), 3);
        assert_eq!(sequence(&emitter, 1), last);
        assert!(!emitter.kill_particle(3));
        assert!(emitter.particle(3).is_none());
        assert!(emitter.is_consistent());

        emitter.kill_particles_forced();
        assert_eq!(emitter.active_count(), 0);
    }

    #[test]
    fn test_snapshot_descriptor_offsets() {
        let level = LodLevel::new(RequiredSettings {
            bursts: vec![Burst::new(2, 0.0)],
            max_draw_count: Some(1),
            ..RequiredSettings::default()
        })
        .with_type_data(SubImageTypeData::new(2, 2, SubImageMethod::Linear))
        .with_module(OrbitModule::new(Vec3::X, ChainMode::Link))
        .with_module(SourceLinkModule::default());
        let mut emitter = instance(level);
        emitter.activate().unwrap();
        emitter.tick(&TickContext::new(0.016)).unwrap();

        let snapshot = emitter.snapshot().unwrap();
        let descriptor = snapshot.descriptor();
        assert_eq!(descriptor.active_count, 2);
        assert_eq!(descriptor.orbit_offset, Some(128));
        assert_eq!(descriptor.source_link_offset, Some(128 + 72));
        assert_eq!(descriptor.sub_image.map(|slot| slot.offset), Some(128 + 72 + 8));
        assert_eq!(descriptor.draw_count(), 1);
        assert_eq!(descriptor.stride, emitter.layout().unwrap().stride);
    }

    #[test]
    fn test_initial_allocation_presizes_pool() {
        let mut emitter = instance(LodLevel::new(RequiredSettings {
            initial_allocation: 64,
            ..RequiredSettings::default()
        }));
        emitter.activate().unwrap();
        assert_eq!(emitter.capacity(), 64);
        assert!(emitter.resize(32).is_ok_and(|grew| !grew));
    }

    #[test]
    fn test_set_lod_bounds() {
        let mut emitter = instance(LodLevel::new(RequiredSettings::default()));
        assert!(emitter.set_lod(0).is_ok());
        assert!(matches!(
            emitter.set_lod(3),
            Err(EmitterError::InvalidLod { level: 3, count: 1 })
        ));
    }
}
