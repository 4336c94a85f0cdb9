//! # Emitter Clock
//!
//! Loop timing of one instance: seconds since activation, emitter time
//! inside the current loop, loop counter, per-level durations and the
//! burst-fired table.

use rand::Rng;
use tracing::debug;

use crate::context::SimRng;
use crate::template::{EmitterTemplate, RequiredSettings};

/// Durations at or below this never wrap emitter time.
const MIN_WRAP_DURATION: f32 = 1e-4;

/// Loop timing shared by the plain and blended ticks.
#[derive(Debug, Default)]
pub(crate) struct EmitterClock {
    /// Seconds since activation or the last rewind.
    pub seconds: f32,
    /// Time inside the current loop.
    pub emitter_time: f32,
    /// Completed loops.
    pub loop_count: u32,
    /// Loop duration per LOD level, delay included.
    durations: Vec<f32>,
    /// `burst_fired[level][burst]`.
    burst_fired: Vec<Vec<bool>>,
}

impl Clone for EmitterClock {
    fn clone(&self) -> Self {
        Self {
            seconds: self.seconds,
            emitter_time: self.emitter_time,
            loop_count: self.loop_count,
            durations: self.durations.clone(),
            burst_fired: self.burst_fired.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.seconds = source.seconds;
        self.emitter_time = source.emitter_time;
        self.loop_count = source.loop_count;
        self.durations.clone_from(&source.durations);
        self.burst_fired.clone_from(&source.burst_fired);
    }
}

impl EmitterClock {
    /// A clock sized for `template`, with durations picked.
    pub fn new(template: &EmitterTemplate, rng: &mut SimRng) -> Self {
        let burst_fired = (0..template.lod_count())
            .map(|level| {
                template
                    .lod(level)
                    .map_or_else(Vec::new, |lod| vec![false; lod.required.bursts.len()])
            })
            .collect();
        let mut clock = Self {
            burst_fired,
            ..Self::default()
        };
        clock.setup_durations(template, rng);
        clock
    }

    /// Picks the loop duration of every level.
    pub fn setup_durations(&mut self, template: &EmitterTemplate, rng: &mut SimRng) {
        self.durations.clear();
        for level in 0..template.lod_count() {
            let Some(lod) = template.lod(level) else {
                continue;
            };
            self.durations.push(self.pick_duration(&lod.required, rng));
        }
    }

    fn pick_duration(&self, required: &RequiredSettings, rng: &mut SimRng) -> f32 {
        let base = if required.duration_use_range {
            let low = required.duration_low.min(required.duration);
            low + (required.duration - low) * rng.gen::<f32>()
        } else {
            required.duration
        };
        let mut duration = base + required.delay;
        if self.loop_count == 1
            && required.delay_first_loop_only
            && (required.loops == 0 || required.loops > 1)
        {
            duration -= required.delay;
        }
        duration
    }

    /// Loop duration of `level`, delay included.
    pub fn duration(&self, level: usize) -> f32 {
        self.durations.get(level).copied().unwrap_or(0.0)
    }

    /// Delay subtracted from emitter time this loop.
    pub fn delay(&self, required: &RequiredSettings) -> f32 {
        if required.delay_first_loop_only && self.loop_count > 0 {
            0.0
        } else {
            required.delay
        }
    }

    /// Advances by `dt` against the duration of `timing_level`.
    ///
    /// On a loop crossing the burst table is reset and, if the level asks
    /// for it, durations are picked again. Returns true on the first advance
    /// since activation or rewind.
    pub fn advance(
        &mut self,
        template: &EmitterTemplate,
        timing_level: usize,
        dt: f32,
        rng: &mut SimRng,
    ) -> bool {
        let first_time = self.seconds <= 0.0;
        self.seconds += dt;

        let duration = self.duration(timing_level);
        self.emitter_time = if duration > MIN_WRAP_DURATION {
            self.seconds % duration
        } else {
            self.seconds
        };

        #[allow(clippy::cast_precision_loss)]
        let loop_start = duration * self.loop_count as f32;
        if self.seconds - loop_start >= duration {
            self.loop_count += 1;
            self.reset_bursts();
            let recalc = template
                .lod(timing_level)
                .is_some_and(|lod| lod.required.duration_recalc_each_loop);
            if recalc {
                self.setup_durations(template, rng);
            }
            debug!(
                loop_count = self.loop_count,
                seconds = self.seconds,
                "Emitter crossed loop boundary"
            );
        }

        first_time
    }

    /// Whether the spawn pass may run this tick.
    pub fn may_spawn(&self, required: &RequiredSettings, level: usize, first_time: bool) -> bool {
        if self.emitter_time < 0.0 {
            return false;
        }
        #[allow(clippy::cast_precision_loss)]
        let budget = self.duration(level) * required.loops as f32;
        required.loops == 0
            || self.loop_count < required.loops
            || self.seconds < budget
            || first_time
    }

    /// Finite loops whose time budget is spent.
    pub fn loops_exhausted(&self, required: &RequiredSettings, level: usize) -> bool {
        #[allow(clippy::cast_precision_loss)]
        let budget = self.duration(level) * required.loops as f32;
        required.loops != 0 && self.seconds >= budget
    }

    /// Clears every level's burst-fired flags.
    pub fn reset_bursts(&mut self) {
        for level in &mut self.burst_fired {
            level.fill(false);
        }
    }

    /// Burst-fired flags of `level`.
    pub fn bursts_mut(&mut self, level: usize) -> &mut [bool] {
        match self.burst_fired.get_mut(level) {
            Some(flags) => flags.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Back to the start of the first loop.
    pub fn rewind(&mut self) {
        self.seconds = 0.0;
        self.emitter_time = 0.0;
        self.loop_count = 0;
        self.reset_bursts();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Burst, LodLevel};
    use rand::SeedableRng;

    fn template(required: RequiredSettings) -> EmitterTemplate {
        EmitterTemplate::single("clock", LodLevel::new(required))
    }

    #[test]
    fn test_emitter_time_wraps() {
        let mut rng = SimRng::seed_from_u64(3);
        let template = template(RequiredSettings::default());
        let mut clock = EmitterClock::new(&template, &mut rng);

        assert!(clock.advance(&template, 0, 0.75, &mut rng));
        assert_eq!(clock.loop_count, 0);

        assert!(!clock.advance(&template, 0, 0.5, &mut rng));
        assert_eq!(clock.loop_count, 1);
        assert!((clock.emitter_time - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_loop_resets_bursts() {
        let mut rng = SimRng::seed_from_u64(3);
        let template = template(RequiredSettings {
            bursts: vec![Burst::new(4, 0.0)],
            ..RequiredSettings::default()
        });
        let mut clock = EmitterClock::new(&template, &mut rng);
        clock.bursts_mut(0)[0] = true;

        let _ = clock.advance(&template, 0, 1.0, &mut rng);
        assert!(!clock.bursts_mut(0)[0]);
        assert!(clock.bursts_mut(7).is_empty());
    }

    #[test]
    fn test_duration_includes_delay() {
        let mut rng = SimRng::seed_from_u64(3);
        let template = template(RequiredSettings {
            duration: 2.0,
            delay: 0.5,
            ..RequiredSettings::default()
        });
        let clock = EmitterClock::new(&template, &mut rng);
        assert!((clock.duration(0) - 2.5).abs() < 1e-6);
        assert!((clock.delay(&template.highest().required) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_first_loop_only_delay() {
        let mut rng = SimRng::seed_from_u64(3);
        let required = RequiredSettings {
            duration: 1.0,
            delay: 0.5,
            delay_first_loop_only: true,
            duration_recalc_each_loop: true,
            ..RequiredSettings::default()
        };
        let template = template(required.clone());
        let mut clock = EmitterClock::new(&template, &mut rng);

        let _ = clock.advance(&template, 0, 1.5, &mut rng);
        assert_eq!(clock.loop_count, 1);
        assert_eq!(clock.delay(&required), 0.0);
        // Recalculated on the crossing with the delay dropped.
        assert!((clock.duration(0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_duration_range() {
        let mut rng = SimRng::seed_from_u64(11);
        let template = template(RequiredSettings {
            duration: 3.0,
            duration_low: 1.0,
            duration_use_range: true,
            ..RequiredSettings::default()
        });
        let clock = EmitterClock::new(&template, &mut rng);
        let duration = clock.duration(0);
        assert!((1.0..=3.0).contains(&duration), "{duration}");
    }

    #[test]
    fn test_spawn_window_and_exhaustion() {
        let mut rng = SimRng::seed_from_u64(3);
        let required = RequiredSettings {
            loops: 1,
            ..RequiredSettings::default()
        };
        let template = template(required.clone());
        let mut clock = EmitterClock::new(&template, &mut rng);

        let first_time = clock.advance(&template, 0, 0.5, &mut rng);
        assert!(clock.may_spawn(&required, 0, first_time));
        assert!(!clock.loops_exhausted(&required, 0));

        let first_time = clock.advance(&template, 0, 0.75, &mut rng);
        assert!(!clock.may_spawn(&required, 0, first_time));
        assert!(clock.loops_exhausted(&required, 0));

        clock.rewind();
        assert_eq!(clock.loop_count, 0);
        assert_eq!(clock.seconds, 0.0);
    }
}
