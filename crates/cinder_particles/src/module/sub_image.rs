//! # Sub-Image Selection
//!
//! Picks which cell of the emitter's sub-image grid each particle shows.
//! Linear methods sample an index curve over relative lifetime; random
//! methods re-roll the cell at a fixed relative-time interval.

use std::any::Any;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{default_enabled, ParticleModule, SubImageGrid, UpdateContext};
use crate::context::SimRng;
use crate::distribution::FloatDistribution;
use crate::particle::{ParticleHeader, RandomSubImagePayload, SubImagePayload};

/// Writes the sub-image payload every tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubImageModule {
    /// Image index over relative lifetime, in `[0, cells)`.
    pub sub_image_index: FloatDistribution,
    /// Random re-rolls per particle life; zero keeps the first image.
    #[serde(default)]
    pub random_image_changes: u32,
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl SubImageModule {
    /// A sub-image module stepping through `sub_image_index`.
    #[must_use]
    pub fn new(sub_image_index: FloatDistribution) -> Self {
        Self {
            sub_image_index,
            random_image_changes: 0,
            enabled: true,
        }
    }

    /// Relative time between random re-rolls.
    #[allow(clippy::cast_precision_loss)]
    fn random_interval(&self) -> f32 {
        0.99 / (self.random_image_changes + 1) as f32
    }

    /// Index and interpolation for the linear methods.
    fn linear_index(
        &self,
        header: &ParticleHeader,
        grid: SubImageGrid,
        rng: &mut SimRng,
    ) -> (u32, f32) {
        let cells = grid.horizontal * grid.vertical;
        let raw = self.sub_image_index.sample(header.relative_time, rng);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let index = (raw.max(0.0) as u32).min(cells - 1);
        #[allow(clippy::cast_precision_loss)]
        let interp = if grid.method.is_blend() {
            (raw - index as f32).abs()
        } else {
            0.0
        };
        (index, interp)
    }

    /// Re-rolls the random image when its interval elapsed.
    ///
    /// Returns the index and interpolation to use this tick.
    fn random_index(
        &self,
        header: &ParticleHeader,
        grid: SubImageGrid,
        payload: &mut RandomSubImagePayload,
        rng: &mut SimRng,
    ) -> (u32, f32) {
        let cells = grid.horizontal * grid.vertical;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut index = (payload.image.image_h + payload.image.image_v * grid.horizontal as f32) as u32;
        let mut interp = payload.image.interpolation;

        let elapsed = header.relative_time - payload.random_image_time;
        if elapsed > self.random_interval() || payload.random_image_time == 0.0 {
            interp = rng.gen::<f32>();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
            {
                index = ((interp * cells as f32) as u32).min(cells - 1);
            }
            payload.random_image_time = header.relative_time;
        }

        if !grid.method.is_blend() {
            interp = 0.0;
        }
        (index.min(cells - 1), interp)
    }
}

/// Fills the cell coordinates for `index`, with the next cell wrapping
/// row-major when `step` is set.
#[allow(clippy::cast_precision_loss)]
fn write_cells(payload: &mut SubImagePayload, grid: SubImageGrid, index: u32, interp: f32, step: bool) {
    let h = index % grid.horizontal;
    let v = index / grid.horizontal;
    let (next_h, next_v) = if !step {
        (h, v)
    } else if h == grid.horizontal - 1 {
        (0, if v == grid.vertical - 1 { 0 } else { v + 1 })
    } else {
        (h + 1, v)
    };
    payload.interpolation = interp;
    payload.image_h = h as f32;
    payload.image_v = v as f32;
    payload.next_image_h = next_h as f32;
    payload.next_image_v = next_v as f32;
}

impl ParticleModule for SubImageModule {
    fn name(&self) -> &'static str {
        "sub_image_index"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn updates(&self) -> bool {
        true
    }

    fn update(&self, ctx: &mut UpdateContext<'_>, _offset: usize, _dt: f32) {
        let Some(slot) = ctx.layout.sub_image else {
            return;
        };
        let grid = slot.grid;
        if grid.method.is_random() && self.random_image_changes == 0 {
            return;
        }

        ctx.for_each_live_with_rng(|particle, rng| {
            if particle.header().relative_time > 1.0 {
                return;
            }
            if grid.method.is_random() {
                let Some((header, payload)) =
                    particle.split_payload_mut::<RandomSubImagePayload>(slot.offset)
                else {
                    return;
                };
                let (index, interp) = self.random_index(header, grid, payload, rng);
                write_cells(&mut payload.image, grid, index, interp, false);
            } else {
                let Some((header, payload)) =
                    particle.split_payload_mut::<SubImagePayload>(slot.offset)
                else {
                    return;
                };
                let (index, interp) = self.linear_index(header, grid, rng);
                write_cells(payload, grid, index, interp, true);
            }
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
