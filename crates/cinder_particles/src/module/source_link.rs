//! # Source Link
//!
//! Links every particle to the one spawned before it so trail renderers can
//! walk the stream in spawn order.

use std::any::Any;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::{default_enabled, ParticleModule, PayloadTag, SpawnContext};
use crate::particle::SourceLinkPayload;

/// Per-instance spawn cursor.
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct SpawnCursor {
    last_slot: i32,
    spawned: u32,
}

/// Writes a [`SourceLinkPayload`] into each new particle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceLinkModule {
    /// Participates in dispatch.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for SourceLinkModule {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl ParticleModule for SourceLinkModule {
    fn name(&self) -> &'static str {
        "source_link"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn spawns(&self) -> bool {
        true
    }

    fn required_bytes(&self) -> usize {
        std::mem::size_of::<SourceLinkPayload>()
    }

    fn required_bytes_per_instance(&self) -> usize {
        std::mem::size_of::<SpawnCursor>()
    }

    fn spawn(&self, ctx: &mut SpawnContext<'_>, offset: usize, _spawn_time: f32) {
        let Some(bytes) = ctx.instance.get_mut(..std::mem::size_of::<SpawnCursor>()) else {
            return;
        };
        let cursor: SpawnCursor = bytemuck::pod_read_unaligned(bytes);

        let previous_slot = if cursor.spawned == 0 { -1 } else { cursor.last_slot };
        if let Some(link) = ctx.particle.payload_mut::<SourceLinkPayload>(offset) {
            *link = SourceLinkPayload {
                previous_slot,
                sequence: cursor.spawned,
            };
        }

        let next = SpawnCursor {
            last_slot: i32::try_from(ctx.slot).unwrap_or(i32::MAX),
            spawned: cursor.spawned.wrapping_add(1),
        };
        bytes.copy_from_slice(bytemuck::bytes_of(&next));
    }

    fn payload_tag(&self) -> Option<PayloadTag> {
        Some(PayloadTag::SourceLink)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
