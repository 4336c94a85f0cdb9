//! # Orbit Chain Resolver
//!
//! Resolves the orbit modules of every live particle into one offset,
//! stored in the last orbit module's payload.
//!
//! ## Chain Modes
//!
//! ```text
//! add    accumulator += payload
//! scale  accumulator *= payload
//! link   resolve accumulator (rotate + emit), restart from payload
//! ```
//!
//! Each resolved stage is rotated by the running rotation, which composes
//! stage after stage. The final offset is the sum of every stage.

use std::f32::consts::TAU;

use cinder_core::ParticlePool;
use glam::{EulerRot, Quat, Vec3};

use crate::module::ChainMode;
use crate::particle::{OrbitPayload, ParticleMut};

/// Rotations smaller than this (per axis, in turns) pass offsets through.
const NEARLY_ZERO: f32 = 1e-4;

/// One orbit module as seen by the resolver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitLink {
    /// Payload offset inside the record.
    pub offset: usize,
    /// How the module combines.
    pub mode: ChainMode,
    /// Disabled links keep their payload but do not accumulate.
    pub enabled: bool,
}

#[derive(Default)]
struct Accumulator {
    offset: Vec3,
    rotation: Vec3,
    rotation_rate: Vec3,
}

impl Accumulator {
    fn load(&mut self, payload: &OrbitPayload) {
        self.offset = payload.offset;
        self.rotation = payload.rotation;
        self.rotation_rate = payload.rotation_rate;
    }

    /// Advances the rotation into `payload`, resolves one stage and clears
    /// the accumulator.
    fn resolve(&mut self, payload: &mut OrbitPayload, frame: &mut Quat, dt: f32) -> Vec3 {
        self.rotation += self.rotation_rate * dt;
        payload.rotation = self.rotation;

        let result = if self.rotation.abs().max_element() > NEARLY_ZERO {
            let turns = *frame * self.rotation;
            let angles = turns * TAU;
            let step = Quat::from_euler(EulerRot::ZYX, angles.z, angles.y, angles.x);
            *frame = (step * *frame).normalize();
            *frame * self.offset
        } else {
            self.offset
        };

        *self = Self::default();
        result
    }
}

/// Resolves one particle's chain in place.
///
/// `chain` and `links` run in stack order and have the same length. The
/// returned total is also written into the last payload's `offset`.
pub fn resolve_chain(chain: &mut [OrbitPayload], links: &[OrbitLink], dt: f32) -> Vec3 {
    let count = chain.len().min(links.len());
    if count == 0 {
        return Vec3::ZERO;
    }

    let mut accum = Accumulator::default();
    let mut frame = Quat::IDENTITY;
    let mut total = Vec3::ZERO;
    let mut previous: Option<(usize, ChainMode)> = None;

    for index in 0..count {
        let link = links[index];
        match link.mode {
            ChainMode::Add => {
                if link.enabled {
                    let payload = &chain[index];
                    accum.offset += payload.offset;
                    accum.rotation += payload.rotation;
                    accum.rotation_rate += payload.rotation_rate;
                }
            }
            ChainMode::Scale => {
                if link.enabled {
                    let payload = &chain[index];
                    accum.offset *= payload.offset;
                    accum.rotation *= payload.rotation;
                    accum.rotation_rate *= payload.rotation_rate;
                }
            }
            ChainMode::Link => {
                if let Some((prev, ChainMode::Link)) = previous {
                    total += accum.resolve(&mut chain[prev], &mut frame, dt);
                    if !link.enabled {
                        accum = Accumulator::default();
                    }
                }
                if link.enabled {
                    accum.load(&chain[index]);
                }
            }
        }

        if index == count - 1 {
            total += accum.resolve(&mut chain[index], &mut frame, dt);
        }

        if link.enabled {
            previous = Some((index, link.mode));
        }
    }

    chain[count - 1].offset = total;
    total
}

/// Restores per-tick orbit fields before module updates run.
pub fn reset_payloads(particle: &mut ParticleMut<'_>, links: &[OrbitLink]) {
    for link in links {
        if let Some(payload) = particle.payload_mut::<OrbitPayload>(link.offset) {
            payload.previous_offset = payload.offset;
            payload.offset = payload.base_offset;
            payload.rotation_rate = payload.base_rotation_rate;
        }
    }
}

/// Resolves every live, non-frozen particle, last to first.
pub fn resolve_pool(pool: &mut ParticlePool, links: &[OrbitLink], dt: f32) {
    if links.is_empty() {
        return;
    }
    let mut chain = Vec::with_capacity(links.len());
    for live in (0..pool.active_count()).rev() {
        let Some(mut particle) = pool.live_mut(live).and_then(ParticleMut::new) else {
            continue;
        };
        if particle.header().is_frozen() {
            continue;
        }

        chain.clear();
        for link in links {
            chain.push(particle.payload::<OrbitPayload>(link.offset).unwrap_or_default());
        }
        resolve_chain(&mut chain, links, dt);
        for (link, resolved) in links.iter().zip(&chain) {
            if let Some(payload) = particle.payload_mut::<OrbitPayload>(link.offset) {
                *payload = *resolved;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(mode: ChainMode) -> OrbitLink {
        OrbitLink {
            offset: 0,
            mode,
            enabled: true,
        }
    }

    fn payload(offset: Vec3) -> OrbitPayload {
        OrbitPayload {
            base_offset: offset,
            offset,
            ..OrbitPayload::default()
        }
    }

    #[test]
    fn test_two_links_without_rotation_sum() {
        let mut chain = [payload(Vec3::new(1.0, 2.0, 0.0)), payload(Vec3::new(0.0, 0.0, 3.0))];
        let links = [link(ChainMode::Link), link(ChainMode::Link)];

        let total = resolve_chain(&mut chain, &links, 0.1);
        assert_eq!(total, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(chain[1].offset, total);
    }

    #[test]
    fn test_add_and_scale_accumulate() {
        let mut chain = [
            payload(Vec3::new(1.0, 1.0, 1.0)),
            payload(Vec3::new(2.0, 0.0, 1.0)),
            payload(Vec3::new(3.0, 5.0, 2.0)),
        ];
        let links = [link(ChainMode::Add), link(ChainMode::Add), link(ChainMode::Scale)];
        let total = resolve_chain(&mut chain, &links, 0.0);
        assert_eq!(total, Vec3::new(9.0, 5.0, 4.0));
    }

    #[test]
    fn test_disabled_link_is_skipped() {
        let mut chain = [payload(Vec3::X), payload(Vec3::Y), payload(Vec3::Z)];
        let mut links = [link(ChainMode::Add), link(ChainMode::Add), link(ChainMode::Add)];
        links[1].enabled = false;
        let total = resolve_chain(&mut chain, &links, 0.0);
        assert_eq!(total, Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_link_rotation_composes() {
        // Each stage turns a quarter about Z on top of the previous one.
        let mut quarter = payload(Vec3::X);
        quarter.rotation = Vec3::new(0.0, 0.0, 0.25);
        let mut chain = [quarter, quarter];
        let links = [link(ChainMode::Link), link(ChainMode::Link)];

        let total = resolve_chain(&mut chain, &links, 0.0);
        assert!((total - Vec3::new(-1.0, 1.0, 0.0)).length() < 1e-5, "{total:?}");
    }

    #[test]
    fn test_rotation_rate_advances_payload() {
        let mut single = payload(Vec3::X);
        single.rotation_rate = Vec3::new(0.0, 0.0, 0.5);
        let mut chain = [single];
        let _ = resolve_chain(&mut chain, &[link(ChainMode::Add)], 0.5);
        assert!((chain[0].rotation.z - 0.25).abs() < 1e-6);
        // Quarter turn about Z applied to X.
        assert!((chain[0].offset - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_empty_chain() {
        assert_eq!(resolve_chain(&mut [], &[], 1.0), Vec3::ZERO);
    }
}
