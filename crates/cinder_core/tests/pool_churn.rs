//! # Pool Churn Integration Test
//!
//! Interleaves growth, spawns and swap-remove kills the way an emitter does
//! and checks the live-index table after every step.

use cinder_core::ParticlePool;

const STRIDE: usize = 144;

/// Writes `tag` into the first four bytes of a slot.
fn stamp(pool: &mut ParticlePool, slot: usize, tag: u32) {
    pool.record_mut(slot)[..4].copy_from_slice(&tag.to_le_bytes());
}

fn tag_at(pool: &ParticlePool, live: usize) -> Option<u32> {
    let bytes = pool.live(live)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Test: spawning 12 into capacity 10 grows with sqrt slack and keeps identity.
#[test]
fn test_growth_past_capacity() {
    let mut pool = ParticlePool::new(STRIDE).unwrap();
    pool.resize(10).unwrap();
    for tag in 0..10 {
        let slot = pool.acquire().unwrap();
        stamp(&mut pool, slot, tag);
    }
    let before: Vec<Option<u32>> = (0..10).map(|live| tag_at(&pool, live)).collect();

    assert!(pool.reserve_for(12).unwrap());
    assert_eq!(pool.capacity(), 17);
    for tag in 10..12 {
        let slot = pool.acquire().unwrap();
        stamp(&mut pool, slot, tag);
    }

    let after: Vec<Option<u32>> = (0..10).map(|live| tag_at(&pool, live)).collect();
    assert_eq!(before, after);
    assert_eq!(pool.active_count(), 12);
    assert!(pool.is_permutation());
}

/// Test: long kill/spawn churn never breaks the permutation.
#[test]
fn test_churn_keeps_permutation() {
    let mut pool = ParticlePool::new(STRIDE).unwrap();
    let mut next_tag = 0u32;

    for round in 0..200usize {
        let spawn = 3 + round % 7;
        pool.reserve_for(pool.active_count() + spawn).unwrap();
        for _ in 0..spawn {
            let slot = pool.acquire().unwrap();
            stamp(&mut pool, slot, next_tag);
            next_tag += 1;
        }

        // Kill every third live particle, walking backward.
        for live in (0..pool.active_count()).rev() {
            if (live + round) % 3 == 0 {
                let last = tag_at(&pool, pool.active_count() - 1);
                assert!(pool.kill(live).is_some());
                if live < pool.active_count() {
                    assert_eq!(tag_at(&pool, live), last);
                }
            }
        }

        assert!(pool.active_count() <= pool.capacity());
        assert!(pool.is_permutation());
        assert_eq!(pool.free_count(), pool.capacity() - pool.active_count());
    }
}
