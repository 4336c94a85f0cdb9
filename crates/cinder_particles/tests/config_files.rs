//! # Config Files Integration Test
//!
//! Loads the shipped emitter files and runs them to completion.

use std::path::PathBuf;
use std::sync::Arc;

use cinder_particles::{
    EmitterConfig, EmitterInstance, EmitterKind, EmitterState, EmitterTemplate, TickContext,
};

fn data_file(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../data/emitters")
        .join(name)
}

/// Test: the sparks file loads, builds and completes its single loop.
#[test]
fn test_sparks_runs_to_completion() {
    let config = EmitterConfig::from_toml_file(data_file("sparks.toml")).unwrap();
    assert_eq!(config.lods.len(), 2);

    let template = Arc::new(EmitterTemplate::from_config(&config).unwrap());
    assert_eq!(template.highest().kind(), EmitterKind::SubImage);

    let mut emitter = EmitterInstance::new(template, config.seed);
    emitter.activate().unwrap();
    assert!(emitter.capacity() >= 64);

    emitter.tick(&TickContext::new(1.0 / 60.0)).unwrap();
    let snapshot = emitter.snapshot().unwrap();
    assert!((16..=26).contains(&snapshot.active_count()));
    assert!(snapshot.descriptor().sub_image.is_some());
    assert_eq!(snapshot.descriptor().max_draw_count, Some(256));

    let ctx = TickContext::new(1.0 / 30.0);
    for _ in 0..120 {
        if emitter.state() == EmitterState::Completed {
            break;
        }
        emitter.tick(&ctx).unwrap();
    }
    assert_eq!(emitter.state(), EmitterState::Completed);
    assert!(emitter.has_completed());
    assert_eq!(emitter.loop_count(), 1);
}

/// Test: the low level of the sparks file blends with the high one.
#[test]
fn test_sparks_levels_blend() {
    let config = EmitterConfig::from_toml_file(data_file("sparks.toml")).unwrap();
    let template = Arc::new(EmitterTemplate::from_config(&config).unwrap());
    let mut emitter = EmitterInstance::new(template, 3);
    emitter.activate().unwrap();

    let ctx = TickContext::new(1.0 / 60.0);
    for _ in 0..10 {
        emitter.tick_blended(0, 1, 0.5, &ctx).unwrap();
    }
    assert!(emitter.active_count() > 0);
    assert!(emitter.is_consistent());
}
