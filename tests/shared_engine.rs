//! Process-wide engine singleton behavior
//!
//! Integration tests share one process per test binary, so everything about
//! the global handle lives in a single test function: repeated and concurrent
//! `get_or_init` calls must all observe the same engine.

use latent_inpaint::{EngineConfig, SharedEngine};
use std::thread;

#[test]
fn test_get_or_init_returns_one_engine_per_process() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = EngineConfig::default();

    let first = SharedEngine::get_or_init(&config).unwrap();
    let second = SharedEngine::get_or_init(&config).unwrap();
    assert!(first.same_engine(&second));

    // A different configuration after the fact does not replace the engine
    let other_config = EngineConfig::builder()
        .model_id("stabilityai/stable-diffusion-2-inpainting")
        .build()
        .unwrap();
    let third = SharedEngine::get_or_init(&other_config).unwrap();
    assert!(first.same_engine(&third));

    // Concurrent callers all land on the same instance
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let config = config.clone();
            thread::spawn(move || SharedEngine::get_or_init(&config).unwrap())
        })
        .collect();
    for handle in handles {
        let engine = handle.join().unwrap();
        assert!(first.same_engine(&engine));
    }

    // Construction is lazy: no model has been loaded by any of the above
    let stats = first.cache_stats().unwrap();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.hits, 0);
}
