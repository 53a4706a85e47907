//! Integration tests for the Redis rate limit backend.
//!
//! These tests require a Redis instance at `$REDIS_URL` (default `redis://127.0.0.1/`).
//! They are ignored by default - run with `cargo test --test redis_backend -- --ignored`

use std::sync::Arc;
use std::time::Duration;

use edge_gateway::config::WindowPolicy;
use edge_gateway::security::rate_limit::{
    Clock, ManualClock, MemoryBackend, RateLimitBackend, RedisBackend, SlidingWindowLimiter,
};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string())
}

/// Connect, or `None` when Redis is not reachable.
async fn connect() -> Option<RedisBackend> {
    match tokio::time::timeout(Duration::from_secs(2), RedisBackend::connect(&redis_url())).await {
        Ok(Ok(backend)) => Some(backend),
        _ => None,
    }
}

fn unique_prefix(test_name: &str) -> String {
    format!("test:{}:{}:", test_name, uuid::Uuid::new_v4().simple())
}

fn limiter(
    backend: Arc<dyn RateLimitBackend>,
    clock: Arc<ManualClock>,
    prefix: &str,
    policy: WindowPolicy,
) -> SlidingWindowLimiter {
    SlidingWindowLimiter::new("public", policy, backend)
        .with_clock(clock)
        .with_key_prefix(prefix)
        .with_timeout(Duration::from_secs(2))
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_matches_memory_backend() {
    let Some(redis) = connect().await else {
        eprintln!("Skipping test: Redis not available at {}", redis_url());
        return;
    };

    let policy = WindowPolicy::new(3, 10);
    let prefix = unique_prefix("parity");
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));

    let remote = limiter(Arc::new(redis), clock.clone(), &prefix, policy);
    let local = limiter(Arc::new(MemoryBackend::new(100)), clock.clone(), &prefix, policy);

    // Two bursts separated by a partial and then a full window.
    let steps: [u64; 8] = [0, 1_000, 1_000, 1_000, 4_000, 3_500, 500, 10_000];
    for (i, advance) in steps.into_iter().enumerate() {
        clock.advance(Duration::from_millis(advance));
        let a = remote.check("198.51.100.7").await;
        let b = local.check("198.51.100.7").await;
        assert_eq!(a.allowed, b.allowed, "step {} at {}", i, clock.now_ms());
        assert_eq!(a.remaining, b.remaining, "step {}", i);
        assert_eq!(a.reset_at_ms, b.reset_at_ms, "step {}", i);
    }
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_redis_denies_over_limit() {
    let Some(redis) = connect().await else {
        eprintln!("Skipping test: Redis not available");
        return;
    };

    let policy = WindowPolicy::new(2, 60);
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let limiter = limiter(Arc::new(redis), clock.clone(), &unique_prefix("deny"), policy);

    assert!(limiter.check("user-1").await.allowed);
    assert!(limiter.check("user-1").await.allowed);
    let denied = limiter.check("user-1").await;
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.reset_at_ms, 1_700_000_060_000);

    // Another identifier has its own window.
    assert!(limiter.check("user-2").await.allowed);
}
