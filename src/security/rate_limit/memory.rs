//! In-process sliding-window store.
//!
//! Only suitable for single-instance deployments and development: each
//! process keeps its own counters.

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{RateLimitBackend, RateLimitError, WindowOutcome};
use crate::config::WindowPolicy;

/// Identifier → request timestamps (epoch ms, oldest first).
///
/// Check-then-append runs under the shard write lock of the key's entry,
/// so concurrent checks for one identifier are serialized. The store holds
/// at most `capacity` identifiers; on overflow, expired records are swept
/// first and then the least recently seen identifiers are dropped in a batch.
#[derive(Debug)]
pub struct MemoryBackend {
    records: DashMap<String, VecDeque<i64>>,
    capacity: usize,
}

impl MemoryBackend {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sweep expired records, then drop the least recently seen identifiers
    /// until the store is a batch below capacity. Full scans therefore run
    /// at most once per batch of new identifiers.
    fn make_room(&self, cutoff: i64) {
        self.records
            .retain(|_, stamps| stamps.back().is_some_and(|&last| last > cutoff));

        let target = self.capacity - eviction_batch(self.capacity);
        let len = self.records.len();
        if len <= target {
            return;
        }

        let excess = len - target;
        let mut candidates: Vec<(i64, String)> = self
            .records
            .iter()
            .map(|entry| {
                let last = entry.value().back().copied().unwrap_or(i64::MIN);
                (last, entry.key().clone())
            })
            .collect();
        if excess < candidates.len() {
            candidates.select_nth_unstable(excess - 1);
        }
        for (_, key) in candidates.into_iter().take(excess) {
            self.records.remove(&key);
        }
    }
}

fn eviction_batch(capacity: usize) -> usize {
    (capacity / 16).clamp(1, capacity)
}

#[async_trait]
impl RateLimitBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn record(
        &self,
        key: &str,
        now_ms: i64,
        policy: &WindowPolicy,
    ) -> Result<WindowOutcome, RateLimitError> {
        let cutoff = now_ms - policy.window().as_millis() as i64;

        if !self.records.contains_key(key) && self.records.len() >= self.capacity {
            self.make_room(cutoff);
        }

        let mut stamps = self.records.entry(key.to_string()).or_default();
        while stamps.front().is_some_and(|&t| t <= cutoff) {
            stamps.pop_front();
        }

        let count = stamps.len() as u32;
        if count >= policy.max_requests {
            return Ok(WindowOutcome {
                allowed: false,
                count,
                oldest_ms: stamps.front().copied().unwrap_or(now_ms),
            });
        }

        stamps.push_back(now_ms);
        Ok(WindowOutcome {
            allowed: true,
            count: count + 1,
            oldest_ms: stamps.front().copied().unwrap_or(now_ms),
        })
    }
}
