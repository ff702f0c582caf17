// src/storage/rate_counter.rs
use axum::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::StoreError;

/// Attempt counter keyed by an arbitrary string. Implementations must make
/// `check_and_increment` atomic per key.
#[async_trait]
pub trait RateCounter: Send + Sync {
    /// Records one attempt; `false` once `max_attempts` have been used in the window.
    async fn check_and_increment(&self, key: &str, max_attempts: u32, decay: Duration) -> Result<bool, StoreError>;
    async fn clear(&self, key: &str) -> Result<(), StoreError>;
    /// Seconds until the current window for `key` resets.
    async fn available_in(&self, key: &str) -> Result<u64, StoreError>;
}

struct WindowEntry {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl WindowEntry {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.window_start) >= self.window
    }
}

#[derive(Default)]
pub struct MemoryRateCounter {
    windows: RwLock<HashMap<String, WindowEntry>>,
}

impl MemoryRateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired windows (call this from a background task).
    pub async fn cleanup(&self) {
        let now = Instant::now();
        self.windows.write().await.retain(|_, entry| !entry.expired(now));
    }
}

#[async_trait]
impl RateCounter for MemoryRateCounter {
    async fn check_and_increment(&self, key: &str, max_attempts: u32, decay: Duration) -> Result<bool, StoreError> {
        let mut windows = self.windows.write().await;
        let now = Instant::now();

        let entry = windows.entry(key.to_string()).or_insert_with(|| WindowEntry {
            count: 0,
            window_start: now,
            window: decay,
        });

        if entry.expired(now) {
            entry.count = 0;
            entry.window_start = now;
            entry.window = decay;
        }

        if entry.count >= max_attempts {
            return Ok(false);
        }

        entry.count += 1;
        Ok(true)
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.windows.write().await.remove(key);
        Ok(())
    }

    async fn available_in(&self, key: &str) -> Result<u64, StoreError> {
        let windows = self.windows.read().await;
        let now = Instant::now();

        Ok(windows
            .get(key)
            .filter(|entry| !entry.expired(now))
            .map(|entry| {
                let remaining = entry.window - now.duration_since(entry.window_start);
                remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
            })
            .unwrap_or(0))
    }
}
