// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Token-bucket rate limiting, one bucket per mission.
//!
//! Every agent of a mission shares one [`RateLimiter`]; refill and
//! deduction happen atomically under the bucket lock. The
//! [`RateLimiterRegistry`] hands out limiters keyed by mission id and is
//! constructed once at startup — never a package-level singleton.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::mission::MissionId;

/// Waiting was cut short because the mission scope was cancelled.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("rate limit wait cancelled")]
pub struct RateLimitCancelled;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Shared token bucket: `rate` tokens/sec accumulate up to `capacity`.
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(rate: f64, capacity: u32) -> Self {
        Self {
            rate,
            capacity: capacity as f64,
            bucket: Mutex::new(Bucket {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Attempt to take one token without blocking.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Block until a token is available or the mission scope is cancelled.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), RateLimitCancelled> {
        loop {
            if self.try_acquire() {
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(RateLimitCancelled);
            }

            let pause = self.wait_duration();
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => return Err(RateLimitCancelled),
            }
        }
    }

    /// Time until one token should be available, with a 10% buffer so the
    /// retry does not land just short of the refill.
    fn wait_duration(&self) -> Duration {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            return Duration::ZERO;
        }
        let needed = 1.0 - bucket.tokens;
        Duration::from_secs_f64(needed / self.rate * 1.1)
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
            bucket.last_refill = now;
        }
    }

    #[cfg(test)]
    fn tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        bucket.tokens
    }
}

/// Lazily creates one limiter per mission; removed when the mission ends.
#[derive(Default)]
pub struct RateLimiterRegistry {
    limiters: DashMap<MissionId, Arc<RateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the mission's limiter, creating it with a burst capacity of
    /// roughly one second (`floor(rate) + 1`, at least 1).
    pub fn get_or_create(&self, mission_id: &MissionId, rate: f64) -> Arc<RateLimiter> {
        self.limiters
            .entry(mission_id.clone())
            .or_insert_with(|| {
                let capacity = (rate.floor() as u32 + 1).max(1);
                Arc::new(RateLimiter::new(rate, capacity))
            })
            .clone()
    }

    pub fn remove(&self, mission_id: &MissionId) {
        self.limiters.remove(mission_id);
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tokens_never_exceed_capacity_or_go_negative() {
        let limiter = RateLimiter::new(10.0, 10);

        // Drain the full burst.
        for _ in 0..10 {
            assert!(limiter.try_acquire());
            assert!(limiter.tokens() >= 0.0);
        }
        assert!(!limiter.try_acquire());
        assert!(limiter.tokens() >= 0.0);

        // A long idle period must cap at capacity, not accumulate past it.
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.tokens() <= 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_free_then_waits_conform_to_rate() {
        let limiter = RateLimiter::new(10.0, 10);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..10 {
            limiter.wait(&cancel).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(100));

        // The 11th acquisition has to wait for a refill (~100ms at rate 10).
        limiter.wait(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test(start_paused = true)]
    async fn five_extra_acquisitions_take_at_least_half_a_second() {
        let limiter = RateLimiter::new(10.0, 10);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        for _ in 0..15 {
            limiter.wait(&cancel).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(450));
    }

    #[tokio::test]
    async fn wait_returns_promptly_on_cancellation() {
        let limiter = RateLimiter::new(0.001, 1);
        assert!(limiter.try_acquire());

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let limiter = limiter;
            limiter.wait(&token).await
        });

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("wait did not observe cancellation")
            .unwrap();
        assert_eq!(result, Err(RateLimitCancelled));
    }

    #[tokio::test]
    async fn registry_returns_one_limiter_per_mission() {
        let registry = RateLimiterRegistry::new();
        let id = MissionId::generate();

        let a = registry.get_or_create(&id, 5.0);
        let b = registry.get_or_create(&id, 5.0);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry.remove(&id);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn registry_capacity_floors_fractional_rates() {
        let registry = RateLimiterRegistry::new();
        let id = MissionId::generate();

        // rate 0.5 -> capacity 1: exactly one immediate acquisition.
        let limiter = registry.get_or_create(&id, 0.5);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }
}
