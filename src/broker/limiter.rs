//! Process-wide publish rate limiter.
//!
//! A token bucket refilled at one token per `interval`, holding at most
//! `burst` tokens. Unlike a drop-on-empty limiter, [`PublishLimiter::acquire`]
//! reserves the next token and sleeps until it matures, so the caller of
//! `publish` is slowed down but the publish itself is never lost.
//!
//! Time comes from `tokio::time`, which keeps the limiter deterministic under
//! a paused test clock.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::trace;

#[derive(Debug)]
pub struct PublishLimiter {
    interval: Duration,
    burst: u32,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    /// Available tokens. Negative while callers hold reservations.
    tokens: f64,
    last_refill: Instant,
}

impl PublishLimiter {
    /// Creates a limiter that starts with a full bucket. A zero `burst` is
    /// treated as one so that publishes can always make progress.
    pub fn new(interval: Duration, burst: u32) -> Self {
        let burst = burst.max(1);
        Self {
            interval,
            burst,
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Waits until a token is available and consumes it.
    pub async fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            trace!(?wait, "publish rate limited");
            sleep(wait).await;
        }
    }

    /// Takes a token now, or reserves the next one and returns how long the
    /// caller has to wait for it.
    fn reserve(&self) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        if !self.interval.is_zero() {
            let refill = elapsed.as_secs_f64() / self.interval.as_secs_f64();
            state.tokens = (state.tokens + refill).min(f64::from(self.burst));
        } else {
            state.tokens = f64::from(self.burst);
        }
        state.last_refill = now;

        state.tokens -= 1.0;
        if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            self.interval.mul_f64(-state.tokens)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_is_immediate_then_one_per_interval() {
        let limiter = PublishLimiter::new(Duration::from_millis(100), 8);
        let start = Instant::now();

        let mut finished = Vec::new();
        for _ in 0..20 {
            limiter.acquire().await;
            finished.push(start.elapsed());
        }

        for at in &finished[..8] {
            assert!(*at < Duration::from_millis(1), "burst publish waited {at:?}");
        }
        for (i, at) in finished[8..].iter().enumerate() {
            let expected = Duration::from_millis(100 * (i as u64 + 1));
            let drift = if *at > expected {
                *at - expected
            } else {
                expected - *at
            };
            assert!(
                drift <= Duration::from_millis(5),
                "publish {} finished at {at:?}, expected ~{expected:?}",
                i + 8
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_refills_up_to_burst_only() {
        let limiter = PublishLimiter::new(Duration::from_millis(100), 2);
        limiter.acquire().await;
        limiter.acquire().await;

        tokio::time::advance(Duration::from_secs(10)).await;

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(1));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(99));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_queue_behind_reservations() {
        let limiter = std::sync::Arc::new(PublishLimiter::new(Duration::from_millis(100), 1));
        limiter.acquire().await;

        let start = Instant::now();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut done = Vec::new();
        for handle in handles {
            done.push(handle.await.unwrap() - start);
        }
        done.sort();
        assert!(done[2] >= Duration::from_millis(299));
    }

    #[test]
    fn zero_burst_still_admits_one() {
        let limiter = PublishLimiter::new(Duration::from_millis(100), 0);
        assert_eq!(limiter.burst(), 1);
    }
}
