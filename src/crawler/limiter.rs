//! Outbound call budget
//!
//! The limiter enforces two bounds at once:
//! - a rolling window of at most `max_calls` call starts per `period`
//! - at most `max_in_flight` calls outstanding at the same time
//!
//! It is shared through an `Arc` by every task that talks to upstream.

use crate::config::RateLimitConfig;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::trace;

/// Proof that a call may proceed
///
/// Dropping it frees the in-flight slot. The window slot it used expires on its
/// own once the period has elapsed.
pub struct RatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// Sliding-window rate limiter with an in-flight cap
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    in_flight: Arc<Semaphore>,
    /// Start times of the calls inside the current window, oldest first
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: u32, period: Duration, max_in_flight: u32) -> Self {
        Self {
            max_calls: max_calls.max(1) as usize,
            period,
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1) as usize)),
            window: Mutex::new(VecDeque::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.max_calls,
            Duration::from_secs(config.period_secs),
            config.max_in_flight,
        )
    }

    /// Waits until a call is allowed to start
    ///
    /// # Flow
    ///
    /// 1. Acquire an in-flight permit
    /// 2. Drop window entries older than one period
    /// 3. If the window has room, record this call and return
    /// 4. Otherwise sleep until the oldest entry expires and retry
    pub async fn acquire(&self) -> RatePermit {
        // The semaphore is never closed, so this only fails if that changes
        let permit = self.in_flight.clone().acquire_owned().await.ok();

        loop {
            let wait_until = {
                let mut window = self.window.lock().await;
                let now = Instant::now();

                while let Some(&oldest) = window.front() {
                    if now.duration_since(oldest) >= self.period {
                        window.pop_front();
                    } else {
                        break;
                    }
                }

                if window.len() < self.max_calls {
                    window.push_back(now);
                    return RatePermit { _permit: permit };
                }

                match window.front() {
                    Some(&oldest) => oldest + self.period,
                    None => now,
                }
            };

            trace!("Rate limit window full, waiting");
            tokio::time::sleep_until(wait_until).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_within_budget_is_immediate() {
        let limiter = RateLimiter::new(120, Duration::from_secs(60), 4);
        let start = Instant::now();

        for _ in 0..120 {
            let _permit = limiter.acquire().await;
        }

        assert!(start.elapsed() < Duration::from_secs(1));

        // Budget spent: the next call waits for the window
        let next = tokio::time::timeout(Duration::from_secs(30), limiter.acquire()).await;
        assert!(next.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_budget_waits_for_the_window() {
        let limiter = RateLimiter::new(120, Duration::from_secs(60), 4);
        let start = Instant::now();

        for _ in 0..200 {
            let _permit = limiter.acquire().await;
        }

        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquisition_respects_window() {
        let limiter = Arc::new(RateLimiter::new(10, Duration::from_secs(10), 3));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }

        // 25 calls at 10 per 10s need two full windows
        let last = finished.into_iter().max().unwrap();
        assert!(last.duration_since(start) >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_cap() {
        let limiter = RateLimiter::new(100, Duration::from_secs(60), 2);

        let first = limiter.acquire().await;
        let _second = limiter.acquire().await;

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(blocked.is_err());

        drop(first);
        let freed = tokio::time::timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(freed.is_ok());
    }
}
