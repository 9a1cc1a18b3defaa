// ABOUTME: Minute-window token bucket shared by all model calls
// ABOUTME: Acquisition blocks until a slot frees or the caller's deadline expires
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::warn;

use crate::errors::{AppError, AppResult};

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter sized in requests per minute
///
/// The bucket is shared behind the model client; workers never see it.
pub struct MinuteRateLimiter {
    max_per_minute: u32,
    grants: Mutex<VecDeque<Instant>>,
}

impl MinuteRateLimiter {
    /// Create a limiter allowing `max_per_minute` acquisitions per window
    #[must_use]
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute: max_per_minute.max(1),
            grants: Mutex::new(VecDeque::new()),
        }
    }

    /// Acquire one slot, waiting until a slot frees or `deadline` passes
    ///
    /// # Errors
    ///
    /// Returns `RateLimitExceeded` when the deadline would pass before a
    /// slot becomes available.
    pub async fn acquire(&self, deadline: Instant) -> AppResult<()> {
        loop {
            let wait = {
                let mut grants = self.grants.lock().await;
                let now = Instant::now();
                while grants
                    .front()
                    .is_some_and(|oldest| now.duration_since(*oldest) >= WINDOW)
                {
                    grants.pop_front();
                }
                if grants.len() < self.max_per_minute as usize {
                    grants.push_back(now);
                    return Ok(());
                }
                // Full window: wait until the oldest grant ages out.
                let oldest = *grants
                    .front()
                    .ok_or_else(|| AppError::internal("rate limiter window empty while full"))?;
                WINDOW.saturating_sub(now.duration_since(oldest))
            };

            if Instant::now() + wait > deadline {
                return Err(AppError::rate_limited(format!(
                    "token bucket exhausted; next slot in {}ms exceeds deadline",
                    wait.as_millis()
                )));
            }
            warn!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting for a slot");
            sleep(wait).await;
        }
    }

    /// Slots currently consumed within the window
    pub async fn in_flight_window(&self) -> usize {
        let mut grants = self.grants.lock().await;
        let now = Instant::now();
        while grants
            .front()
            .is_some_and(|oldest| now.duration_since(*oldest) >= WINDOW)
        {
            grants.pop_front();
        }
        grants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grants_up_to_the_limit_without_waiting() {
        let limiter = MinuteRateLimiter::new(3);
        let deadline = Instant::now() + Duration::from_millis(10);
        for _ in 0..3 {
            limiter.acquire(deadline).await.unwrap();
        }
        assert_eq!(limiter.in_flight_window().await, 3);
    }

    #[tokio::test]
    async fn rejects_when_deadline_precedes_next_slot() {
        let limiter = MinuteRateLimiter::new(1);
        let deadline = Instant::now() + Duration::from_millis(10);
        limiter.acquire(deadline).await.unwrap();
        let err = limiter.acquire(deadline).await.unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::RateLimitExceeded);
    }
}
