// SPDX-FileCopyrightText: 2026 Wawa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared rolling-window rate limiter.
//!
//! One limiter is shared by every worker and device: the provider cares
//! about total outbound volume, not per-device volume. The window is a
//! deque of send instants; `acquire` suspends until the oldest instant
//! falls out of the window.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use wawa_config::model::BlastConfig;

/// Rolling-window limiter: at most `max` acquisitions inside any `window`.
pub struct RateLimiter {
    stamps: Mutex<VecDeque<Instant>>,
    max: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            stamps: Mutex::new(VecDeque::with_capacity(max)),
            max,
            window,
        }
    }

    pub fn from_config(config: &BlastConfig) -> Self {
        Self::new(
            config.rate_limit_max,
            Duration::from_millis(config.rate_limit_window_ms),
        )
    }

    /// Take a slot, suspending until one frees up.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut stamps = self.stamps.lock().await;
                let now = Instant::now();
                Self::evict(&mut stamps, now, self.window);
                if stamps.len() < self.max {
                    stamps.push_back(now);
                    return;
                }
                match stamps.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };
            // The lock is released while waiting for the window to roll.
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Take a slot if one is free right now.
    pub async fn try_acquire(&self) -> bool {
        let mut stamps = self.stamps.lock().await;
        let now = Instant::now();
        Self::evict(&mut stamps, now, self.window);
        if stamps.len() < self.max {
            stamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of acquisitions currently inside the window.
    pub async fn occupancy(&self) -> usize {
        let mut stamps = self.stamps.lock().await;
        Self::evict(&mut stamps, Instant::now(), self.window);
        stamps.len()
    }

    fn evict(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while stamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= window)
        {
            stamps.pop_front();
        }
    }
}
