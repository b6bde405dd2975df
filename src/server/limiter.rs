//! Fixed-window admission limiter.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
}

/// Admits at most `max_requests` per `window`.
///
/// The counter resets once a full window has elapsed since it started.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Mutex::new(Window {
                count: 0,
                started: Instant::now(),
            }),
        }
    }

    /// Record one request and report whether it is allowed.
    pub fn admit(&self) -> bool {
        self.admit_at(Instant::now())
    }

    fn admit_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        if now.saturating_duration_since(state.started) >= self.window {
            state.count = 0;
            state.started = now;
        }
        if state.count >= self.max_requests {
            return false;
        }
        state.count += 1;
        true
    }
}
