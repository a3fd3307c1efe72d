use std::time::{Duration, Instant};

/// Fixed-window request limiter.
///
/// The first request opens a window of length `window`. Up to `max_requests`
/// requests are admitted inside it; the rest are refused until a request
/// arrives after the window elapsed, which opens the next one.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    window: Duration,
    max_requests: u32,
    started: Option<Instant>,
    admitted: u32,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            started: None,
            admitted: 0,
        }
    }

    /// Admits or refuses one request arriving now.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Admits or refuses one request arriving at `now`.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        let expired = self
            .started
            .map_or(true, |start| now.saturating_duration_since(start) >= self.window);
        if expired {
            self.started = Some(now);
            self.admitted = 0;
        }
        if self.admitted < self.max_requests {
            self.admitted += 1;
            true
        } else {
            false
        }
    }

    /// Requests still admissible in the current window.
    pub fn remaining(&self) -> u32 {
        self.max_requests - self.admitted
    }
}
