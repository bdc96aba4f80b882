use std::time::{Duration, Instant};

pub const DEFAULT_SCAN_COOLDOWN: Duration = Duration::from_millis(1500);

/// Rate limit for decode callbacks: the same code is let through at most once
/// per window, measured from the last time it was let through.
#[derive(Debug, Clone)]
pub struct ScanDebouncer {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl ScanDebouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` when `code` should be processed. Suppressed events do not
    /// move the window.
    pub fn admit(&mut self, code: &str, now: Instant) -> bool {
        if let Some((last_code, last_at)) = &self.last {
            if last_code == code && now.saturating_duration_since(*last_at) < self.window {
                return false;
            }
        }
        self.last = Some((code.to_string(), now));
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for ScanDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_COOLDOWN)
    }
}
