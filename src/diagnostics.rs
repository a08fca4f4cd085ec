// src/diagnostics.rs

//! Rate limiting for the periodic per-axis dump.

/// Allows one log line per period on a wrapping microsecond clock.
#[derive(Debug, Clone, Copy)]
pub struct LogRateLimiter {
    period_us: u32,
    last: Option<u32>,
}

impl LogRateLimiter {
    /// Creates a limiter passing at most one line every `period_ms`.
    pub const fn new(period_ms: u32) -> Self {
        Self {
            period_us: period_ms.saturating_mul(1000),
            last: None,
        }
    }

    /// Returns `true` if a line may be emitted at `now_us`, and records it.
    pub fn should_log(&mut self, now_us: u32) -> bool {
        match self.last {
            Some(last) if now_us.wrapping_sub(last) < self.period_us => false,
            _ => {
                self.last = Some(now_us);
                true
            }
        }
    }
}
