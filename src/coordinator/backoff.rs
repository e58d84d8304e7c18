//! Exponential backoff with jitter for lock polling.

use rand::Rng;
use std::time::Duration;

/// Delay sequence between lock attempts.
///
/// The nominal delay doubles from `initial` up to `max`. Each returned delay
/// is drawn uniformly from `[nominal / 2, nominal]` so that waiters started
/// together drift apart instead of retrying in lockstep.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial.min(max),
            max,
        }
    }

    /// The next delay, never longer than `limit`.
    pub fn next_delay(&mut self, limit: Duration) -> Duration {
        let nominal = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);

        let nominal_ms = u64::try_from(nominal.as_millis()).unwrap_or(u64::MAX);
        let jittered = if nominal_ms < 2 {
            nominal
        } else {
            Duration::from_millis(rand::rng().random_range(nominal_ms / 2..=nominal_ms))
        };

        jittered.min(limit)
    }
}
