use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Exponential delay with jitter between failed placement attempts.
///
/// One per worker. Reset after a successful placement.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            current: config.initial_delay,
            config,
            failures: 0,
        }
    }

    /// Delay before the next attempt, then grow the base delay.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let base = self.current;

        let next = base.as_secs_f64() * self.config.backoff_multiplier;
        self.current = self.capped(next);

        // Add jitter: 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        self.capped(base.as_secs_f64() * jitter)
    }

    /// `secs` as a delay no longer than `max_delay`; out-of-range values
    /// saturate to it.
    fn capped(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.config.max_delay)
            .min(self.config.max_delay)
    }

    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
