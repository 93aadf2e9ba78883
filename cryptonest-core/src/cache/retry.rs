//! Bounded exponential backoff.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry schedule: `base * 2^(attempt-1)`, capped at `max_delay`, with jitter
/// drawn from the upper half of the window. Never more than `max_retries`
/// retries after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no sleeping.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Retries without sleeping; for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Upper bound of the backoff window before retry number `attempt` (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Jittered delay before retry number `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        let half = ceiling / 2;
        let jitter = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
        half + Duration::from_millis(jitter)
    }

    /// Pause before retry number `attempt` when the failure asked for at least
    /// `requested`. The request is honored only up to `max_delay`.
    pub fn wait(&self, attempt: u32, requested: Option<Duration>) -> Duration {
        let floor = requested.unwrap_or_default().min(self.max_delay);
        self.delay(attempt).max(floor)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// `is_transient` decides which errors are retried. `min_wait` lets an
    /// error impose a longer pause than the schedule (e.g. `Retry-After`),
    /// capped at `max_delay`.
    pub fn run<T, E>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, E>,
        is_transient: impl Fn(&E) -> bool,
        min_wait: impl Fn(&E) -> Option<Duration>,
    ) -> Result<T, E>
    where
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    attempt += 1;
                    let requested = min_wait(&e);
                    let wait = self.wait(attempt, requested);
                    if requested.is_some_and(|r| r > wait) {
                        warn!(what, ?requested, ?wait, "requested pause exceeds max delay, capping");
                    }
                    debug!(what, attempt, ?wait, error = %e, "transient failure, backing off");
                    if !wait.is_zero() {
                        std::thread::sleep(wait);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn ceiling_doubles_and_caps() {
        let p = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(p.ceiling(1), Duration::from_millis(100));
        assert_eq!(p.ceiling(2), Duration::from_millis(200));
        assert_eq!(p.ceiling(3), Duration::from_millis(400));
        assert_eq!(p.ceiling(4), Duration::from_millis(500));
        assert_eq!(p.ceiling(40), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_in_upper_half() {
        let p = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(1),
        };
        for _ in 0..50 {
            let d = p.delay(2);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(400));
        }
    }

    #[test]
    fn retries_are_bounded() {
        let calls = Cell::new(0);
        let result: Result<(), String> = RetryPolicy::immediate(2).run(
            "op",
            || {
                calls.set(calls.get() + 1);
                Err("down".to_string())
            },
            |_| true,
            |_| None,
        );
        assert!(result.is_err());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let _: Result<(), String> = RetryPolicy::immediate(5).run(
            "op",
            || {
                calls.set(calls.get() + 1);
                Err("denied".to_string())
            },
            |_| false,
            |_| None,
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn recovers_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<u32, String> = RetryPolicy::immediate(3).run(
            "op",
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err("flaky".into())
                } else {
                    Ok(7)
                }
            },
            |_| true,
            |_| None,
        );
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn oversized_min_wait_is_capped_at_max_delay() {
        let p = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(20),
        };
        let day = Duration::from_secs(86_400);
        assert_eq!(p.wait(1, Some(day)), Duration::from_millis(20));
        assert!(p.wait(1, Some(Duration::from_millis(10))) >= Duration::from_millis(10));
        assert!(p.wait(1, None) <= Duration::from_millis(1));

        let calls = Cell::new(0);
        let started = std::time::Instant::now();
        let result: Result<u32, String> = p.run(
            "op",
            || {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    Err("rate limited".into())
                } else {
                    Ok(1)
                }
            },
            |_| true,
            |_| Some(day),
        );
        assert_eq!(result.unwrap(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
