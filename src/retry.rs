//! Backoff policy for failed attempts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// No delay; the item is eligible again immediately.
    None,
    /// The base delay after every failure.
    Fixed,
    /// Base delay doubled per attempt, capped, with jitter.
    Exponential,
}

/// Turns an attempt count into the delay before the item is eligible again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub strategy: BackoffStrategy,

    /// Base delay in milliseconds.
    pub base_delay_ms: u64,

    /// Ceiling for grown delays.
    pub max_delay_ms: u64,

    /// Growth factor per attempt (exponential only).
    pub multiplier: f64,

    /// Spread requeues out so a burst of failures does not synchronize.
    pub jitter: bool,

    /// Jitter magnitude as a fraction of the delay (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(300))
    }
}

impl RetryPolicy {
    /// No backoff at all.
    pub fn none() -> Self {
        Self {
            strategy: BackoffStrategy::None,
            base_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            jitter: false,
            jitter_factor: 0.0,
        }
    }

    /// The same delay after every failure.
    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            strategy: BackoffStrategy::Fixed,
            base_delay_ms: ms,
            max_delay_ms: ms,
            multiplier: 1.0,
            jitter: false,
            jitter_factor: 0.0,
        }
    }

    /// Doubling backoff from `base`, capped at one hour, 10% jitter.
    pub fn exponential(base: Duration) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: base.as_millis() as u64,
            max_delay_ms: 3_600_000,
            multiplier: 2.0,
            jitter: true,
            jitter_factor: 0.1,
        }
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self.jitter_factor = 0.0;
        self
    }

    /// Delay after the `attempt`-th lease failed (1-based, the post-claim
    /// count): base * multiplier^(attempt-1), capped, plus jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.strategy == BackoffStrategy::None {
            return Duration::ZERO;
        }

        let base_delay = match self.strategy {
            BackoffStrategy::None => 0,
            BackoffStrategy::Fixed => self.base_delay_ms,
            BackoffStrategy::Exponential => {
                let exp = attempt - 1;
                (self.base_delay_ms as f64 * self.multiplier.powi(exp as i32)) as u64
            }
        };

        let capped = base_delay.min(self.max_delay_ms);

        let final_delay = if self.jitter && self.jitter_factor > 0.0 {
            let range = (capped as f64 * self.jitter_factor) as u64;
            let jitter = rand_jitter(range);
            capped.saturating_add(jitter).saturating_sub(range / 2)
        } else {
            capped
        };

        Duration::from_millis(final_delay)
    }
}

/// Generate random jitter using a simple LCG.
fn rand_jitter(range: u64) -> u64 {
    use std::time::SystemTime;

    if range == 0 {
        return 0;
    }

    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    let a: u64 = 6364136223846793005;
    let c: u64 = 1442695040888963407;

    let random = seed.wrapping_mul(a).wrapping_add(c);
    random % range
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_backoff_is_zero() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn fixed_delay_ignores_attempt() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(5));
    }

    #[test]
    fn exponential_doubles_per_attempt() {
        let policy = RetryPolicy::exponential(Duration::from_secs(1)).without_jitter();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn exponential_caps_at_max() {
        let policy = RetryPolicy::exponential(Duration::from_secs(300))
            .with_max_delay(Duration::from_secs(600))
            .without_jitter();

        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(600));
    }

    #[test]
    fn jitter_stays_near_capped_delay() {
        let policy = RetryPolicy::exponential(Duration::from_secs(10));
        let delay = policy.delay_for_attempt(1);

        // 10% jitter, centered: within ±5% of 10s
        assert!(delay >= Duration::from_millis(9_500));
        assert!(delay <= Duration::from_millis(10_500));
    }

    #[test]
    fn zeroth_attempt_has_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
    }
}
