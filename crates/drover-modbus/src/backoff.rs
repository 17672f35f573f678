// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Backoff policy for reconnects and operation retries.
//!
//! The delay grows exponentially in the attempt count, clamped between the
//! configured base and maximum, then randomized by a ±jitter multiplier to
//! keep a fleet of clients from reconnecting in lockstep.

use std::time::Duration;

use rand::Rng;

// =============================================================================
// BackoffPolicy
// =============================================================================

/// Computes retry delays: `clamp(base * 2^min(attempt, 10), base, max)`
/// multiplied by `1 + U(-jitter, +jitter)` and floored at zero.
///
/// The exponent cap keeps the doubling from overflowing during long outages.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl BackoffPolicy {
    /// Maximum exponent applied to the doubling.
    const MAX_EXPONENT: u32 = 10;

    /// Creates a policy. `jitter` is clamped to `[0, 1]`.
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    /// Returns the delay for the given attempt number (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis() as f64;
        let max_ms = self.max.as_millis() as f64;
        let exp = base_ms * 2f64.powi(attempt.min(Self::MAX_EXPONENT) as i32);
        let clamped = exp.max(base_ms).min(max_ms);

        let jittered = if self.jitter > 0.0 {
            let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            clamped * factor
        } else {
            clamped
        };

        Duration::from_millis(jittered.max(0.0) as u64)
    }

    /// Returns the base delay.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Returns the maximum delay.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Returns the jitter factor.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: f64) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(250), Duration::from_secs(10), jitter)
    }

    #[test]
    fn test_exponential_growth_without_jitter() {
        let policy = policy(0.0);
        assert_eq!(policy.delay(0), Duration::from_millis(250));
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_caps_at_max() {
        let policy = policy(0.0);
        assert_eq!(policy.delay(6), Duration::from_secs(10));
        assert_eq!(policy.delay(100), Duration::from_secs(10));
    }

    #[test]
    fn test_exponent_cap() {
        // Without the cap, attempt 40 would overflow the doubling entirely.
        let policy = BackoffPolicy::new(
            Duration::from_millis(1),
            Duration::from_secs(3600),
            0.0,
        );
        assert_eq!(policy.delay(10), policy.delay(40));
        assert_eq!(policy.delay(10), Duration::from_millis(1024));
    }

    #[test]
    fn test_never_below_base() {
        let policy = policy(0.0);
        assert_eq!(policy.delay(0), policy.base());
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = policy(0.2);
        for attempt in 0..6 {
            let unjittered = BackoffPolicy::new(policy.base(), policy.max(), 0.0)
                .delay(attempt)
                .as_millis() as f64;
            for _ in 0..50 {
                let delay = policy.delay(attempt).as_millis() as f64;
                assert!(delay >= unjittered * 0.8 - 1.0);
                assert!(delay <= unjittered * 1.2 + 1.0);
            }
        }
    }

    #[test]
    fn test_jitter_clamped_to_unit_range() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 7.5);
        assert_eq!(policy.jitter(), 1.0);
        // With jitter 1.0 the delay may reach zero but never goes negative.
        for _ in 0..100 {
            let _ = policy.delay(0);
        }
    }
}
