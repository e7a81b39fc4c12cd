use std::time::Duration;

/// How the delay grows from one scheduled poll to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Growth {
    /// Multiply by the factor each step (values below 1.0 are treated as 1.0).
    Exponential(f64),
    /// Add a fixed step each time.
    Linear(Duration),
    Constant,
}

/// Maps the number of a scheduled poll to the delay before it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub growth: Growth,
}

impl BackoffPolicy {
    pub fn exponential(base: Duration, max: Duration, factor: f64) -> Self {
        Self {
            base,
            max,
            growth: Growth::Exponential(factor),
        }
    }

    pub fn linear(base: Duration, max: Duration, step: Duration) -> Self {
        Self {
            base,
            max,
            growth: Growth::Linear(step),
        }
    }

    pub fn constant(interval: Duration) -> Self {
        Self {
            base: interval,
            max: interval,
            growth: Growth::Constant,
        }
    }

    /// Delay before the `n`-th scheduled poll (1-based), never above `max`.
    ///
    /// Exponential growth with base 1s, factor 2 and max 8s gives
    /// `1s, 2s, 4s, 8s, 8s, ...`.
    pub fn delay(&self, n: u32) -> Duration {
        let step = n.max(1) - 1;
        let base_ms = self.base.as_millis() as f64;
        let max_ms = self.max.as_millis() as f64;
        let raw = match self.growth {
            Growth::Exponential(factor) => base_ms * factor.max(1.0).powi(step.min(1024) as i32),
            Growth::Linear(inc) => base_ms + inc.as_millis() as f64 * step as f64,
            Growth::Constant => base_ms,
        };
        Duration::from_millis(raw.min(max_ms).max(0.0) as u64)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(2), Duration::from_secs(15), 1.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubling_schedule_is_capped() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(1000), Duration::from_millis(8000), 2.0);
        for n in 1..=40u32 {
            let expected = (1000u64 << (n - 1).min(20)).min(8000);
            assert_eq!(policy.delay(n), Duration::from_millis(expected), "n = {}", n);
            assert!(policy.delay(n) <= Duration::from_millis(8000));
        }
        assert_eq!(policy.delay(u32::MAX), Duration::from_millis(8000));
    }

    #[test]
    fn test_zero_is_treated_as_first() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(1), Duration::from_secs(8), 2.0);
        assert_eq!(policy.delay(0), policy.delay(1));
    }

    #[test]
    fn test_linear_and_constant() {
        let linear = BackoffPolicy::linear(
            Duration::from_secs(1),
            Duration::from_secs(4),
            Duration::from_millis(1500),
        );
        assert_eq!(linear.delay(1), Duration::from_millis(1000));
        assert_eq!(linear.delay(2), Duration::from_millis(2500));
        assert_eq!(linear.delay(3), Duration::from_millis(4000));
        assert_eq!(linear.delay(9), Duration::from_millis(4000));

        let constant = BackoffPolicy::constant(Duration::from_secs(3));
        assert_eq!(constant.delay(1), Duration::from_secs(3));
        assert_eq!(constant.delay(50), Duration::from_secs(3));
    }

    #[test]
    fn test_sub_unit_factor_does_not_shrink() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(2), Duration::from_secs(10), 0.5);
        assert_eq!(policy.delay(5), Duration::from_secs(2));
    }

    #[test]
    fn test_default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(3));
        assert_eq!(policy.delay(20), Duration::from_secs(15));
    }
}
