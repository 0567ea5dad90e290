//! Exponential backoff with jitter.

use crate::retry::RetryConfig;
use rand::Rng;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// How randomness is applied to a computed backoff delay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterStrategy {
    /// Uniform between zero and the delay
    #[default]
    Full,
    /// Half fixed, half uniform
    Equal,
    /// Uniform between the base delay and three times the delay, capped
    Decorrelated,
    /// Pure exponential curve
    None,
}

impl fmt::Display for JitterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Equal => write!(f, "equal"),
            Self::Decorrelated => write!(f, "decorrelated"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Calculates the delay before retry number `attempt` (zero-based)
///
/// The un-jittered delay is `min(base_delay * exponential_base^attempt, max_delay)`.
///
/// # Example
///
/// ```
/// use shelf_sentry::retry::{compute_backoff, JitterStrategy, RetryConfig};
/// use std::time::Duration;
///
/// let config = RetryConfig {
///     base_delay: Duration::from_secs(1),
///     max_delay: Duration::from_secs(5),
///     jitter: JitterStrategy::None,
///     ..RetryConfig::default()
/// };
/// let mut rng = rand::thread_rng();
/// assert_eq!(compute_backoff(0, &config, &mut rng), Duration::from_secs(1));
/// assert_eq!(compute_backoff(2, &config, &mut rng), Duration::from_secs(4));
/// assert_eq!(compute_backoff(10, &config, &mut rng), Duration::from_secs(5));
/// ```
pub fn compute_backoff<R: Rng + ?Sized>(attempt: u32, config: &RetryConfig, rng: &mut R) -> Duration {
    let base = config.base_delay.as_secs_f64();
    let max = config.max_delay.as_secs_f64();

    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = base * config.exponential_base.powi(exponent);
    let delay = if raw.is_finite() { raw.min(max) } else { max };

    let jittered = match config.jitter {
        JitterStrategy::Full => uniform(rng, 0.0, delay),
        JitterStrategy::Equal => delay / 2.0 + uniform(rng, 0.0, delay / 2.0),
        JitterStrategy::Decorrelated => uniform(rng, base, delay * 3.0).min(max),
        JitterStrategy::None => delay,
    };

    Duration::from_secs_f64(jittered.max(0.0))
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    if high <= low {
        low
    } else {
        rng.gen_range(low..high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(jitter: JitterStrategy) -> RetryConfig {
        RetryConfig {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_no_jitter_is_exponential_then_capped() {
        let config = config(JitterStrategy::None);
        let mut rng = StdRng::seed_from_u64(7);
        let delays: Vec<u64> = (0..6)
            .map(|a| compute_backoff(a, &config, &mut rng).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_no_jitter_is_non_decreasing() {
        let config = config(JitterStrategy::None);
        let mut rng = StdRng::seed_from_u64(7);
        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let delay = compute_backoff(attempt, &config, &mut rng);
            assert!(delay >= previous);
            assert!(delay <= config.max_delay);
            previous = delay;
        }
    }

    #[test]
    fn test_full_jitter_bounds() {
        let config = config(JitterStrategy::Full);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let delay = compute_backoff(2, &config, &mut rng);
            assert!(delay <= Duration::from_secs(4));
        }
    }

    #[test]
    fn test_equal_jitter_bounds() {
        let config = config(JitterStrategy::Equal);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..200 {
            let delay = compute_backoff(2, &config, &mut rng);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(4));
        }
    }

    #[test]
    fn test_decorrelated_jitter_bounds() {
        let config = config(JitterStrategy::Decorrelated);
        let mut rng = StdRng::seed_from_u64(3);
        for attempt in 0..8 {
            let delay = compute_backoff(attempt, &config, &mut rng);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_secs(10));
        }
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let config = config(JitterStrategy::None);
        let mut rng = StdRng::seed_from_u64(4);
        assert_eq!(
            compute_backoff(u32::MAX, &config, &mut rng),
            Duration::from_secs(10)
        );
    }
}
