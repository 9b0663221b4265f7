// Retry backoff arithmetic for the connection loop

use std::time::Duration;

/// Delay before retrying after failed attempt `attempt` (0-indexed).
///
/// Exponential: `base ^ attempt` seconds. A result too large for `Duration`
/// saturates to `Duration::MAX`; NaN or negative results collapse to zero.
pub fn backoff_delay(retry_delay_base: f64, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let secs = retry_delay_base.powi(exponent);
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Whether another attempt follows a failure of `attempt` (0-indexed)
pub fn has_retry_left(attempt: u32, max_retries: u32) -> bool {
    attempt + 1 < max_retries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delays() {
        assert_eq!(backoff_delay(2.0, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(2.0, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2.0, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3.0, 2), Duration::from_secs(9));
    }

    #[test]
    fn test_fractional_base() {
        assert_eq!(backoff_delay(0.5, 1), Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_delay_collapses_to_zero() {
        assert_eq!(backoff_delay(-2.0, 1), Duration::ZERO);
        assert_eq!(backoff_delay(f64::NAN, 1), Duration::ZERO);
    }

    #[test]
    fn test_overflowing_delay_saturates() {
        assert_eq!(backoff_delay(10.0, 400), Duration::MAX);
        assert_eq!(backoff_delay(f64::INFINITY, 1), Duration::MAX);
        assert!(backoff_delay(2.0, 80) > backoff_delay(2.0, 40));
    }

    #[test]
    fn test_retry_budget() {
        assert!(has_retry_left(0, 3));
        assert!(has_retry_left(1, 3));
        assert!(!has_retry_left(2, 3));
        assert!(!has_retry_left(0, 1));
    }
}
