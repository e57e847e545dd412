//! Rate limiting for AI endpoint calls.
//!
//! A single [`RateBudget`] is shared by every caller in the process; it caps
//! requests per sliding window and makes callers wait rather than fail.

mod budget;

pub use budget::RateBudget;

use std::time::Duration;

/// Parse Retry-After header value (seconds).
/// Returns duration to wait, or None if header is missing/invalid.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(60)))
}

/// Calculate exponential backoff delay for a given attempt, capped at `max_ms`.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0, 1000, 60_000), Duration::from_secs(1));
        assert_eq!(backoff_delay(2, 1000, 60_000), Duration::from_secs(4));
        assert_eq!(backoff_delay(10, 1000, 60_000), Duration::from_secs(60));
        assert_eq!(backoff_delay(80, 1000, 60_000), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("5")), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(Some("600")), Some(Duration::from_secs(60)));
        assert_eq!(parse_retry_after(Some("soon")), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
