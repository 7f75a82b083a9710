//! Wall-clock helpers.
//!
//! Gossip timestamps and TTL stamps are Unix nanoseconds. Last-writer-wins
//! arbitration compares origination wall time, so every stamp in the system
//! goes through these helpers.

use std::time::Duration;

use chrono::Utc;

/// Current wall time in Unix nanoseconds.
///
/// Saturates at `i64::MAX` if the platform clock overflows the nanosecond
/// representation (year 2262).
#[must_use]
pub fn unix_nanos_now() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Expiration stamp for a fact originated at `now` with the given TTL.
#[must_use]
pub fn ttl_stamp(now: i64, ttl: Duration) -> i64 {
    let ttl_nanos = i64::try_from(ttl.as_nanos()).unwrap_or(i64::MAX);
    now.saturating_add(ttl_nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_plausible() {
        // Any date after 2020-01-01 in nanos.
        assert!(unix_nanos_now() > 1_577_836_800_000_000_000);
    }

    #[test]
    fn ttl_stamp_adds_duration() {
        let now = 1_000_000;
        assert_eq!(ttl_stamp(now, Duration::from_nanos(500)), 1_000_500);
    }

    #[test]
    fn ttl_stamp_saturates() {
        assert_eq!(ttl_stamp(i64::MAX - 1, Duration::from_secs(60)), i64::MAX);
        assert_eq!(ttl_stamp(0, Duration::from_secs(u64::MAX)), i64::MAX);
    }
}
