// src/utils/time.rs

//! Unix-time helpers. The platform reports timestamps in unix seconds,
//! so the whole pipeline stays in that unit.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Convert whole days to seconds.
pub fn days_to_secs(days: i64) -> i64 {
    days * 24 * 60 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_to_secs() {
        assert_eq!(days_to_secs(0), 0);
        assert_eq!(days_to_secs(1), 86_400);
        assert_eq!(days_to_secs(2), 172_800);
    }

    #[test]
    fn test_unix_now_is_recent() {
        // Past 2020, before 2100
        let now = unix_now();
        assert!(now > 1_577_836_800);
        assert!(now < 4_102_444_800);
    }
}
