//! Size-dependent retention: small files live long, large files expire fast.

use std::time::Duration;

use safebin_core::{MAX_RETENTION, MEGABYTE, MIN_RETENTION};

/// Cubic retention curve over the size ratio.
///
/// `ratio = clamp(size / (max_mb * 1MiB), 0, 1)`, retention =
/// `max(MIN_RETENTION, MAX_RETENTION * (1 - ratio)^3)`. The cube pulls
/// mid-sized files close to the floor.
pub fn retention_for(size: u64, max_mb: u64) -> Duration {
    if max_mb == 0 {
        return MIN_RETENTION;
    }
    let cap = (max_mb * MEGABYTE) as f64;
    let ratio = (size as f64 / cap).clamp(0.0, 1.0);
    let inverse = 1.0 - ratio;
    let retention = MAX_RETENTION.as_secs_f64() * inverse * inverse * inverse;
    if retention < MIN_RETENTION.as_secs_f64() {
        MIN_RETENTION
    } else {
        Duration::from_secs_f64(retention)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use safebin_core::MEGABYTE;

    const MAX_MB: u64 = 100;

    #[test]
    fn tiny_file_gets_near_max_retention() {
        let got = retention_for(1024, MAX_MB);
        assert!(got <= MAX_RETENTION);
        assert!(got >= MAX_RETENTION - Duration::from_secs(3600));
    }

    #[test]
    fn zero_size_gets_exactly_max() {
        assert_eq!(retention_for(0, MAX_MB), MAX_RETENTION);
    }

    #[test]
    fn full_size_gets_min_retention() {
        assert_eq!(retention_for(100 * MEGABYTE, MAX_MB), MIN_RETENTION);
    }

    #[test]
    fn oversized_clamps_to_min_retention() {
        assert_eq!(retention_for(200 * MEGABYTE, MAX_MB), MIN_RETENTION);
    }

    #[test]
    fn half_size_lands_between_bounds() {
        let got = retention_for(50 * MEGABYTE, MAX_MB);
        assert!(got >= MIN_RETENTION);
        assert!(got < MAX_RETENTION);
    }

    proptest! {
        #[test]
        fn non_increasing_in_size(a in 0u64..=200 * MEGABYTE, b in 0u64..=200 * MEGABYTE) {
            let (small, large) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(retention_for(small, MAX_MB) >= retention_for(large, MAX_MB));
        }

        #[test]
        fn always_within_bounds(size in 0u64..=1 << 40) {
            let got = retention_for(size, MAX_MB);
            prop_assert!(got >= MIN_RETENTION);
            prop_assert!(got <= MAX_RETENTION);
        }
    }
}
