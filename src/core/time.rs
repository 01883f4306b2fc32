use std::fmt;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Record time in nanoseconds since the UNIX epoch.
///
/// Command-line bounds arrive as floating-point seconds. They are turned into
/// the first or last timestamp that compares inside the bound when the
/// timestamp itself is read as seconds (`as_secs_f64`), so filtering on
/// nanoseconds selects exactly what a comparison in seconds would.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(0);
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Earliest timestamp with `as_secs_f64() >= secs`.
    ///
    /// `None` when no timestamp qualifies (`secs` past `MAX`, or NaN).
    pub fn at_or_after_secs(secs: f64) -> Option<Self> {
        if secs.is_nan() {
            return None;
        }
        first_nanos_where(|ts| ts.as_secs_f64() >= secs).map(Self)
    }

    /// Latest timestamp with `as_secs_f64() <= secs`.
    ///
    /// `None` when no timestamp qualifies (`secs` below zero, or NaN).
    pub fn at_or_before_secs(secs: f64) -> Option<Self> {
        if secs.is_nan() {
            return None;
        }
        match first_nanos_where(|ts| ts.as_secs_f64() > secs) {
            None => Some(Self::MAX),
            Some(0) => None,
            Some(nanos) => Some(Self(nanos - 1)),
        }
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }
}

/// Smallest nanosecond value for which `pred` holds.
///
/// `pred` must be monotonic: false up to some point, true from there on.
fn first_nanos_where(pred: impl Fn(Timestamp) -> bool) -> Option<u64> {
    if !pred(Timestamp::MAX) {
        return None;
    }
    let (mut lo, mut hi) = (0u64, u64::MAX);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(Timestamp(mid)) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    Some(lo)
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.0 / NANOS_PER_SEC, self.0 % NANOS_PER_SEC)
    }
}

#[cfg(test)]
mod tests {
    use super::Timestamp;

    #[test]
    fn whole_and_exact_fractions() {
        assert_eq!(Timestamp::at_or_after_secs(2.0), Some(Timestamp::from_secs(2)));
        assert_eq!(Timestamp::at_or_before_secs(2.0), Some(Timestamp::from_secs(2)));
        assert_eq!(
            Timestamp::at_or_after_secs(1.5),
            Some(Timestamp::from_nanos(1_500_000_000))
        );
        assert_eq!(Timestamp::at_or_after_secs(0.0), Some(Timestamp::MIN));
    }

    #[test]
    fn bounds_never_round_past_the_value() {
        // Between two nanoseconds: start moves up, end moves down.
        assert_eq!(
            Timestamp::at_or_after_secs(2.0000000004),
            Some(Timestamp::from_nanos(2_000_000_001))
        );
        assert_eq!(
            Timestamp::at_or_before_secs(1.9999999996),
            Some(Timestamp::from_nanos(1_999_999_999))
        );
    }

    #[test]
    fn decimal_bounds_match_seconds_comparison() {
        // 2.3 is not exact in binary, but a record at 2.3 s reads back as 2.3.
        let ts = Timestamp::from_nanos(2_300_000_000);
        assert_eq!(Timestamp::at_or_after_secs(2.3), Some(ts));
        assert_eq!(Timestamp::at_or_before_secs(2.3), Some(ts));
    }

    #[test]
    fn out_of_range_bounds() {
        assert_eq!(Timestamp::at_or_before_secs(f64::MAX), Some(Timestamp::MAX));
        assert_eq!(Timestamp::at_or_before_secs(f64::INFINITY), Some(Timestamp::MAX));
        assert_eq!(Timestamp::at_or_after_secs(f64::MAX), None);
        assert_eq!(Timestamp::at_or_after_secs(-3.0), Some(Timestamp::MIN));
        assert_eq!(Timestamp::at_or_after_secs(f64::NEG_INFINITY), Some(Timestamp::MIN));
        assert_eq!(Timestamp::at_or_before_secs(-1.0), None);
        assert_eq!(Timestamp::at_or_before_secs(-1e-12), None);
    }

    #[test]
    fn nan_matches_nothing() {
        assert_eq!(Timestamp::at_or_after_secs(f64::NAN), None);
        assert_eq!(Timestamp::at_or_before_secs(f64::NAN), None);
    }

    #[test]
    fn display_as_seconds() {
        assert_eq!(Timestamp::from_nanos(3_000_000_042).to_string(), "3.000000042");
        assert_eq!(Timestamp::MIN.to_string(), "0.000000000");
    }

    #[test]
    fn secs_round_trip() {
        let ts = Timestamp::from_nanos(1_700_000_000_250_000_000);
        assert!((ts.as_secs_f64() - 1_700_000_000.25).abs() < 1e-6);
    }
}
