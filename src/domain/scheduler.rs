//! Adaptive polling interval
//!
//! The delay before the next cycle is a pure function of the last measured
//! volume (GB) and the configured [`SleepMode`]. Failed cycles report `0`, which
//! always maps to the fast retry interval, so retries are expressed through
//! scheduling instead of nested loops.

use std::ops::Range;
use std::time::Duration;
use tracing::warn;

/// Retry interval for failed cycles and the floor for fixed mode
pub const ERROR_INTERVAL_SECS: u64 = 60;

/// Fixed-mode interval when no duration is configured
pub const DEFAULT_FIXED_SECS: u64 = 300;

const RANDOM_RANGE: Range<u64> = 300..500;

/// Smart-mode tiers: lower bound in GB (inclusive) and the interval range in seconds
const SMART_TIERS: &[(f64, Range<u64>)] = &[
    (10.0, 3600..5400),
    (5.0, 900..1800),
    (3.0, 600..900),
    (2.0, 300..450),
    (1.2, 150..240),
    (1.0, 60..90),
];

/// How the poller spaces its cycles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SleepMode {
    /// Uniform in [300 s, 500 s)
    Random,
    /// Configured seconds, floored at 60 s; `None` uses 300 s
    Fixed(Option<u64>),
    /// Longer delays the more volume is left
    Smart,
    /// Anything else; behaves like `Random`
    Unrecognized(String),
}

impl SleepMode {
    /// Parse the configured mode name; `fixed_secs` only matters for `fixed`.
    pub fn parse(mode: Option<&str>, fixed_secs: Option<u64>) -> Self {
        match mode.map(|m| m.trim().to_ascii_lowercase()) {
            None => Self::Random,
            Some(m) if m.is_empty() || m == "random" => Self::Random,
            Some(m) if m == "fixed" => Self::Fixed(fixed_secs),
            Some(m) if m == "smart" => Self::Smart,
            Some(m) => Self::Unrecognized(m),
        }
    }
}

/// Computes the delay before the next cycle
#[derive(Debug, Clone)]
pub struct AdaptiveScheduler {
    mode: SleepMode,
}

impl AdaptiveScheduler {
    pub fn new(mode: SleepMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> &SleepMode {
        &self.mode
    }

    /// Delay before the next cycle given the last available volume.
    ///
    /// Zero, negative and NaN measurements are the error case and always give
    /// the 60 s retry interval.
    pub fn next_interval(&self, measurement: f64) -> Duration {
        Duration::from_secs(self.next_interval_secs(measurement))
    }

    fn next_interval_secs(&self, measurement: f64) -> u64 {
        if measurement.is_nan() || measurement <= 0.0 {
            return ERROR_INTERVAL_SECS;
        }
        match &self.mode {
            SleepMode::Random => fastrand::u64(RANDOM_RANGE),
            SleepMode::Fixed(None) => DEFAULT_FIXED_SECS,
            SleepMode::Fixed(Some(secs)) if *secs < ERROR_INTERVAL_SECS => {
                warn!(configured = secs, "Sleep time is less than 60 seconds, using 60 seconds");
                ERROR_INTERVAL_SECS
            }
            SleepMode::Fixed(Some(secs)) => *secs,
            SleepMode::Smart => smart_interval_secs(measurement),
            SleepMode::Unrecognized(name) => {
                warn!(mode = %name, "Invalid sleep mode, defaulting to random interval");
                fastrand::u64(RANDOM_RANGE)
            }
        }
    }
}

fn smart_interval_secs(available_gb: f64) -> u64 {
    SMART_TIERS
        .iter()
        .find(|(lower, _)| available_gb >= *lower)
        .map_or(ERROR_INTERVAL_SECS, |(_, range)| fastrand::u64(range.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn secs(scheduler: &AdaptiveScheduler, value: f64) -> u64 {
        scheduler.next_interval(value).as_secs()
    }

    #[rstest]
    #[case(SleepMode::Random)]
    #[case(SleepMode::Smart)]
    #[case(SleepMode::Fixed(Some(900)))]
    #[case(SleepMode::Unrecognized("turbo".into()))]
    fn error_measurements_retry_after_a_minute(#[case] mode: SleepMode) {
        let scheduler = AdaptiveScheduler::new(mode);
        assert_eq!(secs(&scheduler, 0.0), 60);
        assert_eq!(secs(&scheduler, -3.5), 60);
        assert_eq!(secs(&scheduler, f64::NAN), 60);
    }

    #[rstest]
    #[case(12.0, 3600, 5400)]
    #[case(10.0, 3600, 5400)]
    #[case(7.5, 900, 1800)]
    #[case(5.0, 900, 1800)]
    #[case(3.0, 600, 900)]
    #[case(2.0, 300, 450)]
    #[case(1.2, 150, 240)]
    #[case(1.0, 60, 90)]
    fn smart_tiers_include_lower_bound(#[case] value: f64, #[case] low: u64, #[case] high: u64) {
        let scheduler = AdaptiveScheduler::new(SleepMode::Smart);
        for _ in 0..50 {
            let got = secs(&scheduler, value);
            assert!((low..high).contains(&got), "{value} GB gave {got}s");
        }
    }

    #[test]
    fn smart_below_one_gigabyte_falls_through() {
        let scheduler = AdaptiveScheduler::new(SleepMode::Smart);
        assert_eq!(secs(&scheduler, 0.999_999), 60);
        assert_eq!(secs(&scheduler, 0.5), 60);
    }

    #[rstest]
    #[case(Some(10), 60)]
    #[case(Some(59), 60)]
    #[case(Some(60), 60)]
    #[case(Some(1200), 1200)]
    #[case(None, 300)]
    fn fixed_mode_is_floored(#[case] configured: Option<u64>, #[case] expected: u64) {
        let scheduler = AdaptiveScheduler::new(SleepMode::Fixed(configured));
        assert_eq!(secs(&scheduler, 4.0), expected);
    }

    #[test]
    fn random_and_unrecognized_stay_in_range() {
        for mode in [SleepMode::Random, SleepMode::Unrecognized("x".into())] {
            let scheduler = AdaptiveScheduler::new(mode);
            for _ in 0..100 {
                assert!((300..500).contains(&secs(&scheduler, 0.3)));
            }
        }
    }

    #[test]
    fn parse_accepts_known_modes() {
        assert_eq!(SleepMode::parse(Some("Smart"), None), SleepMode::Smart);
        assert_eq!(SleepMode::parse(Some("fixed"), Some(90)), SleepMode::Fixed(Some(90)));
        assert_eq!(SleepMode::parse(None, Some(90)), SleepMode::Random);
        assert_eq!(
            SleepMode::parse(Some("sometimes"), None),
            SleepMode::Unrecognized("sometimes".into())
        );
    }

    proptest! {
        #[test]
        fn next_interval_is_total_and_bounded(value in proptest::num::f64::ANY) {
            let scheduler = AdaptiveScheduler::new(SleepMode::Smart);
            let got = secs(&scheduler, value);
            prop_assert!((60..5400).contains(&got));
        }
    }
}
