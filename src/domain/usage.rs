//! Volume readings and the per-cycle poll result

use serde::{Deserialize, Serialize};

/// One usage block as read from the portal; missing numbers are NaN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub used: f64,
    pub total: f64,
    pub unit: String,
}

impl Measurement {
    pub fn new(used: f64, total: f64, unit: impl Into<String>) -> Self {
        Self {
            used,
            total,
            unit: unit.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.used.is_nan() && !self.total.is_nan()
    }

    /// `total - used` rounded to three decimals, NaN if either number is missing
    pub fn available(&self) -> f64 {
        if self.is_complete() {
            round3(self.total - self.used)
        } else {
            f64::NAN
        }
    }
}

/// Outcome of one successful measurement cycle
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    pub used_gb: f64,
    pub total_gb: f64,
    pub refill_gb: Option<f64>,
    pub available_gb: f64,
    pub top_up_attempted: bool,
    pub top_up_succeeded: bool,
}

impl PollResult {
    /// Combine the primary block with an optional refill block.
    ///
    /// A refill block only counts when both of its numbers were read. When the
    /// primary block is incomplete the refill volume stands alone.
    pub fn from_readings(primary: &Measurement, refill: Option<&Measurement>) -> Self {
        let refill_gb = refill.filter(|r| r.is_complete()).map(Measurement::available);
        let primary_available = primary.available();
        let available_gb = match refill_gb {
            Some(extra) if primary_available.is_nan() => extra,
            Some(extra) => round3(primary_available + extra),
            None => primary_available,
        };
        Self {
            used_gb: primary.used,
            total_gb: primary.total,
            refill_gb,
            available_gb,
            top_up_attempted: false,
            top_up_succeeded: false,
        }
    }

    /// Whether the remaining volume is low enough to book more
    pub fn needs_top_up(&self) -> bool {
        !self.available_gb.is_nan() && self.available_gb < 1.0
    }

    /// Value handed to the scheduler; unreadable volume counts as no data
    pub fn scheduling_value(&self) -> f64 {
        if self.available_gb.is_nan() { 0.0 } else { self.available_gb }
    }
}

pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
