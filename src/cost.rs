//! Shift cost and utilization evaluation.
//!
//! Both solvers price shifts through the same fixed-point model so that
//! their totals compare exactly:
//!
//! ```text
//! cost(d) = max(minShift, d) + rate * max(0, d - overtimeThreshold)
//! ```
//!
//! Durations are integer minutes. With `rate = num / den` the cost is kept
//! in *scaled minutes*, i.e. multiplied by `den`:
//!
//! ```text
//! scaled(d) = den * max(minShift, d) + num * max(0, d - overtimeThreshold)
//! ```
//!
//! For the reference rate of 0.5 this is `2*max(300, d) + max(0, d - 540)`.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Overtime multiplier as a reduced fraction `num / den`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvertimeRate {
    pub num: i64,
    pub den: i64,
}

impl OvertimeRate {
    /// Creates a rate, reduced to lowest terms.
    ///
    /// # Panics
    /// Panics if `den` is not positive.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den > 0, "overtime rate denominator must be positive");
        let g = gcd(num.abs(), den).max(1);
        Self {
            num: num / g,
            den: den / g,
        }
    }

    /// Converts a decimal rate with percent precision (0.5 → 1/2).
    pub fn from_f64(rate: f64) -> Self {
        Self::new((rate * 100.0).round() as i64, 100)
    }

    /// Decimal value.
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// A cost in scaled minutes.
///
/// `scaled / scale` is the cost in minute-equivalents; divide again by 60
/// for hour-equivalents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cost {
    /// Cost multiplied by `scale`.
    pub scaled: i64,
    /// Denominator of the overtime rate.
    pub scale: i64,
}

impl Cost {
    /// Zero cost at the given scale.
    pub fn zero(scale: i64) -> Self {
        Self { scaled: 0, scale }
    }

    /// Cost in hour-equivalents.
    pub fn hours(&self) -> f64 {
        self.scaled as f64 / (self.scale * 60) as f64
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        debug_assert_eq!(self.scale, rhs.scale, "adding costs from different models");
        Cost {
            scaled: self.scaled + rhs.scaled,
            scale: self.scale,
        }
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}h", self.hours())
    }
}

/// Piecewise-linear shift pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostModel {
    min_shift_min: i64,
    overtime_threshold_min: i64,
    rate: OvertimeRate,
}

impl CostModel {
    /// Creates a cost model.
    pub fn new(min_shift_min: i64, overtime_threshold_min: i64, rate: OvertimeRate) -> Self {
        Self {
            min_shift_min,
            overtime_threshold_min,
            rate,
        }
    }

    /// Minimum paid shift (minutes).
    pub fn min_shift_min(&self) -> i64 {
        self.min_shift_min
    }

    /// Overtime threshold (minutes).
    pub fn overtime_threshold_min(&self) -> i64 {
        self.overtime_threshold_min
    }

    /// Overtime rate.
    pub fn rate(&self) -> OvertimeRate {
        self.rate
    }

    /// Fixed-point scale (the rate's denominator).
    pub fn scale(&self) -> i64 {
        self.rate.den
    }

    /// Zero cost in this model's scale.
    pub fn zero(&self) -> Cost {
        Cost::zero(self.scale())
    }

    /// Scaled cost of one shift of `duration_min` minutes.
    ///
    /// The duration is not clamped to any shift cap; staying under the
    /// cap is the caller's constraint.
    pub fn scaled_cost(&self, duration_min: i64) -> i64 {
        let base = duration_min.max(self.min_shift_min);
        let overtime = (duration_min - self.overtime_threshold_min).max(0);
        self.rate.den * base + self.rate.num * overtime
    }

    /// Cost of one shift of `duration_min` minutes.
    pub fn shift_cost(&self, duration_min: i64) -> Cost {
        Cost {
            scaled: self.scaled_cost(duration_min),
            scale: self.scale(),
        }
    }

    /// Total cost over a set of shift durations.
    pub fn total_cost(&self, durations_min: impl IntoIterator<Item = i64>) -> Cost {
        durations_min
            .into_iter()
            .fold(self.zero(), |acc, d| acc + self.shift_cost(d))
    }

    /// Floating-point cost in hours, for reporting only.
    pub fn cost_hours(&self, duration_hours: f64) -> f64 {
        let min_h = self.min_shift_min as f64 / 60.0;
        let thr_h = self.overtime_threshold_min as f64 / 60.0;
        duration_hours.max(min_h) + self.rate.as_f64() * (duration_hours - thr_h).max(0.0)
    }
}

/// Aggregate utilization: surgery minutes over staffed shift minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utilization {
    /// Productive minutes (sum of surgery durations of used agents).
    pub surgery_min: i64,
    /// Staffed minutes (sum of used agents' shift durations).
    pub shift_min: i64,
}

impl Utilization {
    pub fn new(surgery_min: i64, shift_min: i64) -> Self {
        Self {
            surgery_min,
            shift_min,
        }
    }

    /// Ratio in 0.0..=1.0; zero when no shift is staffed.
    pub fn ratio(&self) -> f64 {
        if self.shift_min <= 0 {
            0.0
        } else {
            self.surgery_min as f64 / self.shift_min as f64
        }
    }

    /// Exact integer check `100 * surgery >= percent * shift`.
    pub fn meets_floor(&self, percent: i64) -> bool {
        100 * self.surgery_min >= percent * self.shift_min
    }
}

impl Add for Utilization {
    type Output = Utilization;

    fn add(self, rhs: Utilization) -> Utilization {
        Utilization {
            surgery_min: self.surgery_min + rhs.surgery_min,
            shift_min: self.shift_min + rhs.shift_min,
        }
    }
}
