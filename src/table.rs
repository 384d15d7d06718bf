//! Shared value types: 2×2 count tables, intervals, effect estimates and
//! the effect-measure selector.
//!
//! The table layout is fixed throughout the crate:
//!
//! ```text
//!              event   no event
//! exposed        a        b       n₁ = a + b
//! unexposed      c        d       n₀ = c + d
//!              m₁=a+c   m₀=b+d    N
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StatsError;

/// Four non-negative counts forming an exposure × outcome table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Table2x2 {
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
}

impl Table2x2 {
    pub fn new(a: u64, b: u64, c: u64, d: u64) -> Self {
        Self { a, b, c, d }
    }

    /// Exposed row total `a + b`.
    pub fn n1(&self) -> u64 {
        self.a + self.b
    }

    /// Unexposed row total `c + d`.
    pub fn n0(&self) -> u64 {
        self.c + self.d
    }

    /// Event column total `a + c`.
    pub fn m1(&self) -> u64 {
        self.a + self.c
    }

    /// Non-event column total `b + d`.
    pub fn m0(&self) -> u64 {
        self.b + self.d
    }

    pub fn total(&self) -> u64 {
        self.a + self.b + self.c + self.d
    }

    /// Risk in the exposed row. NaN when the row is empty.
    pub fn p1(&self) -> f64 {
        ratio(self.a as f64, self.n1() as f64)
    }

    /// Risk in the unexposed row. NaN when the row is empty.
    pub fn p0(&self) -> f64 {
        ratio(self.c as f64, self.n0() as f64)
    }

    /// True when any of the four cells is zero.
    pub fn has_zero_cell(&self) -> bool {
        self.a == 0 || self.b == 0 || self.c == 0 || self.d == 0
    }

    /// True when any row or column margin is zero.
    pub fn has_empty_margin(&self) -> bool {
        self.n1() == 0 || self.n0() == 0 || self.m1() == 0 || self.m0() == 0
    }

    /// Cells as `f64`, with `correction` added to each when any cell is zero.
    pub(crate) fn cells_corrected(&self, correction: f64) -> [f64; 4] {
        let k = if self.has_zero_cell() { correction } else { 0.0 };
        [
            self.a as f64 + k,
            self.b as f64 + k,
            self.c as f64 + k,
            self.d as f64 + k,
        ]
    }

    /// Study-level effect and its variance for `measure`.
    ///
    /// Ratio measures are returned on the log scale. When any cell is zero
    /// 0.5 is added to every cell first.
    ///
    /// ```text
    /// ln OR = ln(ad/bc)             var = 1/a + 1/b + 1/c + 1/d
    /// ln RR = ln(a/n₁ ÷ c/n₀)        var = 1/a − 1/n₁ + 1/c − 1/n₀
    /// RD    = a/n₁ − c/n₀            var = p₁(1−p₁)/n₁ + p₀(1−p₀)/n₀
    /// ```
    pub fn effect(&self, measure: Measure) -> (f64, f64) {
        let [a, b, c, d] = self.cells_corrected(0.5);
        let (n1, n0) = (a + b, c + d);
        match measure {
            Measure::OddsRatio => (
                (a * d / (b * c)).ln(),
                1.0 / a + 1.0 / b + 1.0 / c + 1.0 / d,
            ),
            Measure::RiskRatio => (
                ((a / n1) / (c / n0)).ln(),
                1.0 / a - 1.0 / n1 + 1.0 / c - 1.0 / n0,
            ),
            Measure::RiskDifference => {
                let (p1, p0) = (a / n1, c / n0);
                (p1 - p0, p1 * (1.0 - p1) / n1 + p0 * (1.0 - p0) / n0)
            }
        }
    }

    /// [`Table2x2::effect`] as an [`Estimate`] with a Wald interval on the
    /// analysis scale.
    pub fn estimate(&self, measure: Measure, z: f64) -> Estimate {
        let (effect, variance) = self.effect(measure);
        if measure.is_ratio() {
            Estimate::from_log(effect, variance.sqrt(), z)
        } else {
            Estimate::linear(effect, variance.sqrt(), z)
        }
    }
}

/// Division with the crate-wide zero-denominator convention:
/// `x/0 = +∞` for `x > 0`, `−∞` for `x < 0`, NaN for `0/0`.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        if numerator > 0.0 {
            f64::INFINITY
        } else if numerator < 0.0 {
            f64::NEG_INFINITY
        } else {
            f64::NAN
        }
    } else {
        numerator / denominator
    }
}

/// Two-sided interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// Degenerate interval `[x, x]`.
    pub fn point(x: f64) -> Self {
        Self { lower: x, upper: x }
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, x: f64) -> bool {
        self.lower <= x && x <= self.upper
    }

    /// Symmetric Wald interval `center ± z·se`.
    pub fn wald(center: f64, se: f64, z: f64) -> Self {
        Self::new(center - z * se, center + z * se)
    }

    /// Interval on the log scale mapped back by `exp`.
    pub fn exp(self) -> Self {
        Self::new(self.lower.exp(), self.upper.exp())
    }

    /// Clips both bounds to `[0, 1]`.
    pub fn clip_unit(self) -> Self {
        Self::new(self.lower.clamp(0.0, 1.0), self.upper.clamp(0.0, 1.0))
    }
}

/// Point estimate with optional standard error and a two-sided interval.
///
/// For ratio measures `se` is on the log scale while `value` and `ci` are on
/// the natural scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub value: f64,
    pub se: Option<f64>,
    pub ci: Interval,
}

impl Estimate {
    /// Linear-scale estimate with a Wald interval.
    pub fn linear(value: f64, se: f64, z: f64) -> Self {
        Self {
            value,
            se: Some(se),
            ci: Interval::wald(value, se, z),
        }
    }

    /// Ratio estimate from a log-scale value and standard error.
    pub fn from_log(log_value: f64, se_log: f64, z: f64) -> Self {
        Self {
            value: log_value.exp(),
            se: Some(se_log),
            ci: Interval::wald(log_value, se_log, z).exp(),
        }
    }

    /// Ratio estimate with a log-scale interval when `se_log` is defined,
    /// otherwise the bare value (possibly `∞` or NaN) with `[0, ∞]`.
    pub fn ratio(value: f64, se_log: Option<f64>, z: f64) -> Self {
        match se_log {
            Some(se) if value.is_finite() && value > 0.0 => Self::from_log(value.ln(), se, z),
            _ => Self {
                value,
                se: None,
                ci: Interval::new(0.0, f64::INFINITY),
            },
        }
    }
}

/// Effect measure for a 2×2 comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measure {
    OddsRatio,
    RiskRatio,
    RiskDifference,
}

impl Measure {
    /// True for measures pooled and reported on the log scale.
    pub fn is_ratio(self) -> bool {
        matches!(self, Measure::OddsRatio | Measure::RiskRatio)
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            Measure::OddsRatio => "OR",
            Measure::RiskRatio => "RR",
            Measure::RiskDifference => "RD",
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

impl FromStr for Measure {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OR" => Ok(Measure::OddsRatio),
            "RR" => Ok(Measure::RiskRatio),
            "RD" => Ok(Measure::RiskDifference),
            _ => Err(StatsError::UnsupportedMeasure(s.to_string())),
        }
    }
}
