//! Error type for validated entry points.
//!
//! Scalar kernels in [`crate::special`] and [`crate::distributions`] never
//! fail: they return NaN or signed infinities for out-of-domain arguments.
//! Composite routines (intervals, tests, sample sizes, pooling, survival)
//! validate their inputs once at the boundary and report problems through
//! [`StatsError`]. Degenerate arithmetic inside an otherwise valid call
//! still yields sentinel values (`∞` for `x/0`, NaN for `0/0`).

use thiserror::Error;

/// Errors produced by validated statistical routines.
#[derive(Debug, Error)]
pub enum StatsError {
    /// A probability argument lies outside its admissible range.
    #[error("invalid probability for {name}: {value} (expected {expected})")]
    InvalidProbability {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },

    /// A non-probability parameter violates its constraint.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The routine needs at least one element.
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// Parallel input slices differ in length.
    #[error("length mismatch: {left} has {left_len} elements, {right} has {right_len}")]
    LengthMismatch {
        left: &'static str,
        left_len: usize,
        right: &'static str,
        right_len: usize,
    },

    /// Not enough observations for the requested statistic.
    #[error("insufficient data: need at least {required}, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// A measure selector string did not name a supported measure.
    #[error("unsupported measure: {0:?} (expected OR, RR or RD)")]
    UnsupportedMeasure(String),

    /// Configuration text could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StatsError>;

/// Checks that `value` lies in the open interval `(0, 1)`.
pub(crate) fn check_open_unit(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(StatsError::InvalidProbability {
            name,
            value,
            expected: "0 < p < 1",
        })
    }
}

/// Checks that `value` lies in the closed interval `[0, 1]`.
pub(crate) fn check_closed_unit(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(StatsError::InvalidProbability {
            name,
            value,
            expected: "0 <= p <= 1",
        })
    }
}

/// Checks that `value` is finite and strictly positive.
pub(crate) fn check_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(StatsError::InvalidParameter(format!(
            "{name} must be finite and > 0, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_probability_error() {
        let err = check_open_unit("alpha", 1.5).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("alpha"));
        assert!(msg.contains("1.5"));
    }

    #[test]
    fn display_all_variants() {
        let cases: Vec<(StatsError, &str)> = vec![
            (StatsError::InvalidParameter("sd".into()), "invalid parameter"),
            (StatsError::EmptyInput("studies"), "empty input"),
            (
                StatsError::LengthMismatch {
                    left: "times",
                    left_len: 3,
                    right: "events",
                    right_len: 2,
                },
                "length mismatch",
            ),
            (
                StatsError::InsufficientData {
                    required: 3,
                    actual: 2,
                },
                "insufficient data",
            ),
            (StatsError::UnsupportedMeasure("HR".into()), "unsupported measure"),
        ];
        for (err, prefix) in cases {
            let msg = err.to_string();
            assert!(msg.starts_with(prefix), "'{msg}' should start with '{prefix}'");
        }
    }

    #[test]
    fn unit_checks() {
        assert!(check_open_unit("p", 0.5).is_ok());
        assert!(check_open_unit("p", 0.0).is_err());
        assert!(check_open_unit("p", f64::NAN).is_err());
        assert!(check_closed_unit("p", 0.0).is_ok());
        assert!(check_closed_unit("p", 1.0).is_ok());
        assert!(check_closed_unit("p", -0.1).is_err());
        assert!(check_positive("sd", 1.0).is_ok());
        assert!(check_positive("sd", 0.0).is_err());
        assert!(check_positive("sd", f64::INFINITY).is_err());
    }
}
