//! Caller-facing defaults.
//!
//! Every design-dependent routine takes a [`Defaults`] value instead of a
//! long list of optional arguments. The conventional values are
//! `alpha = 0.05`, `power = 0.80`, `ratio = 1` and two-sided 95% intervals.
//!
//! Defaults can be loaded from TOML; absent keys keep their default value.
//!
//! ```
//! use clinstat::config::Defaults;
//! let d = Defaults::from_toml_str("alpha = 0.01\npower = 0.9").unwrap();
//! assert_eq!(d.alpha, 0.01);
//! assert_eq!(d.ratio, 1.0);
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distributions::normal_quantile;
use crate::error::{check_open_unit, check_positive, Result};

/// Significance, power, allocation and confidence settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Type I error rate. Two-sided unless a routine says otherwise.
    pub alpha: f64,
    /// Target power, 1 − β.
    pub power: f64,
    /// Allocation ratio n₂/n₁.
    pub ratio: f64,
    /// Confidence level for reported intervals.
    pub confidence: f64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            power: 0.80,
            ratio: 1.0,
            confidence: 0.95,
        }
    }
}

impl Defaults {
    /// Parses defaults from TOML text and validates them.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let defaults: Defaults = toml::from_str(text)?;
        defaults.validate()?;
        debug!(?defaults, "loaded defaults");
        Ok(defaults)
    }

    /// Returns a copy with a different `alpha`.
    pub fn with_alpha(self, alpha: f64) -> Self {
        Self { alpha, ..self }
    }

    /// Returns a copy with a different `power`.
    pub fn with_power(self, power: f64) -> Self {
        Self { power, ..self }
    }

    /// Returns a copy with a different allocation ratio.
    pub fn with_ratio(self, ratio: f64) -> Self {
        Self { ratio, ..self }
    }

    /// Checks every field against its admissible range.
    pub fn validate(&self) -> Result<()> {
        check_open_unit("alpha", self.alpha)?;
        check_open_unit("power", self.power)?;
        check_open_unit("confidence", self.confidence)?;
        check_positive("ratio", self.ratio)
    }

    /// Two-sided critical value for `confidence` (1.959964 at 95%).
    pub fn z(&self) -> f64 {
        normal_quantile(1.0 - (1.0 - self.confidence) / 2.0)
    }

    /// `z₁₋α/₂`.
    pub fn z_alpha_two_sided(&self) -> f64 {
        normal_quantile(1.0 - self.alpha / 2.0)
    }

    /// `z₁₋α`.
    pub fn z_alpha_one_sided(&self) -> f64 {
        normal_quantile(1.0 - self.alpha)
    }

    /// `z₁₋β`.
    pub fn z_beta(&self) -> f64 {
        normal_quantile(self.power)
    }
}
