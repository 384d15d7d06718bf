//! Power for a given sample size, and the minimum detectable effect.
//!
//! These invert the formulas in [`crate::sample_size`]: power uses only the
//! rejection tail in the direction of the effect, so plugging a computed
//! sample size back in returns at least the target power.

use serde::Serialize;
use tracing::debug;

use crate::config::Defaults;
use crate::distributions::normal_cdf;
use crate::error::{check_open_unit, check_positive, Result, StatsError};

/// Bisection cap for [`mde_proportions`].
const MDE_MAX_ITER: usize = 200;

/// Width at which the proportion bisection stops.
const MDE_TOL: f64 = 1e-10;

/// Distance kept from 0 and 1 when searching for a detectable proportion.
const MDE_EDGE: f64 = 1e-9;

fn check_size(name: &'static str, n: f64) -> Result<()> {
    if n.is_finite() && n > 0.0 {
        Ok(())
    } else {
        Err(StatsError::InvalidParameter(format!(
            "{name} must be a positive size, got {n}"
        )))
    }
}

fn proportion_power(p1: f64, p2: f64, n1: f64, n2: f64, z_alpha: f64) -> f64 {
    let p_bar = (n1 * p1 + n2 * p2) / (n1 + n2);
    let null_se = (p_bar * (1.0 - p_bar) * (1.0 / n1 + 1.0 / n2)).sqrt();
    let alt_se = (p1 * (1.0 - p1) / n1 + p2 * (1.0 - p2) / n2).sqrt();
    normal_cdf(((p1 - p2).abs() - z_alpha * null_se) / alt_se)
}

/// Power of the two-proportion z test with `n1` subjects in arm 1 and
/// `ratio · n1` in arm 2.
///
/// ```text
/// power = Φ((|p₁ − p₂| − z₁₋α/₂ √(p̄q̄(1/n₁ + 1/n₂))) / √(p₁q₁/n₁ + p₂q₂/n₂))
/// ```
///
/// # Examples
/// ```
/// use clinstat::config::Defaults;
/// use clinstat::power::power_two_proportions;
/// let power = power_two_proportions(0.30, 0.15, 121.0, &Defaults::default()).unwrap();
/// assert!(power > 0.80 && power < 0.81);
/// ```
pub fn power_two_proportions(p1: f64, p2: f64, n1: f64, defaults: &Defaults) -> Result<f64> {
    check_open_unit("p1", p1)?;
    check_open_unit("p2", p2)?;
    check_size("n1", n1)?;
    defaults.validate()?;
    Ok(proportion_power(
        p1,
        p2,
        n1,
        n1 * defaults.ratio,
        defaults.z_alpha_two_sided(),
    ))
}

/// Power of the two-sample z test for a mean difference:
/// `Φ(|δ| / (σ√(1/n₁ + 1/n₂)) − z₁₋α/₂)`.
pub fn power_two_means(delta: f64, sd: f64, n1: f64, defaults: &Defaults) -> Result<f64> {
    check_positive("sd", sd)?;
    check_size("n1", n1)?;
    defaults.validate()?;
    let n2 = n1 * defaults.ratio;
    let se = sd * (1.0 / n1 + 1.0 / n2).sqrt();
    Ok(normal_cdf(delta.abs() / se - defaults.z_alpha_two_sided()))
}

/// Power of the log-rank test with `events` observed events (Schoenfeld):
/// `Φ(|ln HR| √(D·r/(1 + r)²) − z₁₋α/₂)`.
pub fn power_survival(hazard_ratio: f64, events: f64, defaults: &Defaults) -> Result<f64> {
    check_positive("hazard_ratio", hazard_ratio)?;
    check_size("events", events)?;
    defaults.validate()?;
    let r = defaults.ratio;
    let information = events * r / (1.0 + r).powi(2);
    Ok(normal_cdf(
        hazard_ratio.ln().abs() * information.sqrt() - defaults.z_alpha_two_sided(),
    ))
}

/// Smallest detectable difference from a control proportion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectableProportion {
    /// Comparator proportion reaching the target power.
    pub p2: f64,
    /// `p₂ − p₁`; negative when only a decrease is detectable.
    pub difference: f64,
}

/// Minimum detectable difference from `p1` with `n1` subjects in arm 1.
///
/// Bisects [`power_two_proportions`] over `p₂ ∈ (p₁, 1)` first; when even
/// `p₂ → 1` cannot reach the target power it searches `(0, p₁)` instead.
///
/// # Errors
/// `InvalidParameter` when neither direction reaches the target power.
pub fn mde_proportions(p1: f64, n1: f64, defaults: &Defaults) -> Result<DetectableProportion> {
    check_open_unit("p1", p1)?;
    check_size("n1", n1)?;
    defaults.validate()?;
    let n2 = n1 * defaults.ratio;
    let z_alpha = defaults.z_alpha_two_sided();
    let target = defaults.power;
    let power = |p2: f64| proportion_power(p1, p2, n1, n2, z_alpha);

    let (upper_edge, lower_edge) = (1.0 - MDE_EDGE, MDE_EDGE);
    let p2 = if power(upper_edge) >= target {
        bisect_power(&power, target, p1, upper_edge)
    } else if power(lower_edge) >= target {
        bisect_power(&power, target, p1, lower_edge)
    } else {
        return Err(StatsError::InvalidParameter(format!(
            "no proportion is detectable from {p1} with n1 = {n1} at power {target}"
        )));
    };
    debug!(p1, p2, n1, "minimum detectable proportion");
    Ok(DetectableProportion {
        p2,
        difference: p2 - p1,
    })
}

/// Bisection between `near` (power below target) and `far` (power at or
/// above target), returning the point closest to `near` reaching `target`.
fn bisect_power(power: &impl Fn(f64) -> f64, target: f64, near: f64, far: f64) -> f64 {
    let (mut near, mut far) = (near, far);
    for _ in 0..MDE_MAX_ITER {
        if (far - near).abs() < MDE_TOL {
            break;
        }
        let mid = 0.5 * (near + far);
        if power(mid) >= target {
            far = mid;
        } else {
            near = mid;
        }
    }
    far
}

/// Minimum detectable mean difference: `(z₁₋α/₂ + z₁₋β) σ √(1/n₁ + 1/n₂)`.
pub fn mde_means(sd: f64, n1: f64, defaults: &Defaults) -> Result<f64> {
    check_positive("sd", sd)?;
    check_size("n1", n1)?;
    defaults.validate()?;
    let n2 = n1 * defaults.ratio;
    let z = defaults.z_alpha_two_sided() + defaults.z_beta();
    Ok(z * sd * (1.0 / n1 + 1.0 / n2).sqrt())
}

/// Minimum detectable hazard ratio below 1 given `events`:
/// `exp(−(z₁₋α/₂ + z₁₋β)(1 + r)/√(r·D))`. Its reciprocal is the detectable
/// ratio above 1.
pub fn mde_survival(events: f64, defaults: &Defaults) -> Result<f64> {
    check_size("events", events)?;
    defaults.validate()?;
    let r = defaults.ratio;
    let z = defaults.z_alpha_two_sided() + defaults.z_beta();
    Ok((-z * (1.0 + r) / (r * events).sqrt()).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_size::{self, ProportionMethod, SurvivalMethod};

    #[test]
    fn test_power_two_proportions_reference() {
        let p = power_two_proportions(0.30, 0.15, 121.0, &Defaults::default()).unwrap();
        assert!((p - 0.801732).abs() < 1e-5);
    }

    #[test]
    fn test_power_two_means_reference() {
        let p = power_two_means(5.0, 10.0, 63.0, &Defaults::default()).unwrap();
        assert!((p - 0.801301).abs() < 1e-5);
        let neg = power_two_means(-5.0, 10.0, 63.0, &Defaults::default()).unwrap();
        assert_eq!(p, neg);
    }

    #[test]
    fn test_power_survival_reference() {
        let p = power_survival(0.7, 247.0, &Defaults::default()).unwrap();
        assert!((p - 0.800338).abs() < 1e-5);
    }

    #[test]
    fn test_power_inverts_sample_size() {
        let d = Defaults::default().with_ratio(1.5);
        let n = sample_size::two_proportions(0.4, 0.25, ProportionMethod::Normal, &d).unwrap();
        let p = power_two_proportions(0.4, 0.25, n.n1 as f64, &d).unwrap();
        assert!(p >= 0.80 - 1e-3);

        let s = sample_size::survival(0.75, SurvivalMethod::Schoenfeld, None, &d).unwrap();
        let p = power_survival(0.75, s.events as f64, &d).unwrap();
        assert!(p >= 0.80);
    }

    #[test]
    fn test_power_invalid() {
        let d = Defaults::default();
        assert!(power_two_proportions(0.3, 0.15, 0.0, &d).is_err());
        assert!(power_two_means(5.0, -1.0, 10.0, &d).is_err());
        assert!(power_survival(0.0, 100.0, &d).is_err());
    }

    #[test]
    fn test_mde_proportions_upward() {
        // From p1 = 0.15 with 121 per arm, 0.30 is detectable at ~80%.
        let m = mde_proportions(0.15, 121.0, &Defaults::default()).unwrap();
        assert!((m.difference - 0.149632).abs() < 1e-5);
        assert!(m.p2 > 0.15);
    }

    #[test]
    fn test_mde_proportions_downward() {
        // Near 1 no increase is detectable, so the search turns downward.
        let m = mde_proportions(0.99, 50.0, &Defaults::default()).unwrap();
        assert!(m.difference < 0.0);
        let p = power_two_proportions(0.99, m.p2, 50.0, &Defaults::default()).unwrap();
        assert!((p - 0.80).abs() < 1e-6);
    }

    #[test]
    fn test_mde_proportions_unreachable() {
        assert!(mde_proportions(0.5, 1.0, &Defaults::default().with_power(0.99)).is_err());
    }

    #[test]
    fn test_mde_means_reference() {
        let m = mde_means(10.0, 63.0, &Defaults::default()).unwrap();
        assert!((m - 4.991701).abs() < 1e-5);
    }

    #[test]
    fn test_mde_survival_reference() {
        let hr = mde_survival(247.0, &Defaults::default()).unwrap();
        assert!((hr - 0.700108).abs() < 1e-5);
        assert!(mde_survival(0.0, &Defaults::default()).is_err());
    }
}
