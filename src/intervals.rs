//! Confidence intervals for proportions, differences of proportions,
//! Poisson counts and rates.
//!
//! Normal-theory intervals take the critical value `z` directly (use
//! [`crate::config::Defaults::z`] for the conventional 1.96); exact
//! intervals take the two-sided `alpha`.
//!
//! # Examples
//! ```
//! use clinstat::intervals::wilson;
//! let ci = wilson(8, 40, 1.959964).unwrap();
//! assert!(ci.lower < 0.2 && 0.2 < ci.upper);
//! ```

use crate::distributions::{chi_squared_quantile, f_quantile};
use crate::error::{check_open_unit, check_positive, Result, StatsError};
use crate::table::{Estimate, Interval};

fn check_counts(x: u64, n: u64) -> Result<()> {
    if n == 0 {
        return Err(StatsError::InvalidParameter(
            "number of trials must be > 0".into(),
        ));
    }
    if x > n {
        return Err(StatsError::InvalidParameter(format!(
            "successes ({x}) exceed trials ({n})"
        )));
    }
    Ok(())
}

fn check_z(z: f64) -> Result<()> {
    check_positive("z", z)
}

/// Wald interval `p ± z·√(p(1−p)/n)`, clipped to `[0, 1]`.
///
/// Returns the proportion as an [`Estimate`] carrying its standard error.
pub fn wald(x: u64, n: u64, z: f64) -> Result<Estimate> {
    check_counts(x, n)?;
    check_z(z)?;
    let p = x as f64 / n as f64;
    let se = (p * (1.0 - p) / n as f64).sqrt();
    Ok(Estimate {
        value: p,
        se: Some(se),
        ci: Interval::wald(p, se, z).clip_unit(),
    })
}

/// Wilson score interval.
///
/// ```text
/// center = (p + z²/2n) / (1 + z²/n)
/// half   = z·√(p(1−p)/n + z²/4n²) / (1 + z²/n)
/// ```
///
/// The bounds always satisfy `0 ≤ lower ≤ p ≤ upper ≤ 1`.
pub fn wilson(x: u64, n: u64, z: f64) -> Result<Interval> {
    check_counts(x, n)?;
    check_z(z)?;
    let nf = n as f64;
    let p = x as f64 / nf;
    let z2 = z * z;
    let denom = 1.0 + z2 / nf;
    let center = (p + z2 / (2.0 * nf)) / denom;
    let half = z * (p * (1.0 - p) / nf + z2 / (4.0 * nf * nf)).sqrt() / denom;
    let lower = (center - half).clamp(0.0, 1.0).min(p);
    let upper = (center + half).clamp(0.0, 1.0).max(p);
    Ok(Interval::new(lower, upper))
}

/// Clopper–Pearson exact interval through the F-quantile relation.
///
/// ```text
/// lower = x / (x + (n−x+1)·F(1−α/2; 2(n−x+1), 2x))
/// upper = (x+1)·F' / (n − x + (x+1)·F'),  F' = F(1−α/2; 2(x+1), 2(n−x))
/// ```
///
/// `x = 0` gives `lower = 0`; `x = n` gives `upper = 1`.
pub fn clopper_pearson(x: u64, n: u64, alpha: f64) -> Result<Interval> {
    check_counts(x, n)?;
    check_open_unit("alpha", alpha)?;
    let (xf, nf) = (x as f64, n as f64);
    let q = 1.0 - alpha / 2.0;

    let lower = if x == 0 {
        0.0
    } else {
        let f = f_quantile(q, 2.0 * (nf - xf + 1.0), 2.0 * xf);
        xf / (xf + (nf - xf + 1.0) * f)
    };
    let upper = if x == n {
        1.0
    } else {
        let f = f_quantile(q, 2.0 * (xf + 1.0), 2.0 * (nf - xf));
        (xf + 1.0) * f / (nf - xf + (xf + 1.0) * f)
    };
    Ok(Interval::new(lower, upper))
}

/// Agresti–Coull interval: Wald margin around the shrunken center
/// `p̃ = (x + z²/2)/(n + z²)`, clipped to `[0, 1]`.
pub fn agresti_coull(x: u64, n: u64, z: f64) -> Result<Interval> {
    check_counts(x, n)?;
    check_z(z)?;
    let z2 = z * z;
    let n_tilde = n as f64 + z2;
    let p_tilde = (x as f64 + z2 / 2.0) / n_tilde;
    let se = (p_tilde * (1.0 - p_tilde) / n_tilde).sqrt();
    Ok(Interval::wald(p_tilde, se, z).clip_unit())
}

/// Newcombe hybrid score interval (method 10) for `p₁ − p₂`.
///
/// Combines the Wilson intervals `(l₁, u₁)` and `(l₂, u₂)`:
///
/// ```text
/// lower = d − √((p₁−l₁)² + (u₂−p₂)²)
/// upper = d + √((u₁−p₁)² + (p₂−l₂)²)
/// ```
pub fn newcombe(x1: u64, n1: u64, x2: u64, n2: u64, z: f64) -> Result<Estimate> {
    let w1 = wilson(x1, n1, z)?;
    let w2 = wilson(x2, n2, z)?;
    let p1 = x1 as f64 / n1 as f64;
    let p2 = x2 as f64 / n2 as f64;
    let d = p1 - p2;
    let lower = d - ((p1 - w1.lower).powi(2) + (w2.upper - p2).powi(2)).sqrt();
    let upper = d + ((w1.upper - p1).powi(2) + (p2 - w2.lower).powi(2)).sqrt();
    let se = (p1 * (1.0 - p1) / n1 as f64 + p2 * (1.0 - p2) / n2 as f64).sqrt();
    Ok(Estimate {
        value: d,
        se: Some(se),
        ci: Interval::new(lower, upper),
    })
}

/// Unpooled Wald interval for `p₁ − p₂`.
pub fn wald_difference(x1: u64, n1: u64, x2: u64, n2: u64, z: f64) -> Result<Estimate> {
    check_counts(x1, n1)?;
    check_counts(x2, n2)?;
    check_z(z)?;
    let p1 = x1 as f64 / n1 as f64;
    let p2 = x2 as f64 / n2 as f64;
    let se = (p1 * (1.0 - p1) / n1 as f64 + p2 * (1.0 - p2) / n2 as f64).sqrt();
    Ok(Estimate::linear(p1 - p2, se, z))
}

/// Exact interval for a Poisson count `k`.
///
/// ```text
/// lower = χ²(α/2; 2k) / 2          (0 when k = 0)
/// upper = χ²(1−α/2; 2(k+1)) / 2
/// ```
pub fn poisson_exact(k: u64, alpha: f64) -> Result<Interval> {
    check_open_unit("alpha", alpha)?;
    let kf = k as f64;
    let lower = if k == 0 {
        0.0
    } else {
        chi_squared_quantile(alpha / 2.0, 2.0 * kf) / 2.0
    };
    let upper = chi_squared_quantile(1.0 - alpha / 2.0, 2.0 * (kf + 1.0)) / 2.0;
    Ok(Interval::new(lower, upper))
}

/// Log-transformed interval for a rate `events / person_time`.
///
/// `se(ln rate) = 1/√events`; the interval is `rate·exp(±z·se)`. With zero
/// events the rate is 0, the standard error is `∞` and the interval is
/// `[0, ∞]`.
pub fn log_rate(events: u64, person_time: f64, z: f64) -> Result<Estimate> {
    check_positive("person_time", person_time)?;
    check_z(z)?;
    let rate = events as f64 / person_time;
    if events == 0 {
        return Ok(Estimate {
            value: 0.0,
            se: Some(f64::INFINITY),
            ci: Interval::new(0.0, f64::INFINITY),
        });
    }
    let se = 1.0 / (events as f64).sqrt();
    Ok(Estimate::from_log(rate.ln(), se, z))
}

#[cfg(test)]
mod tests {
    use super::*;

    const Z: f64 = 1.959963984540054;

    #[test]
    fn test_wald_basic() {
        let e = wald(30, 100, Z).unwrap();
        assert!((e.value - 0.3).abs() < 1e-15);
        let se = (0.3_f64 * 0.7 / 100.0).sqrt();
        assert!((e.se.unwrap() - se).abs() < 1e-15);
        assert!((e.ci.lower - (0.3 - Z * se)).abs() < 1e-12);
    }

    #[test]
    fn test_wald_clips_at_zero() {
        let e = wald(0, 20, Z).unwrap();
        assert_eq!(e.ci.lower, 0.0);
        assert_eq!(e.ci.upper, 0.0);
    }

    #[test]
    fn test_wilson_reference() {
        // 8/40 at 95%: (0.1050, 0.3476)
        let ci = wilson(8, 40, Z).unwrap();
        assert!((ci.lower - 0.105000).abs() < 1e-5);
        assert!((ci.upper - 0.347572).abs() < 1e-5);
    }

    #[test]
    fn test_wilson_boundaries() {
        let ci = wilson(0, 10, Z).unwrap();
        assert_eq!(ci.lower, 0.0);
        assert!(ci.upper > 0.0 && ci.upper < 0.35);
        let ci = wilson(10, 10, Z).unwrap();
        assert_eq!(ci.upper, 1.0);
    }

    #[test]
    fn test_invalid_counts() {
        assert!(wilson(5, 0, Z).is_err());
        assert!(wilson(11, 10, Z).is_err());
        assert!(wald(1, 10, -1.0).is_err());
        assert!(clopper_pearson(1, 10, 0.0).is_err());
    }

    #[test]
    fn test_clopper_pearson_reference() {
        // binom.test(8, 40): 0.0905 – 0.3565
        let ci = clopper_pearson(8, 40, 0.05).unwrap();
        assert!((ci.lower - 0.090522).abs() < 1e-5);
        assert!((ci.upper - 0.356480).abs() < 1e-5);
    }

    #[test]
    fn test_clopper_pearson_boundaries() {
        let ci = clopper_pearson(0, 10, 0.05).unwrap();
        assert_eq!(ci.lower, 0.0);
        // upper = 1 − (α/2)^{1/n}
        assert!((ci.upper - (1.0 - 0.025_f64.powf(0.1))).abs() < 1e-8);
        let ci = clopper_pearson(10, 10, 0.05).unwrap();
        assert_eq!(ci.upper, 1.0);
        assert!((ci.lower - 0.025_f64.powf(0.1)).abs() < 1e-8);
    }

    #[test]
    fn test_agresti_coull_contains_wilson_center() {
        let ac = agresti_coull(8, 40, Z).unwrap();
        let w = wilson(8, 40, Z).unwrap();
        let center = (8.0 + Z * Z / 2.0) / (40.0 + Z * Z);
        assert!(ac.contains(center));
        assert!(ac.width() >= w.width() - 1e-12);
    }

    #[test]
    fn test_newcombe_reference() {
        // Newcombe (1998), example (a): 56/70 − 48/80 → (0.0524, 0.3339)
        let e = newcombe(56, 70, 48, 80, Z).unwrap();
        assert!((e.value - 0.2).abs() < 1e-12);
        assert!((e.ci.lower - 0.0524).abs() < 1e-3);
        assert!((e.ci.upper - 0.3339).abs() < 1e-3);
    }

    #[test]
    fn test_wald_difference_symmetric() {
        let e = wald_difference(56, 70, 48, 80, Z).unwrap();
        assert!(((e.value - e.ci.lower) - (e.ci.upper - e.value)).abs() < 1e-12);
    }

    #[test]
    fn test_poisson_exact_reference() {
        // poisson.test(10): 4.795389 – 18.390356
        let ci = poisson_exact(10, 0.05).unwrap();
        assert!((ci.lower - 4.795389).abs() < 1e-5);
        assert!((ci.upper - 18.390356).abs() < 1e-5);
        let ci = poisson_exact(0, 0.05).unwrap();
        assert_eq!(ci.lower, 0.0);
        assert!((ci.upper - 3.688879).abs() < 1e-5);
    }

    #[test]
    fn test_log_rate() {
        let e = log_rate(25, 1000.0, Z).unwrap();
        assert!((e.value - 0.025).abs() < 1e-15);
        assert!((e.se.unwrap() - 0.2).abs() < 1e-15);
        assert!((e.ci.lower - 0.025 * (-Z * 0.2).exp()).abs() < 1e-12);
        let zero = log_rate(0, 1000.0, Z).unwrap();
        assert_eq!(zero.ci.upper, f64::INFINITY);
        assert!(log_rate(3, 0.0, Z).is_err());
    }
}
