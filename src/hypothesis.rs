//! Hypothesis tests for proportions and 2×2 tables.
//!
//! - Two-proportion z test (pooled or unpooled, optional continuity correction)
//! - Pearson chi-squared for a 2×2 table (optional Yates correction)
//! - Fisher's exact test
//! - McNemar's test for paired binary data
//! - Cochran–Armitage test for trend
//! - Mantel–Haenszel pooling across strata with the Breslow–Day homogeneity test
//!
//! All p-values are two-sided.
//!
//! # Examples
//! ```
//! use clinstat::hypothesis::fisher_exact;
//! use clinstat::table::Table2x2;
//! let r = fisher_exact(&Table2x2::new(3, 1, 1, 3));
//! assert!((r.p_value - 34.0 / 70.0).abs() < 1e-10);
//! ```

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::distributions::{
    binomial_cdf, chi_squared_sf, hypergeometric_pmf, hypergeometric_support, normal_two_sided_p,
};
use crate::error::{check_positive, Result, StatsError};
use crate::table::{ratio, Estimate, Interval, Measure, Table2x2};

/// Relative slack when comparing table probabilities in Fisher's test.
const FISHER_REL_EPS: f64 = 1e-7;

/// Iteration cap for the per-stratum Breslow–Day solver.
const BRESLOW_DAY_MAX_ITER: usize = 50;

/// Absolute tolerance on the expected cell count in Breslow–Day.
const BRESLOW_DAY_TOL: f64 = 1e-10;

// ============================================================================
// Two-proportion z test
// ============================================================================

/// Result of [`two_proportion_z`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TwoProportionTest {
    pub p1: f64,
    pub p2: f64,
    pub diff: f64,
    pub se: f64,
    pub z: f64,
    pub p_value: f64,
}

/// z test for `p₁ − p₂`.
///
/// With `pooled` the standard error uses `p̄ = (x₁+x₂)/(n₁+n₂)`; otherwise
/// each arm contributes its own variance. The continuity correction shrinks
/// `|p₁ − p₂|` by `½(1/n₁ + 1/n₂)`, never past zero.
///
/// A zero standard error gives `z = 0` when the numerator is 0 and `±∞`
/// otherwise.
pub fn two_proportion_z(
    x1: u64,
    n1: u64,
    x2: u64,
    n2: u64,
    pooled: bool,
    continuity: bool,
) -> Result<TwoProportionTest> {
    for (x, n) in [(x1, n1), (x2, n2)] {
        if n == 0 || x > n {
            return Err(StatsError::InvalidParameter(format!(
                "invalid arm: {x} events out of {n}"
            )));
        }
    }
    let (n1f, n2f) = (n1 as f64, n2 as f64);
    let p1 = x1 as f64 / n1f;
    let p2 = x2 as f64 / n2f;
    let diff = p1 - p2;

    let se = if pooled {
        let p = (x1 + x2) as f64 / (n1f + n2f);
        (p * (1.0 - p) * (1.0 / n1f + 1.0 / n2f)).sqrt()
    } else {
        (p1 * (1.0 - p1) / n1f + p2 * (1.0 - p2) / n2f).sqrt()
    };

    let numerator = if continuity {
        let cc = 0.5 * (1.0 / n1f + 1.0 / n2f);
        diff.signum() * (diff.abs() - cc).max(0.0)
    } else {
        diff
    };
    let z = if numerator == 0.0 {
        0.0
    } else {
        ratio(numerator, se)
    };

    Ok(TwoProportionTest {
        p1,
        p2,
        diff,
        se,
        z,
        p_value: normal_two_sided_p(z),
    })
}

// ============================================================================
// Chi-squared and Fisher
// ============================================================================

/// Chi-squared statistic with its degrees of freedom and upper-tail p-value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChiSquaredTest {
    pub chi2: f64,
    pub df: usize,
    pub p_value: f64,
}

/// Pearson chi-squared test of independence for a 2×2 table.
///
/// ```text
/// χ² = N(ad − bc)² / (n₁ n₀ m₁ m₀)
/// χ²_Yates = N(max(0, |ad − bc| − N/2))² / (n₁ n₀ m₁ m₀)
/// ```
///
/// A zero margin makes the statistic undefined: `chi2` and `p_value` are NaN.
pub fn chi_squared_2x2(table: &Table2x2, yates: bool) -> ChiSquaredTest {
    if table.has_empty_margin() {
        return ChiSquaredTest {
            chi2: f64::NAN,
            df: 1,
            p_value: f64::NAN,
        };
    }
    let [a, b, c, d] = table.cells_corrected(0.0);
    let n = table.total() as f64;
    let cross = (a * d - b * c).abs();
    let cross = if yates {
        (cross - n / 2.0).max(0.0)
    } else {
        cross
    };
    let margins = table.n1() as f64 * table.n0() as f64 * table.m1() as f64 * table.m0() as f64;
    let chi2 = n * cross * cross / margins;
    ChiSquaredTest {
        chi2,
        df: 1,
        p_value: chi_squared_sf(chi2, 1.0),
    }
}

/// Result of [`fisher_exact`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FisherTest {
    /// Two-sided p-value.
    pub p_value: f64,
    /// Probability of the observed table.
    pub p_obs: f64,
    /// `P(A ≤ a)`.
    pub p_less: f64,
    /// `P(A ≥ a)`.
    pub p_greater: f64,
}

/// Fisher's exact test conditioning on both margins.
///
/// The two-sided p-value sums the hypergeometric probability of every table
/// in the support no more likely than the observed one (with a relative
/// slack of 1e-7 for ties).
pub fn fisher_exact(table: &Table2x2) -> FisherTest {
    let (population, successes, draws) = (table.total(), table.m1(), table.n1());
    let (lo, hi) = hypergeometric_support(population, successes, draws);
    let pmf = |k: u64| hypergeometric_pmf(k, population, successes, draws);
    let p_obs = pmf(table.a);
    let cutoff = p_obs * (1.0 + FISHER_REL_EPS);

    let mut p_value = 0.0;
    let mut p_less = 0.0;
    let mut p_greater = 0.0;
    for k in lo..=hi {
        let p = pmf(k);
        if p <= cutoff {
            p_value += p;
        }
        if k <= table.a {
            p_less += p;
        }
        if k >= table.a {
            p_greater += p;
        }
    }

    FisherTest {
        p_value: f64::min(p_value, 1.0),
        p_obs,
        p_less: f64::min(p_less, 1.0),
        p_greater: f64::min(p_greater, 1.0),
    }
}

// ============================================================================
// McNemar
// ============================================================================

/// Variant of McNemar's test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum McNemarMethod {
    /// `(b − c)² / (b + c)`.
    Asymptotic,
    /// `(|b − c| − 1)² / (b + c)`.
    ContinuityCorrected,
    /// Two-sided exact binomial test on the discordant pairs.
    Exact,
}

/// Result of [`mcnemar`]. `chi2` is `None` for the exact method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct McNemarTest {
    pub chi2: Option<f64>,
    pub p_value: f64,
    pub method: McNemarMethod,
}

/// McNemar's test from the discordant pair counts `b` and `c`.
///
/// Without discordant pairs there is no evidence either way: the statistic is
/// 0 and the p-value 1.
pub fn mcnemar(b: u64, c: u64, method: McNemarMethod) -> McNemarTest {
    let n = b + c;
    let asymptotic = |chi2: f64| McNemarTest {
        chi2: Some(chi2),
        p_value: chi_squared_sf(chi2, 1.0),
        method,
    };
    if n == 0 {
        return McNemarTest {
            chi2: (method != McNemarMethod::Exact).then_some(0.0),
            p_value: 1.0,
            method,
        };
    }

    let diff = b.abs_diff(c) as f64;
    match method {
        McNemarMethod::Asymptotic => asymptotic(diff * diff / n as f64),
        McNemarMethod::ContinuityCorrected => {
            let d = (diff - 1.0).max(0.0);
            asymptotic(d * d / n as f64)
        }
        McNemarMethod::Exact => McNemarTest {
            chi2: None,
            p_value: (2.0 * binomial_cdf(b.min(c), n, 0.5)).min(1.0),
            method,
        },
    }
}

// ============================================================================
// Cochran–Armitage
// ============================================================================

/// Result of [`cochran_armitage`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendTest {
    pub z: f64,
    pub p_value: f64,
    /// Score-weighted excess of cases `T = Σ sᵢ(rᵢ − nᵢ p̄)`.
    pub t: f64,
    /// Null variance of `T`.
    pub var_t: f64,
}

/// Cochran–Armitage test for a linear trend in proportions across ordered
/// groups.
///
/// `scores` defaults to `0, 1, …, k−1`.
///
/// ```text
/// T     = Σ sᵢ (rᵢ − nᵢ p̄)
/// Var T = p̄(1 − p̄) [Σ nᵢ sᵢ² − (Σ nᵢ sᵢ)² / N]
/// z     = T / √Var T
/// ```
pub fn cochran_armitage(cases: &[u64], totals: &[u64], scores: Option<&[f64]>) -> Result<TrendTest> {
    if cases.len() != totals.len() {
        return Err(StatsError::LengthMismatch {
            left: "cases",
            left_len: cases.len(),
            right: "totals",
            right_len: totals.len(),
        });
    }
    if cases.len() < 2 {
        return Err(StatsError::InsufficientData {
            required: 2,
            actual: cases.len(),
        });
    }
    let default_scores: Vec<f64>;
    let scores = match scores {
        Some(s) if s.len() != cases.len() => {
            return Err(StatsError::LengthMismatch {
                left: "scores",
                left_len: s.len(),
                right: "cases",
                right_len: cases.len(),
            })
        }
        Some(s) => s,
        None => {
            default_scores = (0..cases.len()).map(|i| i as f64).collect();
            &default_scores
        }
    };
    if let Some((r, n)) = cases.iter().zip(totals).find(|(r, n)| r > n) {
        return Err(StatsError::InvalidParameter(format!(
            "cases ({r}) exceed group total ({n})"
        )));
    }
    let total: u64 = totals.iter().sum();
    if total == 0 {
        return Err(StatsError::EmptyInput("totals"));
    }

    let n = total as f64;
    let p_bar = cases.iter().sum::<u64>() as f64 / n;
    let mut t = 0.0;
    let mut sum_ns = 0.0;
    let mut sum_ns2 = 0.0;
    for ((&r, &ni), &s) in cases.iter().zip(totals).zip(scores) {
        let ni = ni as f64;
        t += s * (r as f64 - ni * p_bar);
        sum_ns += ni * s;
        sum_ns2 += ni * s * s;
    }
    let var_t = p_bar * (1.0 - p_bar) * (sum_ns2 - sum_ns * sum_ns / n);
    let z = if t == 0.0 { 0.0 } else { ratio(t, var_t.sqrt()) };

    Ok(TrendTest {
        z,
        p_value: normal_two_sided_p(z),
        t,
        var_t,
    })
}

// ============================================================================
// Mantel–Haenszel and Breslow–Day
// ============================================================================

/// Breslow–Day test of homogeneity of odds ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BreslowDay {
    pub statistic: f64,
    pub df: usize,
    pub p_value: f64,
    /// Statistic with Tarone's correction.
    pub tarone: f64,
    pub tarone_p_value: f64,
    /// False when some stratum's expected count was not solved within the
    /// iteration cap.
    pub converged: bool,
}

/// Result of [`mantel_haenszel`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MantelHaenszel {
    pub measure: Measure,
    /// Pooled estimate. Ratio measures carry `se` on the log scale.
    pub estimate: Estimate,
    /// Present for the odds ratio when at least two strata are informative.
    pub breslow_day: Option<BreslowDay>,
    /// Per-stratum estimates (0.5 added to every cell of a stratum with a
    /// zero cell).
    pub strata: Vec<Estimate>,
}

/// Mantel–Haenszel pooled estimate across strata.
///
/// | Measure | Estimator | Variance |
/// |---|---|---|
/// | OR | `Σ(ad/n) / Σ(bc/n)` | Robins–Breslow–Greenland |
/// | RR | `Σ(a n₀/n) / Σ(c n₁/n)` | Greenland–Robins |
/// | RD | `Σ((a n₀ − c n₁)/n) / Σ(n₁ n₀/n)` | Greenland–Robins |
///
/// Empty strata contribute nothing. When the estimator has a zero numerator
/// or denominator the value follows the `x/0` convention, `se` is `None` and
/// the interval is `[0, ∞]`.
///
/// # Errors
/// `EmptyInput` when no stratum has any observation, `InvalidParameter` for
/// a non-positive `z`.
pub fn mantel_haenszel(tables: &[Table2x2], measure: Measure, z: f64) -> Result<MantelHaenszel> {
    check_positive("z", z)?;
    let informative: Vec<&Table2x2> = tables.iter().filter(|t| t.total() > 0).collect();
    if informative.is_empty() {
        return Err(StatsError::EmptyInput("tables"));
    }

    let estimate = match measure {
        Measure::OddsRatio => mh_odds_ratio(&informative, z),
        Measure::RiskRatio => mh_risk_ratio(&informative, z),
        Measure::RiskDifference => mh_risk_difference(&informative, z),
    };
    let breslow_day = match measure {
        Measure::OddsRatio => breslow_day(&informative, estimate.value, BRESLOW_DAY_MAX_ITER),
        _ => None,
    };
    let strata = informative.iter().map(|t| t.estimate(measure, z)).collect();

    debug!(
        %measure,
        strata = informative.len(),
        value = estimate.value,
        "mantel-haenszel"
    );
    Ok(MantelHaenszel {
        measure,
        estimate,
        breslow_day,
        strata,
    })
}

fn undefined_ratio(value: f64) -> Estimate {
    Estimate {
        value,
        se: None,
        ci: Interval::new(0.0, f64::INFINITY),
    }
}

fn mh_odds_ratio(tables: &[&Table2x2], z: f64) -> Estimate {
    let (mut r, mut s) = (0.0, 0.0);
    let (mut pr, mut ps_qr, mut qs) = (0.0, 0.0, 0.0);
    for t in tables {
        let [a, b, c, d] = t.cells_corrected(0.0);
        let n = t.total() as f64;
        let p = (a + d) / n;
        let q = (b + c) / n;
        let ri = a * d / n;
        let si = b * c / n;
        r += ri;
        s += si;
        pr += p * ri;
        ps_qr += p * si + q * ri;
        qs += q * si;
    }
    if r == 0.0 || s == 0.0 {
        return undefined_ratio(ratio(r, s));
    }
    let var = pr / (2.0 * r * r) + ps_qr / (2.0 * r * s) + qs / (2.0 * s * s);
    Estimate::from_log((r / s).ln(), var.sqrt(), z)
}

fn mh_risk_ratio(tables: &[&Table2x2], z: f64) -> Estimate {
    let (mut num, mut den, mut var_num) = (0.0, 0.0, 0.0);
    for t in tables {
        let (a, c) = (t.a as f64, t.c as f64);
        let (n1, n0, m1) = (t.n1() as f64, t.n0() as f64, t.m1() as f64);
        let n = t.total() as f64;
        num += a * n0 / n;
        den += c * n1 / n;
        var_num += (m1 * n1 * n0 - a * c * n) / (n * n);
    }
    if num == 0.0 || den == 0.0 {
        return undefined_ratio(ratio(num, den));
    }
    let var = var_num / (num * den);
    Estimate::from_log((num / den).ln(), var.sqrt(), z)
}

fn mh_risk_difference(tables: &[&Table2x2], z: f64) -> Estimate {
    let (mut num, mut weight, mut var_num) = (0.0, 0.0, 0.0);
    for t in tables.iter().filter(|t| t.n1() > 0 && t.n0() > 0) {
        let [a, b, c, d] = t.cells_corrected(0.0);
        let (n1, n0) = (t.n1() as f64, t.n0() as f64);
        let n = t.total() as f64;
        num += (a * n0 - c * n1) / n;
        weight += n1 * n0 / n;
        var_num += (a * b * n0.powi(3) + c * d * n1.powi(3)) / (n1 * n0 * n * n);
    }
    if weight == 0.0 {
        return Estimate {
            value: f64::NAN,
            se: None,
            ci: Interval::new(f64::NAN, f64::NAN),
        };
    }
    Estimate::linear(num / weight, var_num.sqrt() / weight, z)
}

/// Expected count `A` in cell `a` under a common odds ratio `psi`, solved from
/// `A·d(A) = psi·b(A)·c(A)` by Newton steps kept inside a shrinking bracket.
///
/// Returns `(A, iterations, converged)`.
fn expected_cell(t: &Table2x2, psi: f64, max_iter: usize) -> (f64, usize, bool) {
    let (n1, n0, m1) = (t.n1() as f64, t.n0() as f64, t.m1() as f64);
    let (lo, hi) = hypergeometric_support(t.total(), t.m1(), t.n1());
    let (mut lo, mut hi) = (lo as f64, hi as f64);

    // f is increasing on the support, f(lo) ≤ 0 ≤ f(hi).
    let f = |x: f64| x * (n0 - m1 + x) - psi * (n1 - x) * (m1 - x);
    let df = |x: f64| (n0 - m1 + 2.0 * x) + psi * ((n1 - x) + (m1 - x));

    let mut x = 0.5 * (lo + hi);
    for iter in 1..=max_iter {
        let fx = f(x);
        if fx < 0.0 {
            lo = x;
        } else {
            hi = x;
        }
        let slope = df(x);
        let newton = x - fx / slope;
        let next = if slope > 0.0 && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
        if (next - x).abs() < BRESLOW_DAY_TOL * x.abs().max(1.0) {
            return (next, iter, true);
        }
        x = next;
    }
    (x, max_iter, false)
}

fn breslow_day(tables: &[&Table2x2], psi: f64, max_iter: usize) -> Option<BreslowDay> {
    if !(psi.is_finite() && psi > 0.0) {
        return None;
    }
    let mut statistic = 0.0;
    let mut sum_dev = 0.0;
    let mut sum_var = 0.0;
    let mut strata = 0usize;
    let mut converged = true;

    for (i, t) in tables.iter().enumerate() {
        let (lo, hi) = hypergeometric_support(t.total(), t.m1(), t.n1());
        if lo == hi {
            continue;
        }
        let (expected, iterations, ok) = expected_cell(t, psi, max_iter);
        converged &= ok;
        let b = t.n1() as f64 - expected;
        let c = t.m1() as f64 - expected;
        let d = t.n0() as f64 - t.m1() as f64 + expected;
        let var = 1.0 / (1.0 / expected + 1.0 / b + 1.0 / c + 1.0 / d);
        let dev = t.a as f64 - expected;
        trace!(stratum = i, expected, var, iterations, "breslow-day stratum");
        statistic += dev * dev / var;
        sum_dev += dev;
        sum_var += var;
        strata += 1;
    }
    if strata < 2 {
        return None;
    }
    if !converged {
        warn!(psi, "breslow-day expected counts did not converge");
    }

    let df = strata - 1;
    let tarone = statistic - sum_dev * sum_dev / sum_var;
    Some(BreslowDay {
        statistic,
        df,
        p_value: chi_squared_sf(statistic, df as f64),
        tarone,
        tarone_p_value: chi_squared_sf(tarone, df as f64),
        converged,
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn table() -> impl Strategy<Value = Table2x2> {
        (1_u64..40, 1_u64..40, 1_u64..40, 1_u64..40).prop_map(|(a, b, c, d)| Table2x2::new(a, b, c, d))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn fisher_p_value_in_unit_interval(t in table()) {
            let r = fisher_exact(&t);
            prop_assert!(r.p_value > 0.0 && r.p_value <= 1.0);
            prop_assert!(r.p_obs <= r.p_value * (1.0 + 1e-9));
            // The two one-sided tails overlap at the observed table.
            prop_assert!((r.p_less + r.p_greater - 1.0 - r.p_obs).abs() < 1e-9);
        }

        #[test]
        fn single_stratum_mh_equals_raw_odds_ratio(t in table()) {
            let r = mantel_haenszel(&[t], Measure::OddsRatio, 1.96).unwrap();
            let raw = (t.a * t.d) as f64 / (t.b * t.c) as f64;
            prop_assert!((r.estimate.value - raw).abs() < 1e-9 * raw.max(1.0));
        }

        #[test]
        fn breslow_day_zero_for_identical_strata(t in table()) {
            let r = mantel_haenszel(&[t, t, t], Measure::OddsRatio, 1.96).unwrap();
            let bd = r.breslow_day.unwrap();
            prop_assert!(bd.converged);
            prop_assert!(bd.statistic.abs() < 1e-8, "{bd:?}");
        }

        #[test]
        fn yates_never_exceeds_pearson(t in table()) {
            let plain = chi_squared_2x2(&t, false);
            let yates = chi_squared_2x2(&t, true);
            prop_assert!(yates.chi2 <= plain.chi2 + 1e-12);
        }
    }
}
