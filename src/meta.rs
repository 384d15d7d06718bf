//! Meta-analysis of study-level effects.
//!
//! Studies enter as an effect with its sampling variance; ratio measures are
//! pooled on the log scale. Weights are `1/vᵢ` for the fixed-effect model and
//! `1/(vᵢ + τ²)` for DerSimonian–Laird random effects.
//!
//! # Algorithm
//! ```text
//! ŷ_FE = Σwᵢyᵢ / Σwᵢ,  se = √(1/Σwᵢ)
//! Q    = Σwᵢ(yᵢ − ŷ_FE)²,  df = k − 1
//! τ²   = max(0, (Q − df) / (Σw − Σw²/Σw))
//! I²   = max(0, (Q − df)/Q),  H² = Q/df
//! ```
//!
//! Hartung–Knapp–Sidik–Jonkman replaces the random-effects standard error by
//! `√(Σw*ᵢ(yᵢ − ŷ)² / ((k−1)Σw*ᵢ))` and uses `t_{k−1}` critical values.
//!
//! Reference: DerSimonian & Laird (1986), *Controlled Clinical Trials* 7(3).
//!
//! # Examples
//! ```
//! use clinstat::config::Defaults;
//! use clinstat::meta::{random_effects, Study};
//! let studies = [Study::new(0.5, 0.04).unwrap(); 3];
//! let r = random_effects(&studies, false, &Defaults::default()).unwrap();
//! assert_eq!(r.tau2, 0.0);
//! assert!((r.estimate - 0.5).abs() < 1e-12);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Defaults;
use crate::distributions::{chi_squared_sf, normal_two_sided_p, t_cdf, t_quantile};
use crate::error::{Result, StatsError};
use crate::hypothesis::{mantel_haenszel, MantelHaenszel};
use crate::stats::{kahan_sum, linear_regression, weighted_mean, weighted_sum_squares};
use crate::table::{ratio, Interval, Measure, Table2x2};

/// One study: an effect on the analysis scale and its sampling variance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Study {
    pub effect: f64,
    pub variance: f64,
}

impl Study {
    /// # Errors
    /// `InvalidParameter` unless `effect` is finite and `variance` is finite
    /// and positive.
    pub fn new(effect: f64, variance: f64) -> Result<Self> {
        let study = Self { effect, variance };
        study.validate()?;
        Ok(study)
    }

    /// Recovers a study from a reported estimate and its confidence interval.
    ///
    /// With `log_scale` the estimate and bounds are ratios and are logged
    /// first. `se = (upper − lower) / (2z)`.
    ///
    /// ```
    /// use clinstat::meta::Study;
    /// let s = Study::from_ci(2.0, 1.0, 4.0, true, 1.959964).unwrap();
    /// assert!((s.effect - 2.0_f64.ln()).abs() < 1e-12);
    /// ```
    pub fn from_ci(estimate: f64, lower: f64, upper: f64, log_scale: bool, z: f64) -> Result<Self> {
        if !(lower <= estimate && estimate <= upper) {
            return Err(StatsError::InvalidParameter(format!(
                "estimate {estimate} lies outside its interval [{lower}, {upper}]"
            )));
        }
        if log_scale && lower <= 0.0 {
            return Err(StatsError::InvalidParameter(format!(
                "ratio interval must be positive, got lower = {lower}"
            )));
        }
        let g = |x: f64| if log_scale { x.ln() } else { x };
        let se = (g(upper) - g(lower)) / (2.0 * z);
        Self::new(g(estimate), se * se)
    }

    /// Study effect from a 2×2 table (see [`Table2x2::effect`]).
    pub fn from_table(table: &Table2x2, measure: Measure) -> Self {
        let (effect, variance) = table.effect(measure);
        Self { effect, variance }
    }

    pub fn se(&self) -> f64 {
        self.variance.sqrt()
    }

    fn validate(&self) -> Result<()> {
        if !self.effect.is_finite() {
            return Err(StatsError::InvalidParameter(format!(
                "study effect must be finite, got {}",
                self.effect
            )));
        }
        if !(self.variance.is_finite() && self.variance > 0.0) {
            return Err(StatsError::InvalidParameter(format!(
                "study variance must be finite and positive, got {}",
                self.variance
            )));
        }
        Ok(())
    }
}

fn check_studies(studies: &[Study], required: usize) -> Result<()> {
    if studies.is_empty() {
        return Err(StatsError::EmptyInput("studies"));
    }
    if studies.len() < required {
        return Err(StatsError::InsufficientData {
            required,
            actual: studies.len(),
        });
    }
    studies.iter().try_for_each(Study::validate)
}

/// Pooling model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Model {
    FixedEffect,
    RandomEffects,
}

/// Pooled estimate with heterogeneity statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaResult {
    pub model: Model,
    pub k: usize,
    pub estimate: f64,
    pub se: f64,
    pub ci: Interval,
    /// Test statistic for `estimate = 0` (a t statistic under HKSJ).
    pub statistic: f64,
    pub p_value: f64,
    /// Cochran's Q.
    pub q: f64,
    pub df: usize,
    pub q_p_value: f64,
    pub i2: f64,
    pub h2: f64,
    pub tau2: f64,
    /// Random-effects prediction interval for a new study.
    pub prediction: Option<Interval>,
    pub hksj: bool,
}

struct Heterogeneity {
    fixed: f64,
    fixed_se: f64,
    q: f64,
    df: usize,
    tau2: f64,
}

fn heterogeneity(effects: &[f64], weights: &[f64]) -> Heterogeneity {
    let sum_w = kahan_sum(weights.iter().copied());
    let fixed = weighted_mean(effects, weights).unwrap_or(f64::NAN);
    let q = weighted_sum_squares(effects, weights, fixed);
    let df = effects.len() - 1;
    let c = sum_w - kahan_sum(weights.iter().map(|w| w * w)) / sum_w;
    let tau2 = if c > 0.0 {
        ((q - df as f64) / c).max(0.0)
    } else {
        0.0
    };
    Heterogeneity {
        fixed,
        fixed_se: (1.0 / sum_w).sqrt(),
        q,
        df,
        tau2,
    }
}

fn i_squared(q: f64, df: usize) -> f64 {
    if q > 0.0 {
        ((q - df as f64) / q).max(0.0)
    } else {
        0.0
    }
}

fn inverse_variances(studies: &[Study], tau2: f64) -> Vec<f64> {
    studies.iter().map(|s| 1.0 / (s.variance + tau2)).collect()
}

fn effects(studies: &[Study]) -> Vec<f64> {
    studies.iter().map(|s| s.effect).collect()
}

/// Inverse-variance fixed-effect pooling.
pub fn fixed_effect(studies: &[Study], defaults: &Defaults) -> Result<MetaResult> {
    check_studies(studies, 1)?;
    defaults.validate()?;
    let y = effects(studies);
    let w = inverse_variances(studies, 0.0);
    let h = heterogeneity(&y, &w);
    let statistic = h.fixed / h.fixed_se;
    Ok(MetaResult {
        model: Model::FixedEffect,
        k: studies.len(),
        estimate: h.fixed,
        se: h.fixed_se,
        ci: Interval::wald(h.fixed, h.fixed_se, defaults.z()),
        statistic,
        p_value: normal_two_sided_p(statistic),
        q: h.q,
        df: h.df,
        q_p_value: q_p_value(h.q, h.df),
        i2: i_squared(h.q, h.df),
        h2: ratio(h.q, h.df as f64),
        tau2: 0.0,
        prediction: None,
        hksj: false,
    })
}

fn q_p_value(q: f64, df: usize) -> f64 {
    if df == 0 {
        f64::NAN
    } else {
        chi_squared_sf(q, df as f64)
    }
}

/// DerSimonian–Laird random-effects pooling.
///
/// With `hksj` and at least two studies, the Hartung–Knapp–Sidik–Jonkman
/// standard error and `t_{k−1}` interval replace the normal ones. The
/// prediction interval `ŷ ± t_{k−2}√(τ² + se²)` falls back to a normal
/// critical value when `k ≤ 2`.
pub fn random_effects(studies: &[Study], hksj: bool, defaults: &Defaults) -> Result<MetaResult> {
    check_studies(studies, 1)?;
    defaults.validate()?;
    let k = studies.len();
    let y = effects(studies);
    let h = heterogeneity(&y, &inverse_variances(studies, 0.0));
    let w = inverse_variances(studies, h.tau2);
    let sum_w = kahan_sum(w.iter().copied());
    let estimate = weighted_mean(&y, &w).unwrap_or(f64::NAN);
    let level = 1.0 - (1.0 - defaults.confidence) / 2.0;

    let use_hksj = hksj && k >= 2;
    let (se, ci, statistic, p_value) = if use_hksj {
        let df = (k - 1) as f64;
        let q_star = weighted_sum_squares(&y, &w, estimate) / df;
        let se = (q_star / sum_w).sqrt();
        let t = t_quantile(level, df);
        let statistic = ratio(estimate, se);
        let p = 2.0 * (1.0 - t_cdf(statistic.abs(), df));
        (se, Interval::wald(estimate, se, t), statistic, p.min(1.0))
    } else {
        let se = (1.0 / sum_w).sqrt();
        let statistic = estimate / se;
        (
            se,
            Interval::wald(estimate, se, defaults.z()),
            statistic,
            normal_two_sided_p(statistic),
        )
    };

    let spread = (h.tau2 + se * se).sqrt();
    let crit = if k > 2 {
        t_quantile(level, (k - 2) as f64)
    } else {
        defaults.z()
    };
    debug!(k, tau2 = h.tau2, q = h.q, estimate, "random effects");

    Ok(MetaResult {
        model: Model::RandomEffects,
        k,
        estimate,
        se,
        ci,
        statistic,
        p_value,
        q: h.q,
        df: h.df,
        q_p_value: q_p_value(h.q, h.df),
        i2: i_squared(h.q, h.df),
        h2: ratio(h.q, h.df as f64),
        tau2: h.tau2,
        prediction: Some(Interval::wald(estimate, spread, crit)),
        hksj: use_hksj,
    })
}

// ============================================================================
// Raw-table pooling
// ============================================================================

/// Inverse-variance and Mantel–Haenszel pooling of the same tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePooling {
    pub measure: Measure,
    pub studies: Vec<Study>,
    /// Random-effects pooling of the per-table effects.
    pub inverse_variance: MetaResult,
    pub mantel_haenszel: MantelHaenszel,
}

/// Pools 2×2 tables by both random-effects inverse variance and
/// Mantel–Haenszel.
///
/// Per-table effects add 0.5 to every cell of a table with a zero cell.
/// Ratio measures are pooled on the log scale; the inverse-variance result
/// stays on that scale while the Mantel–Haenszel estimate is reported as a
/// ratio.
pub fn pool_tables(tables: &[Table2x2], measure: Measure, defaults: &Defaults) -> Result<TablePooling> {
    if tables.is_empty() {
        return Err(StatsError::EmptyInput("tables"));
    }
    if let Some(t) = tables.iter().find(|t| t.n1() == 0 || t.n0() == 0) {
        return Err(StatsError::InvalidParameter(format!(
            "table {t:?} has an empty arm"
        )));
    }
    let studies: Vec<Study> = tables.iter().map(|t| Study::from_table(t, measure)).collect();
    let inverse_variance = random_effects(&studies, false, defaults)?;
    let mantel_haenszel = mantel_haenszel(tables, measure, defaults.z())?;
    Ok(TablePooling {
        measure,
        studies,
        inverse_variance,
        mantel_haenszel,
    })
}

// ============================================================================
// Small-study effects
// ============================================================================

/// Egger's regression test for funnel-plot asymmetry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EggerTest {
    pub intercept: f64,
    pub intercept_se: f64,
    /// Slope of the standard normal deviate on precision; estimates the
    /// effect adjusted for small-study bias.
    pub slope: f64,
    pub slope_se: f64,
    pub t: f64,
    pub df: usize,
    pub p_value: f64,
}

/// Egger's test: ordinary least squares of `yᵢ/seᵢ` on `1/seᵢ`, testing the
/// intercept with `t_{k−2}`.
///
/// # Errors
/// `InsufficientData` for fewer than three studies; `InvalidParameter` when
/// every study has the same variance.
pub fn egger(studies: &[Study]) -> Result<EggerTest> {
    check_studies(studies, 3)?;
    let precision: Vec<f64> = studies.iter().map(|s| 1.0 / s.se()).collect();
    let deviate: Vec<f64> = studies.iter().map(|s| s.effect / s.se()).collect();
    let fit = linear_regression(&precision, &deviate).ok_or_else(|| {
        StatsError::InvalidParameter("Egger's test needs studies of differing precision".into())
    })?;
    let t = ratio(fit.intercept, fit.intercept_se);
    let df = fit.df as f64;
    Ok(EggerTest {
        intercept: fit.intercept,
        intercept_se: fit.intercept_se,
        slope: fit.slope,
        slope_se: fit.slope_se,
        t,
        df: fit.df,
        p_value: (2.0 * (1.0 - t_cdf(t.abs(), df))).min(1.0),
    })
}

// ============================================================================
// Sensitivity analyses
// ============================================================================

/// Pooled result with one study removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaveOneOut {
    /// Index of the omitted study.
    pub omitted: usize,
    pub result: MetaResult,
}

/// Random-effects pooling repeated with each study left out in turn.
pub fn leave_one_out(studies: &[Study], hksj: bool, defaults: &Defaults) -> Result<Vec<LeaveOneOut>> {
    check_studies(studies, 2)?;
    (0..studies.len())
        .map(|omitted| {
            let rest: Vec<Study> = studies
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != omitted)
                .map(|(_, s)| *s)
                .collect();
            Ok(LeaveOneOut {
                omitted,
                result: random_effects(&rest, hksj, defaults)?,
            })
        })
        .collect()
}

/// Random-effects pooling of each growing prefix of `studies`.
///
/// The first step is the first study itself with a normal interval.
pub fn cumulative(studies: &[Study], defaults: &Defaults) -> Result<Vec<MetaResult>> {
    check_studies(studies, 1)?;
    defaults.validate()?;
    let first = single_study(&studies[0], defaults);
    let mut steps = Vec::with_capacity(studies.len());
    steps.push(first);
    for end in 2..=studies.len() {
        steps.push(random_effects(&studies[..end], false, defaults)?);
    }
    Ok(steps)
}

fn single_study(study: &Study, defaults: &Defaults) -> MetaResult {
    let se = study.se();
    let z = defaults.z();
    let statistic = study.effect / se;
    MetaResult {
        model: Model::RandomEffects,
        k: 1,
        estimate: study.effect,
        se,
        ci: Interval::wald(study.effect, se, z),
        statistic,
        p_value: normal_two_sided_p(statistic),
        q: 0.0,
        df: 0,
        q_p_value: f64::NAN,
        i2: 0.0,
        h2: f64::NAN,
        tau2: 0.0,
        prediction: Some(Interval::wald(study.effect, se, z)),
        hksj: false,
    }
}

/// Trim-and-fill adjustment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrimAndFill {
    /// Estimated number of missing studies.
    pub k0: usize,
    /// Imputed mirror-image studies.
    pub filled: Vec<Study>,
    /// Random-effects pooling of the observed plus imputed studies.
    pub result: MetaResult,
}

/// Duval–Tweedie trim-and-fill with the L₀ estimator.
///
/// Studies are assumed missing on the side of smaller effects. Iterates:
/// trim the `k₀` largest effects, re-centre on the fixed-effect estimate of
/// the rest, rank `|yᵢ − centre|` over all studies and set
/// `k₀ = round((4Tₙ − k(k+1)) / (2k − 1))` where `Tₙ` is the rank sum of
/// the positive deviations. The `k₀` largest studies are then reflected
/// about the final centre. Flip the sign of every effect to impute on the
/// other side.
pub fn trim_and_fill(studies: &[Study], defaults: &Defaults) -> Result<TrimAndFill> {
    check_studies(studies, 3)?;
    defaults.validate()?;
    let k = studies.len();
    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&i, &j| studies[i].effect.total_cmp(&studies[j].effect));

    let centre_without = |k0: usize| -> f64 {
        let kept: Vec<Study> = order[..k - k0].iter().map(|&i| studies[i]).collect();
        let y = effects(&kept);
        weighted_mean(&y, &inverse_variances(&kept, 0.0)).unwrap_or(f64::NAN)
    };

    let mut k0 = 0;
    let mut centre = centre_without(0);
    for iteration in 1..=k {
        let t_n = positive_rank_sum(studies, centre);
        let kf = k as f64;
        let l0 = (4.0 * t_n - kf * (kf + 1.0)) / (2.0 * kf - 1.0);
        let next = (l0.round().max(0.0) as usize).min(k - 1);
        debug!(iteration, centre, l0, k0 = next, "trim and fill");
        if next == k0 {
            break;
        }
        k0 = next;
        centre = centre_without(k0);
    }

    let filled: Vec<Study> = order[k - k0..]
        .iter()
        .map(|&i| Study {
            effect: 2.0 * centre - studies[i].effect,
            variance: studies[i].variance,
        })
        .collect();
    let augmented: Vec<Study> = studies.iter().chain(&filled).copied().collect();
    let result = random_effects(&augmented, false, defaults)?;
    Ok(TrimAndFill { k0, filled, result })
}

/// Sum of the ranks of `|yᵢ − centre|` over studies above `centre`, with
/// ties given their average rank.
fn positive_rank_sum(studies: &[Study], centre: f64) -> f64 {
    let mut deviations: Vec<f64> = studies.iter().map(|s| s.effect - centre).collect();
    deviations.sort_by(|a, b| a.abs().total_cmp(&b.abs()));
    let mut sum = 0.0;
    let mut i = 0;
    while i < deviations.len() {
        let mut j = i + 1;
        while j < deviations.len() && deviations[j].abs() == deviations[i].abs() {
            j += 1;
        }
        let rank = (i + j + 1) as f64 / 2.0;
        sum += rank * deviations[i..j].iter().filter(|d| **d > 0.0).count() as f64;
        i = j;
    }
    sum
}

// ============================================================================
// Subgroups
// ============================================================================

/// One subgroup's pooled result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subgroup {
    pub label: String,
    pub result: MetaResult,
}

/// Q-decomposition across subgroups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubgroupAnalysis {
    pub overall: MetaResult,
    /// Subgroups in label order.
    pub subgroups: Vec<Subgroup>,
    /// `Σ Qᵢ`.
    pub q_within: f64,
    /// `Q_overall − Q_within`.
    pub q_between: f64,
    pub df_between: usize,
    pub p_between: f64,
}

/// Pools each subgroup with random effects and tests for differences
/// between subgroups through `Q_between` on `groups − 1` degrees of freedom.
pub fn subgroup<S: AsRef<str>>(
    studies: &[Study],
    labels: &[S],
    defaults: &Defaults,
) -> Result<SubgroupAnalysis> {
    if studies.len() != labels.len() {
        return Err(StatsError::LengthMismatch {
            left: "studies",
            left_len: studies.len(),
            right: "labels",
            right_len: labels.len(),
        });
    }
    check_studies(studies, 1)?;
    let mut groups: BTreeMap<&str, Vec<Study>> = BTreeMap::new();
    for (study, label) in studies.iter().zip(labels) {
        groups.entry(label.as_ref()).or_default().push(*study);
    }

    let overall = random_effects(studies, false, defaults)?;
    let subgroups = groups
        .into_iter()
        .map(|(label, members)| {
            Ok(Subgroup {
                label: label.to_string(),
                result: random_effects(&members, false, defaults)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let q_within = kahan_sum(subgroups.iter().map(|g| g.result.q));
    let q_between = (overall.q - q_within).max(0.0);
    let df_between = subgroups.len() - 1;
    let p_between = q_p_value(q_between, df_between);
    Ok(SubgroupAnalysis {
        overall,
        subgroups,
        q_within,
        q_between,
        df_between,
        p_between,
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn studies() -> impl Strategy<Value = Vec<Study>> {
        proptest::collection::vec((-2.0_f64..2.0, 0.01_f64..1.0), 2..15).prop_map(|v| {
            v.into_iter()
                .map(|(effect, variance)| Study { effect, variance })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn random_effects_interval_is_wider(s in studies()) {
            let d = Defaults::default();
            let fe = fixed_effect(&s, &d).unwrap();
            let re = random_effects(&s, false, &d).unwrap();
            prop_assert!(re.tau2 >= 0.0);
            prop_assert!(re.se >= fe.se - 1e-12);
            prop_assert!((0.0..=1.0).contains(&re.i2));
            prop_assert!(re.ci.contains(re.estimate));
        }

        #[test]
        fn pooled_estimate_within_study_range(s in studies()) {
            let re = random_effects(&s, false, &Defaults::default()).unwrap();
            let lo = s.iter().map(|x| x.effect).fold(f64::INFINITY, f64::min);
            let hi = s.iter().map(|x| x.effect).fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(re.estimate >= lo - 1e-9 && re.estimate <= hi + 1e-9);
        }
    }
}
