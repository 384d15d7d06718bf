//! Diagnostic test accuracy.
//!
//! Accuracy tables use the [`Table2x2`] layout with the index test in rows
//! and the reference standard in columns:
//!
//! ```text
//!              disease   no disease
//! test +         TP          FP
//! test −         FN          TN
//! ```

use serde::Serialize;

use crate::error::{check_closed_unit, check_positive, Result, StatsError};
use crate::intervals::wilson;
use crate::table::{ratio, Estimate, Interval, Table2x2};

/// Proportion `x/n` with a Wilson interval. An empty denominator gives NaN.
fn proportion(x: u64, n: u64, z: f64) -> Result<Estimate> {
    if n == 0 {
        return Ok(Estimate {
            value: f64::NAN,
            se: None,
            ci: Interval::new(f64::NAN, f64::NAN),
        });
    }
    let p = x as f64 / n as f64;
    Ok(Estimate {
        value: p,
        se: Some((p * (1.0 - p) / n as f64).sqrt()),
        ci: wilson(x, n, z)?,
    })
}

/// Accuracy summary of a binary test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiagnosticAccuracy {
    pub sensitivity: Estimate,
    pub specificity: Estimate,
    pub ppv: Estimate,
    pub npv: Estimate,
    pub accuracy: Estimate,
    pub prevalence: Estimate,
    /// `Se / (1 − Sp)`.
    pub lr_positive: Estimate,
    /// `(1 − Se) / Sp`.
    pub lr_negative: Estimate,
    /// `TP·TN / (FP·FN)`.
    pub diagnostic_odds_ratio: Estimate,
    /// `Se + Sp − 1`.
    pub youden: f64,
}

/// Sensitivity, specificity, predictive values, accuracy and prevalence with
/// Wilson intervals, plus likelihood ratios and the diagnostic odds ratio
/// with log-scale intervals.
///
/// Ratios with a zero denominator follow the `x/0` convention and carry the
/// interval `[0, ∞]`.
///
/// # Examples
/// ```
/// use clinstat::diagnostic::diagnostic_accuracy;
/// use clinstat::table::Table2x2;
/// let d = diagnostic_accuracy(&Table2x2::new(90, 20, 10, 80), 1.959964).unwrap();
/// assert!((d.sensitivity.value - 0.9).abs() < 1e-12);
/// assert!((d.lr_positive.value - 4.5).abs() < 1e-12);
/// ```
pub fn diagnostic_accuracy(table: &Table2x2, z: f64) -> Result<DiagnosticAccuracy> {
    check_positive("z", z)?;
    if table.total() == 0 {
        return Err(StatsError::EmptyInput("table"));
    }
    let Table2x2 { a: tp, b: fp, c: fn_, d: tn } = *table;
    let diseased = tp + fn_;
    let healthy = fp + tn;

    let sensitivity = proportion(tp, diseased, z)?;
    let specificity = proportion(tn, healthy, z)?;
    let se = sensitivity.value;
    let sp = specificity.value;

    let (tpf, fpf, fnf, tnf) = (tp as f64, fp as f64, fn_ as f64, tn as f64);
    let lr_pos_se = (tp > 0 && fp > 0)
        .then(|| (1.0 / tpf - 1.0 / diseased as f64 + 1.0 / fpf - 1.0 / healthy as f64).sqrt());
    let lr_neg_se = (fn_ > 0 && tn > 0)
        .then(|| (1.0 / fnf - 1.0 / diseased as f64 + 1.0 / tnf - 1.0 / healthy as f64).sqrt());
    let dor_se = (tp > 0 && fp > 0 && fn_ > 0 && tn > 0)
        .then(|| (1.0 / tpf + 1.0 / fpf + 1.0 / fnf + 1.0 / tnf).sqrt());

    Ok(DiagnosticAccuracy {
        sensitivity,
        specificity,
        ppv: proportion(tp, tp + fp, z)?,
        npv: proportion(tn, tn + fn_, z)?,
        accuracy: proportion(tp + tn, table.total(), z)?,
        prevalence: proportion(diseased, table.total(), z)?,
        lr_positive: Estimate::ratio(ratio(se, 1.0 - sp), lr_pos_se, z),
        lr_negative: Estimate::ratio(ratio(1.0 - se, sp), lr_neg_se, z),
        diagnostic_odds_ratio: Estimate::ratio(ratio(tpf * tnf, fpf * fnf), dor_se, z),
        youden: se + sp - 1.0,
    })
}

/// Pre- to post-test conversion on the odds scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fagan {
    pub pre_test_odds: f64,
    pub post_test_odds: f64,
    pub post_test_probability: f64,
}

/// Fagan nomogram: `post-test odds = pre-test odds × LR`.
///
/// A pre-test probability of 1 stays 1 for any positive likelihood ratio.
pub fn fagan(pre_test_probability: f64, likelihood_ratio: f64) -> Result<Fagan> {
    check_closed_unit("pre_test_probability", pre_test_probability)?;
    if !(likelihood_ratio >= 0.0) {
        return Err(StatsError::InvalidParameter(format!(
            "likelihood ratio must be non-negative, got {likelihood_ratio}"
        )));
    }
    let pre_test_odds = ratio(pre_test_probability, 1.0 - pre_test_probability);
    let post_test_odds = pre_test_odds * likelihood_ratio;
    let post_test_probability = if post_test_odds.is_infinite() {
        1.0
    } else {
        post_test_odds / (1.0 + post_test_odds)
    };
    Ok(Fagan {
        pre_test_odds,
        post_test_odds,
        post_test_probability,
    })
}

// ============================================================================
// ROC
// ============================================================================

/// One operating point: scores at or above `threshold` are called positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RocPoint {
    pub threshold: f64,
    pub fpr: f64,
    pub tpr: f64,
}

/// Empirical ROC curve with its trapezoidal area.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RocCurve {
    /// From `(0, 0)` at threshold `+∞` to `(1, 1)`.
    pub points: Vec<RocPoint>,
    pub auc: f64,
    /// Hanley–McNeil standard error.
    pub se: f64,
    pub ci: Interval,
}

/// Empirical ROC analysis of a continuous marker, higher scores indicating
/// disease.
///
/// The trapezoidal area equals the Mann–Whitney probability
/// `P(X₊ > X₋) + ½P(X₊ = X₋)`. The standard error follows Hanley & McNeil
/// (1982):
///
/// ```text
/// Q₁ = A/(2 − A),  Q₂ = 2A²/(1 + A)
/// SE = √((A(1 − A) + (n₊ − 1)(Q₁ − A²) + (n₋ − 1)(Q₂ − A²)) / (n₊ n₋))
/// ```
pub fn roc_auc(diseased: &[f64], healthy: &[f64], z: f64) -> Result<RocCurve> {
    if diseased.is_empty() {
        return Err(StatsError::EmptyInput("diseased"));
    }
    if healthy.is_empty() {
        return Err(StatsError::EmptyInput("healthy"));
    }
    if diseased.iter().chain(healthy).any(|x| x.is_nan()) {
        return Err(StatsError::InvalidParameter("scores must not be NaN".into()));
    }
    check_positive("z", z)?;

    let mut thresholds: Vec<f64> = diseased.iter().chain(healthy).copied().collect();
    thresholds.sort_by(|a, b| b.total_cmp(a));
    thresholds.dedup();

    let (n_pos, n_neg) = (diseased.len() as f64, healthy.len() as f64);
    let at_or_above = |scores: &[f64], t: f64| scores.iter().filter(|&&s| s >= t).count() as f64;

    let mut points = Vec::with_capacity(thresholds.len() + 1);
    points.push(RocPoint {
        threshold: f64::INFINITY,
        fpr: 0.0,
        tpr: 0.0,
    });
    points.extend(thresholds.iter().map(|&t| RocPoint {
        threshold: t,
        fpr: at_or_above(healthy, t) / n_neg,
        tpr: at_or_above(diseased, t) / n_pos,
    }));

    let auc: f64 = points
        .windows(2)
        .map(|w| (w[1].fpr - w[0].fpr) * (w[1].tpr + w[0].tpr) / 2.0)
        .sum();

    let q1 = auc / (2.0 - auc);
    let q2 = 2.0 * auc * auc / (1.0 + auc);
    let a2 = auc * auc;
    let var = (auc * (1.0 - auc) + (n_pos - 1.0) * (q1 - a2) + (n_neg - 1.0) * (q2 - a2))
        / (n_pos * n_neg);
    let se = var.max(0.0).sqrt();

    Ok(RocCurve {
        points,
        auc,
        se,
        ci: Interval::wald(auc, se, z).clip_unit(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const Z: f64 = 1.959963984540054;

    #[test]
    fn test_accuracy_measures() {
        let d = diagnostic_accuracy(&Table2x2::new(90, 20, 10, 80), Z).unwrap();
        assert!((d.sensitivity.value - 0.9).abs() < 1e-12);
        assert!((d.specificity.value - 0.8).abs() < 1e-12);
        assert!((d.ppv.value - 90.0 / 110.0).abs() < 1e-12);
        assert!((d.npv.value - 80.0 / 90.0).abs() < 1e-12);
        assert!((d.accuracy.value - 0.85).abs() < 1e-12);
        assert!((d.prevalence.value - 0.5).abs() < 1e-12);
        assert!((d.lr_positive.value - 4.5).abs() < 1e-12);
        assert!((d.lr_negative.value - 0.125).abs() < 1e-12);
        assert!((d.diagnostic_odds_ratio.value - 36.0).abs() < 1e-9);
        assert!((d.youden - 0.7).abs() < 1e-12);
        let w = wilson(90, 100, Z).unwrap();
        assert_eq!(d.sensitivity.ci, w);
        assert!(d.lr_positive.ci.contains(4.5));
    }

    #[test]
    fn test_perfect_specificity_gives_infinite_lr() {
        let d = diagnostic_accuracy(&Table2x2::new(40, 0, 10, 50), Z).unwrap();
        assert_eq!(d.specificity.value, 1.0);
        assert_eq!(d.lr_positive.value, f64::INFINITY);
        assert!(d.lr_positive.se.is_none());
        assert_eq!(d.diagnostic_odds_ratio.value, f64::INFINITY);
    }

    #[test]
    fn test_no_diseased_subjects() {
        let d = diagnostic_accuracy(&Table2x2::new(0, 5, 0, 45), Z).unwrap();
        assert!(d.sensitivity.value.is_nan());
        assert!(d.youden.is_nan());
        assert!(diagnostic_accuracy(&Table2x2::new(0, 0, 0, 0), Z).is_err());
    }

    #[test]
    fn test_fagan() {
        let f = fagan(0.2, 4.5).unwrap();
        assert!((f.pre_test_odds - 0.25).abs() < 1e-15);
        assert!((f.post_test_odds - 1.125).abs() < 1e-12);
        assert!((f.post_test_probability - 1.125 / 2.125).abs() < 1e-12);
        assert_eq!(fagan(1.0, 2.0).unwrap().post_test_probability, 1.0);
        assert_eq!(fagan(0.3, 0.0).unwrap().post_test_probability, 0.0);
        assert!(fagan(1.2, 2.0).is_err());
        assert!(fagan(0.2, -1.0).is_err());
    }

    #[test]
    fn test_roc_auc_separated() {
        let roc = roc_auc(&[0.9, 0.8, 0.7, 0.6], &[0.65, 0.5, 0.4, 0.3], Z).unwrap();
        assert!((roc.auc - 15.0 / 16.0).abs() < 1e-12);
        assert!((roc.se - 0.098103666).abs() < 1e-8);
        assert_eq!(roc.points.first().map(|p| (p.fpr, p.tpr)), Some((0.0, 0.0)));
        assert_eq!(roc.points.last().map(|p| (p.fpr, p.tpr)), Some((1.0, 1.0)));
        assert!(roc.ci.upper <= 1.0);
    }

    #[test]
    fn test_roc_auc_ties() {
        let roc = roc_auc(&[1.0, 1.0], &[1.0, 0.0], Z).unwrap();
        assert!((roc.auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_invalid() {
        assert!(roc_auc(&[], &[1.0], Z).is_err());
        assert!(roc_auc(&[1.0], &[], Z).is_err());
        assert!(roc_auc(&[f64::NAN], &[1.0], Z).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn auc_matches_mann_whitney(
            pos in proptest::collection::vec(0_u8..20, 1..30),
            neg in proptest::collection::vec(0_u8..20, 1..30),
        ) {
            let pos: Vec<f64> = pos.into_iter().map(f64::from).collect();
            let neg: Vec<f64> = neg.into_iter().map(f64::from).collect();
            let roc = roc_auc(&pos, &neg, 1.96).unwrap();
            let mut wins = 0.0;
            for p in &pos {
                for n in &neg {
                    wins += if p > n { 1.0 } else if p == n { 0.5 } else { 0.0 };
                }
            }
            let mw = wins / (pos.len() * neg.len()) as f64;
            prop_assert!((roc.auc - mw).abs() < 1e-12);
            prop_assert!(roc.se >= 0.0);
        }

        #[test]
        fn youden_in_range(tp in 1_u64..100, fp in 1_u64..100, fn_ in 1_u64..100, tn in 1_u64..100) {
            let d = diagnostic_accuracy(&Table2x2::new(tp, fp, fn_, tn), 1.96).unwrap();
            prop_assert!(d.youden >= -1.0 && d.youden <= 1.0);
            prop_assert!(d.lr_positive.ci.contains(d.lr_positive.value));
        }
    }
}
