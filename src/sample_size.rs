//! Sample-size formulas for common trial designs.
//!
//! Every function takes the design settings from [`Defaults`]: two-sided
//! `alpha` unless stated otherwise, target `power`, and the allocation
//! `ratio = n₂/n₁`. Counts are rounded up.
//!
//! | Design | Function |
//! |---|---|
//! | Two proportions (normal, Fleiss, arcsine) | [`two_proportions`] |
//! | Two means | [`two_means`] |
//! | Time to event (Schoenfeld, Freedman) | [`survival`] |
//! | Non-inferiority / equivalence | [`non_inferiority_proportions`], [`equivalence_proportions`] |
//! | Cluster randomized | [`design_effect`], [`cluster_randomized`] |
//! | Stepped wedge | [`stepped_wedge`] |
//! | Ordinal outcome (proportional odds) | [`ordinal_shift`] |
//! | Multi-arm | [`multi_arm`] |
//! | Crossover | [`crossover`] |
//! | Diagnostic accuracy | [`diagnostic_precision`] |
//! | Group sequential | [`group_sequential`], [`spending_boundaries`] |
//!
//! # Examples
//! ```
//! use clinstat::config::Defaults;
//! use clinstat::sample_size::{two_proportions, ProportionMethod};
//! let n = two_proportions(0.30, 0.15, ProportionMethod::Normal, &Defaults::default()).unwrap();
//! assert_eq!(n.n1, 121);
//! assert_eq!(n.total, 242);
//! ```

use std::f64::consts::E;

use serde::Serialize;
use tracing::debug;

use crate::config::Defaults;
use crate::distributions::{normal_cdf, normal_quantile};
use crate::error::{check_open_unit, check_positive, Result, StatsError};

/// Slack below an integer that still rounds down to it.
const CEIL_SLACK: f64 = 1e-9;

fn ceil_count(x: f64) -> u64 {
    (x - CEIL_SLACK).ceil().max(0.0) as u64
}

/// Per-arm and total counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleSize {
    pub n1: u64,
    pub n2: u64,
    pub total: u64,
}

impl SampleSize {
    /// Rounds a fractional first-arm size up, with `n₂ = ⌈ratio · n₁⌉`.
    pub fn from_n1(n1: f64, ratio: f64) -> Self {
        let (n1, n2) = (ceil_count(n1), ceil_count(n1 * ratio));
        Self {
            n1,
            n2,
            total: n1 + n2,
        }
    }

    /// Splits a fractional total as `1 : ratio`, rounding each arm up.
    pub fn from_total(total: f64, ratio: f64) -> Self {
        Self::from_n1(total / (1.0 + ratio), ratio)
    }

    /// Both arms multiplied by `factor`, rounded up.
    pub fn inflate(&self, factor: f64) -> Self {
        let (n1, n2) = (
            ceil_count(self.n1 as f64 * factor),
            ceil_count(self.n2 as f64 * factor),
        );
        Self {
            n1,
            n2,
            total: n1 + n2,
        }
    }
}

fn check_distinct(p1: f64, p2: f64) -> Result<()> {
    if p1 == p2 {
        return Err(StatsError::InvalidParameter(
            "proportions must differ".into(),
        ));
    }
    Ok(())
}

// ============================================================================
// Superiority
// ============================================================================

/// Approximation used by [`two_proportions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProportionMethod {
    /// Normal approximation with pooled variance under H₀.
    Normal,
    /// Normal approximation with the Fleiss continuity correction.
    Fleiss,
    /// Arcsine (variance-stabilising) transform.
    Arcsine,
}

/// Sample size to detect `p₁ ≠ p₂`.
///
/// With `r = n₂/n₁` and `p̄ = (p₁ + r·p₂)/(1 + r)`:
///
/// ```text
/// Normal   n₁ = [z₁₋α/₂ √(p̄q̄(1+1/r)) + z₁₋β √(p₁q₁ + p₂q₂/r)]² / (p₁ − p₂)²
/// Fleiss   n₁' = n₁/4 · [1 + √(1 + 2(r+1)/(r·n₁·|p₁ − p₂|))]²
/// Arcsine  n₁ = (z₁₋α/₂ + z₁₋β)² (1 + 1/r) / (2 asin √p₁ − 2 asin √p₂)²
/// ```
pub fn two_proportions(
    p1: f64,
    p2: f64,
    method: ProportionMethod,
    defaults: &Defaults,
) -> Result<SampleSize> {
    check_open_unit("p1", p1)?;
    check_open_unit("p2", p2)?;
    check_distinct(p1, p2)?;
    defaults.validate()?;

    let r = defaults.ratio;
    let (za, zb) = (defaults.z_alpha_two_sided(), defaults.z_beta());
    let delta = (p1 - p2).abs();

    let normal = || {
        let p_bar = (p1 + r * p2) / (1.0 + r);
        let null = za * (p_bar * (1.0 - p_bar) * (1.0 + 1.0 / r)).sqrt();
        let alt = zb * (p1 * (1.0 - p1) + p2 * (1.0 - p2) / r).sqrt();
        (null + alt).powi(2) / (delta * delta)
    };

    let n1 = match method {
        ProportionMethod::Normal => normal(),
        ProportionMethod::Fleiss => {
            let n = normal();
            let k = 1.0 + (1.0 + 2.0 * (r + 1.0) / (r * n * delta)).sqrt();
            n / 4.0 * k * k
        }
        ProportionMethod::Arcsine => {
            let h = 2.0 * p1.sqrt().asin() - 2.0 * p2.sqrt().asin();
            (za + zb).powi(2) * (1.0 + 1.0 / r) / (h * h)
        }
    };
    Ok(SampleSize::from_n1(n1, r))
}

/// Sample size to detect a mean difference `delta` with common standard
/// deviation `sd`: `n₁ = (z₁₋α/₂ + z₁₋β)² σ² (1 + 1/r) / δ²`.
pub fn two_means(delta: f64, sd: f64, defaults: &Defaults) -> Result<SampleSize> {
    check_positive("sd", sd)?;
    if delta == 0.0 || !delta.is_finite() {
        return Err(StatsError::InvalidParameter(format!(
            "mean difference must be finite and non-zero, got {delta}"
        )));
    }
    defaults.validate()?;
    let r = defaults.ratio;
    let z = defaults.z_alpha_two_sided() + defaults.z_beta();
    Ok(SampleSize::from_n1(
        z * z * sd * sd * (1.0 + 1.0 / r) / (delta * delta),
        r,
    ))
}

// ============================================================================
// Time to event
// ============================================================================

/// Events formula used by [`survival`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SurvivalMethod {
    /// `D = (z₁₋α/₂ + z₁₋β)² (1 + r)² / (r (ln HR)²)`
    Schoenfeld,
    /// `D = (z₁₋α/₂ + z₁₋β)² (1 + r·HR)² / (r (1 − HR)²)`
    Freedman,
}

/// Required events and, given the probability of observing an event, the
/// number of subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SurvivalSampleSize {
    pub events: u64,
    pub subjects: Option<SampleSize>,
}

/// Number of events needed to detect `hazard_ratio` (group 2 vs group 1).
///
/// When `event_probability` is given the subject count is
/// `events / event_probability`, split `1 : ratio`.
pub fn survival(
    hazard_ratio: f64,
    method: SurvivalMethod,
    event_probability: Option<f64>,
    defaults: &Defaults,
) -> Result<SurvivalSampleSize> {
    check_positive("hazard_ratio", hazard_ratio)?;
    if hazard_ratio == 1.0 {
        return Err(StatsError::InvalidParameter(
            "hazard ratio must differ from 1".into(),
        ));
    }
    defaults.validate()?;
    let r = defaults.ratio;
    let z = defaults.z_alpha_two_sided() + defaults.z_beta();
    let events = match method {
        SurvivalMethod::Schoenfeld => z * z * (1.0 + r).powi(2) / (r * hazard_ratio.ln().powi(2)),
        SurvivalMethod::Freedman => {
            z * z * (1.0 + r * hazard_ratio).powi(2) / (r * (1.0 - hazard_ratio).powi(2))
        }
    };
    let subjects = match event_probability {
        Some(p) if p > 0.0 && p <= 1.0 => Some(SampleSize::from_total(events / p, r)),
        Some(p) => {
            return Err(StatsError::InvalidProbability {
                name: "event_probability",
                value: p,
                expected: "0 < p <= 1",
            })
        }
        None => None,
    };
    Ok(SurvivalSampleSize {
        events: ceil_count(events),
        subjects,
    })
}

// ============================================================================
// Non-inferiority and equivalence
// ============================================================================

fn check_margin(margin: f64) -> Result<()> {
    check_positive("margin", margin)
}

/// Non-inferiority of arm 1 against arm 2 with margin `margin` (higher
/// proportions are better), one-sided at `alpha`.
///
/// ```text
/// n₁ = (z₁₋α + z₁₋β)² (p₁q₁ + p₂q₂/r) / (p₁ − p₂ + margin)²
/// ```
///
/// # Errors
/// `InvalidParameter` when `p₁ − p₂ + margin ≤ 0` (no power to show
/// non-inferiority).
pub fn non_inferiority_proportions(
    p1: f64,
    p2: f64,
    margin: f64,
    defaults: &Defaults,
) -> Result<SampleSize> {
    check_open_unit("p1", p1)?;
    check_open_unit("p2", p2)?;
    check_margin(margin)?;
    defaults.validate()?;
    let gap = p1 - p2 + margin;
    if gap <= 0.0 {
        return Err(StatsError::InvalidParameter(format!(
            "expected difference {} lies beyond the margin {margin}",
            p1 - p2
        )));
    }
    let r = defaults.ratio;
    let z = defaults.z_alpha_one_sided() + defaults.z_beta();
    let var = p1 * (1.0 - p1) + p2 * (1.0 - p2) / r;
    Ok(SampleSize::from_n1(z * z * var / (gap * gap), r))
}

/// Equivalence within `±margin` by two one-sided tests at `alpha`.
///
/// ```text
/// n₁ = (z₁₋α + z₁₋β/₂)² (p₁q₁ + p₂q₂/r) / (margin − |p₁ − p₂|)²
/// ```
pub fn equivalence_proportions(
    p1: f64,
    p2: f64,
    margin: f64,
    defaults: &Defaults,
) -> Result<SampleSize> {
    check_open_unit("p1", p1)?;
    check_open_unit("p2", p2)?;
    check_margin(margin)?;
    defaults.validate()?;
    let gap = margin - (p1 - p2).abs();
    if gap <= 0.0 {
        return Err(StatsError::InvalidParameter(format!(
            "expected difference {} is not inside the margin {margin}",
            p1 - p2
        )));
    }
    let r = defaults.ratio;
    let z_beta_half = normal_quantile(1.0 - (1.0 - defaults.power) / 2.0);
    let z = defaults.z_alpha_one_sided() + z_beta_half;
    let var = p1 * (1.0 - p1) + p2 * (1.0 - p2) / r;
    Ok(SampleSize::from_n1(z * z * var / (gap * gap), r))
}

// ============================================================================
// Cluster designs
// ============================================================================

/// Variance inflation `1 + (m − 1)·ICC` for clusters of size `m`.
pub fn design_effect(cluster_size: f64, icc: f64) -> f64 {
    1.0 + (cluster_size - 1.0) * icc
}

fn check_icc(icc: f64) -> Result<()> {
    if (0.0..=1.0).contains(&icc) {
        Ok(())
    } else {
        Err(StatsError::InvalidProbability {
            name: "icc",
            value: icc,
            expected: "0 <= icc <= 1",
        })
    }
}

/// Individually randomized size inflated for cluster randomization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterSampleSize {
    pub design_effect: f64,
    pub subjects: SampleSize,
    pub clusters1: u64,
    pub clusters2: u64,
}

/// Inflates an individually randomized size by [`design_effect`] and
/// converts each arm to whole clusters of `cluster_size`.
pub fn cluster_randomized(
    individual: &SampleSize,
    cluster_size: f64,
    icc: f64,
) -> Result<ClusterSampleSize> {
    if !(cluster_size >= 1.0) {
        return Err(StatsError::InvalidParameter(format!(
            "cluster size must be at least 1, got {cluster_size}"
        )));
    }
    check_icc(icc)?;
    let de = design_effect(cluster_size, icc);
    let subjects = individual.inflate(de);
    Ok(ClusterSampleSize {
        design_effect: de,
        subjects,
        clusters1: ceil_count(subjects.n1 as f64 / cluster_size),
        clusters2: ceil_count(subjects.n2 as f64 / cluster_size),
    })
}

/// Stepped-wedge sizing relative to an individually randomized trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SteppedWedge {
    /// Woertman design effect applied to the individually randomized total.
    pub design_effect: f64,
    /// Ratio of the stepped-wedge subject count to a parallel cluster trial
    /// with the same cluster size.
    pub relative_to_parallel: f64,
    /// Clusters, rounded up to a multiple of `steps`.
    pub clusters: u64,
    pub subjects: u64,
}

/// Stepped-wedge cluster trial with one baseline period, `steps` switch
/// points and `per_period` subjects measured per cluster per period.
///
/// ```text
/// DE_sw = (1 + ρ(k·n + n − 1)) / (1 + ρ(k·n/2 + n − 1)) · 3(1 − ρ) / (2(k − 1/k))
/// clusters = DE_sw · N / (n(k + 1))
/// ```
///
/// `relative_to_parallel` divides `DE_sw` by the parallel design effect
/// `1 + (n(k+1) − 1)ρ`.
pub fn stepped_wedge(
    individual: &SampleSize,
    steps: u32,
    per_period: f64,
    icc: f64,
) -> Result<SteppedWedge> {
    if steps < 2 {
        return Err(StatsError::InvalidParameter(format!(
            "a stepped wedge needs at least 2 steps, got {steps}"
        )));
    }
    check_positive("per_period", per_period)?;
    check_icc(icc)?;

    let k = steps as f64;
    let n = per_period;
    let de = (1.0 + icc * (k * n + n - 1.0)) / (1.0 + icc * (k * n / 2.0 + n - 1.0)) * 3.0
        * (1.0 - icc)
        / (2.0 * (k - 1.0 / k));
    let per_cluster = n * (k + 1.0);
    let raw_clusters = ceil_count(de * individual.total as f64 / per_cluster).max(1);
    let clusters = raw_clusters.div_ceil(steps as u64) * steps as u64;
    let parallel = design_effect(per_cluster, icc);

    debug!(de, clusters, "stepped wedge");
    Ok(SteppedWedge {
        design_effect: de,
        relative_to_parallel: de / parallel,
        clusters,
        subjects: ceil_count(clusters as f64 * per_cluster),
    })
}

// ============================================================================
// Ordinal outcome
// ============================================================================

/// Whitehead sample size for an ordinal outcome analysed by proportional odds.
///
/// `control` gives the category probabilities in the control arm; the
/// treatment arm follows from `odds_ratio` applied to every cumulative odds.
/// With `p̄ᵢ` the allocation-weighted average of both arms:
///
/// ```text
/// N = 3(r + 1)² (z₁₋α/₂ + z₁₋β)² / (r (ln OR)² (1 − Σ p̄ᵢ³))
/// ```
pub fn ordinal_shift(control: &[f64], odds_ratio: f64, defaults: &Defaults) -> Result<SampleSize> {
    if control.len() < 2 {
        return Err(StatsError::InsufficientData {
            required: 2,
            actual: control.len(),
        });
    }
    if control.iter().any(|p| !(0.0..=1.0).contains(p)) {
        return Err(StatsError::InvalidParameter(
            "category probabilities must lie in [0, 1]".into(),
        ));
    }
    let sum: f64 = control.iter().sum();
    if (sum - 1.0).abs() > 1e-6 {
        return Err(StatsError::InvalidParameter(format!(
            "category probabilities sum to {sum}, expected 1"
        )));
    }
    check_positive("odds_ratio", odds_ratio)?;
    if odds_ratio == 1.0 {
        return Err(StatsError::InvalidParameter(
            "odds ratio must differ from 1".into(),
        ));
    }
    defaults.validate()?;
    let r = defaults.ratio;

    let treatment = shift_categories(control, odds_ratio);
    let sum_cubes: f64 = control
        .iter()
        .zip(&treatment)
        .map(|(c, t)| ((c + r * t) / (1.0 + r)).powi(3))
        .sum();

    let z = defaults.z_alpha_two_sided() + defaults.z_beta();
    let total = 3.0 * (r + 1.0).powi(2) * z * z
        / (r * odds_ratio.ln().powi(2) * (1.0 - sum_cubes));
    Ok(SampleSize::from_total(total, r))
}

/// Category probabilities after multiplying every cumulative odds by `odds_ratio`.
fn shift_categories(control: &[f64], odds_ratio: f64) -> Vec<f64> {
    let mut cumulative = 0.0;
    let mut previous = 0.0;
    let last = control.len() - 1;
    control
        .iter()
        .enumerate()
        .map(|(i, p)| {
            cumulative += p;
            let shifted = if i == last {
                1.0
            } else {
                let c = cumulative.min(1.0);
                odds_ratio * c / (1.0 - c + odds_ratio * c)
            };
            let p = shifted - previous;
            previous = shifted;
            p
        })
        .collect()
}

// ============================================================================
// Multi-arm
// ============================================================================

/// Alpha adjustment for several comparisons against a shared control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MultiplicityAdjustment {
    /// `α / k`.
    Bonferroni,
    /// Dunnett-style approximation `1 − (1 − α)^{1/k}`.
    Dunnett,
}

impl MultiplicityAdjustment {
    /// Per-comparison alpha for `comparisons` comparisons.
    pub fn adjust(self, alpha: f64, comparisons: usize) -> f64 {
        let k = comparisons as f64;
        match self {
            MultiplicityAdjustment::Bonferroni => alpha / k,
            MultiplicityAdjustment::Dunnett => 1.0 - (1.0 - alpha).powf(1.0 / k),
        }
    }
}

/// Multi-arm sizing result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MultiArmSampleSize {
    pub adjusted_alpha: f64,
    pub arms: usize,
    pub per_arm: u64,
    pub total: u64,
}

/// Sizes a trial of `comparisons` treatment arms against one control.
///
/// `pairwise` computes a two-arm size for the settings it is given; it is
/// called once with `alpha` replaced by the adjusted value and the larger arm
/// is used for every arm.
///
/// ```
/// use clinstat::config::Defaults;
/// use clinstat::sample_size::{multi_arm, two_means, MultiplicityAdjustment};
/// let m = multi_arm(3, MultiplicityAdjustment::Bonferroni, &Defaults::default(), |d| {
///     two_means(5.0, 10.0, d)
/// })
/// .unwrap();
/// assert_eq!(m.arms, 4);
/// assert_eq!(m.total, 4 * m.per_arm);
/// ```
pub fn multi_arm<F>(
    comparisons: usize,
    adjustment: MultiplicityAdjustment,
    defaults: &Defaults,
    pairwise: F,
) -> Result<MultiArmSampleSize>
where
    F: Fn(&Defaults) -> Result<SampleSize>,
{
    if comparisons == 0 {
        return Err(StatsError::InvalidParameter(
            "at least one comparison is required".into(),
        ));
    }
    defaults.validate()?;
    let adjusted_alpha = adjustment.adjust(defaults.alpha, comparisons);
    let size = pairwise(&defaults.with_alpha(adjusted_alpha))?;
    let per_arm = size.n1.max(size.n2);
    let arms = comparisons + 1;
    Ok(MultiArmSampleSize {
        adjusted_alpha,
        arms,
        per_arm,
        total: per_arm * arms as u64,
    })
}

// ============================================================================
// Crossover
// ============================================================================

/// Crossover sizing result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrossoverSampleSize {
    pub total: u64,
    pub per_sequence: u64,
}

/// Crossover trial detecting `delta` given within-subject SD `sd_within`.
///
/// ```text
/// N = 2σ_w² (z₁₋α/₂ + z₁₋β)² / δ² · 2/periods
/// ```
///
/// `periods = 2` is the AB/BA design; higher-order designs reuse each
/// subject more often. `N` is rounded up to a multiple of `periods`, one
/// sequence per period.
pub fn crossover(
    delta: f64,
    sd_within: f64,
    periods: u32,
    defaults: &Defaults,
) -> Result<CrossoverSampleSize> {
    check_positive("sd_within", sd_within)?;
    if delta == 0.0 || !delta.is_finite() {
        return Err(StatsError::InvalidParameter(format!(
            "mean difference must be finite and non-zero, got {delta}"
        )));
    }
    if periods < 2 {
        return Err(StatsError::InvalidParameter(format!(
            "a crossover needs at least 2 periods, got {periods}"
        )));
    }
    defaults.validate()?;
    let z = defaults.z_alpha_two_sided() + defaults.z_beta();
    let raw = 2.0 * sd_within * sd_within * z * z / (delta * delta) * 2.0 / periods as f64;
    let sequences = periods as u64;
    let per_sequence = ceil_count(raw).div_ceil(sequences).max(1);
    Ok(CrossoverSampleSize {
        total: per_sequence * sequences,
        per_sequence,
    })
}

// ============================================================================
// Diagnostic accuracy
// ============================================================================

/// Precision-based diagnostic accuracy sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiagnosticSampleSize {
    /// Subjects with the condition needed for the sensitivity interval.
    pub cases: u64,
    /// Subjects without the condition needed for the specificity interval.
    pub non_cases: u64,
    /// Subjects to enrol at the given prevalence.
    pub total: u64,
}

/// Subjects needed so that the two-sided intervals for sensitivity and
/// specificity have full width at most `ci_width`.
///
/// ```text
/// cases     = z² Se(1 − Se) / (w/2)²
/// non-cases = z² Sp(1 − Sp) / (w/2)²
/// total     = max(cases / prevalence, non-cases / (1 − prevalence))
/// ```
///
/// `z` comes from `defaults.confidence`.
pub fn diagnostic_precision(
    sensitivity: f64,
    specificity: f64,
    prevalence: f64,
    ci_width: f64,
    defaults: &Defaults,
) -> Result<DiagnosticSampleSize> {
    check_open_unit("sensitivity", sensitivity)?;
    check_open_unit("specificity", specificity)?;
    check_open_unit("prevalence", prevalence)?;
    check_open_unit("ci_width", ci_width)?;
    defaults.validate()?;
    let z = defaults.z();
    let half = ci_width / 2.0;
    let cases = z * z * sensitivity * (1.0 - sensitivity) / (half * half);
    let non_cases = z * z * specificity * (1.0 - specificity) / (half * half);
    let total = f64::max(cases / prevalence, non_cases / (1.0 - prevalence));
    Ok(DiagnosticSampleSize {
        cases: ceil_count(cases),
        non_cases: ceil_count(non_cases),
        total: ceil_count(total),
    })
}

// ============================================================================
// Group sequential
// ============================================================================

/// Boundary family for interim analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Boundary {
    OBrienFleming,
    Pocock,
}

/// Maximum-size inflation for 2, 3, 4 and 5 equally spaced looks
/// (two-sided α = 0.05, power 0.80).
const OBF_INFLATION: [f64; 4] = [1.008, 1.017, 1.024, 1.028];
const POCOCK_INFLATION: [f64; 4] = [1.110, 1.166, 1.202, 1.229];

/// Sample-size inflation factor for `looks` equally spaced analyses.
///
/// One look gives 1. Beyond five looks the table is extended linearly from
/// its last two entries.
pub fn inflation_factor(boundary: Boundary, looks: u32) -> f64 {
    let table = match boundary {
        Boundary::OBrienFleming => &OBF_INFLATION,
        Boundary::Pocock => &POCOCK_INFLATION,
    };
    match looks {
        0 | 1 => 1.0,
        2..=5 => table[looks as usize - 2],
        _ => {
            let slope = table[3] - table[2];
            table[3] + slope * (looks - 5) as f64
        }
    }
}

/// One interim analysis of a spending-function design.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SequentialLook {
    /// Information fraction `i/K`.
    pub information: f64,
    /// Alpha spent up to and including this look.
    pub cumulative_alpha: f64,
    /// Two-sided critical value for this look.
    pub z: f64,
}

/// Lan–DeMets spending boundaries for `looks` equally spaced analyses.
///
/// ```text
/// O'Brien–Fleming-type  α(t) = 2 − 2Φ(z₁₋α/₂ / √t)
/// Pocock-type           α(t) = α ln(1 + (e − 1)t)
/// ```
///
/// Each look's critical value treats the alpha increment
/// `α(tᵢ) − α(tᵢ₋₁)` as if it were spent independently,
/// `zᵢ = Φ⁻¹(1 − Δαᵢ/2)`. This ignores the correlation between looks and
/// is slightly conservative.
pub fn spending_boundaries(boundary: Boundary, looks: u32, alpha: f64) -> Result<Vec<SequentialLook>> {
    check_open_unit("alpha", alpha)?;
    if looks == 0 {
        return Err(StatsError::InvalidParameter(
            "at least one look is required".into(),
        ));
    }
    let z_full = normal_quantile(1.0 - alpha / 2.0);
    let spent = |t: f64| match boundary {
        Boundary::OBrienFleming => 2.0 - 2.0 * normal_cdf(z_full / t.sqrt()),
        Boundary::Pocock => alpha * (1.0 + (E - 1.0) * t).ln(),
    };

    let mut previous = 0.0;
    let looks = (1..=looks)
        .map(|i| {
            let information = i as f64 / looks as f64;
            let cumulative_alpha = spent(information);
            let increment = (cumulative_alpha - previous).max(0.0);
            previous = cumulative_alpha;
            SequentialLook {
                information,
                cumulative_alpha,
                z: normal_quantile(1.0 - increment / 2.0),
            }
        })
        .collect();
    Ok(looks)
}

/// Group-sequential sizing result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSequential {
    pub inflation: f64,
    /// Maximum sample size.
    pub subjects: SampleSize,
    pub looks: Vec<SequentialLook>,
}

/// Inflates a fixed-design size for `looks` interim analyses and attaches
/// the spending boundaries at `defaults.alpha`.
pub fn group_sequential(
    fixed: &SampleSize,
    boundary: Boundary,
    looks: u32,
    defaults: &Defaults,
) -> Result<GroupSequential> {
    defaults.validate()?;
    let inflation = inflation_factor(boundary, looks);
    Ok(GroupSequential {
        inflation,
        subjects: fixed.inflate(inflation),
        looks: spending_boundaries(boundary, looks, defaults.alpha)?,
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn larger_effect_needs_fewer_subjects(p1 in 0.05_f64..0.45, d1 in 0.05_f64..0.2, extra in 0.01_f64..0.2) {
            let d = Defaults::default();
            let small = two_proportions(p1, p1 + d1, ProportionMethod::Normal, &d).unwrap();
            let large = two_proportions(p1, p1 + d1 + extra, ProportionMethod::Normal, &d).unwrap();
            prop_assert!(large.n1 <= small.n1);
        }

        #[test]
        fn fleiss_never_below_normal(p1 in 0.05_f64..0.5, delta in 0.02_f64..0.4) {
            let d = Defaults::default();
            let p2 = p1 + delta;
            let normal = two_proportions(p1, p2, ProportionMethod::Normal, &d).unwrap();
            let fleiss = two_proportions(p1, p2, ProportionMethod::Fleiss, &d).unwrap();
            prop_assert!(fleiss.n1 >= normal.n1);
        }

        #[test]
        fn higher_power_needs_more_subjects(delta in 0.5_f64..20.0, sd in 1.0_f64..30.0) {
            let low = two_means(delta, sd, &Defaults::default()).unwrap();
            let high = two_means(delta, sd, &Defaults::default().with_power(0.9)).unwrap();
            prop_assert!(high.n1 >= low.n1);
        }
    }
}
