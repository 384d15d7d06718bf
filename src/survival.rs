//! Kaplan–Meier estimation and the log-rank test.
//!
//! # Algorithm
//! Subjects are grouped by label and sorted by time. At each distinct time
//! `t` with `nₜ` at risk, `dₜ` events and `cₜ` censorings:
//!
//! ```text
//! S(t)  = S(t⁻) · (1 − dₜ/nₜ)               (only when dₜ > 0)
//! Var   = S(t)² Σ dₛ / (nₛ(nₛ − dₛ))        (Greenwood)
//! CI    = [S^exp(z·θ), S^exp(−z·θ)],  θ = √(Σ dₛ/(nₛ(nₛ − dₛ))) / |ln S|
//! ```
//!
//! and `nₜ` drops by `dₜ + cₜ` afterwards. The log-log interval is used for
//! `0 < S < 1`; at `S = 1` or `S = 0` the interval collapses to a point.
//!
//! Reference: Kaplan & Meier (1958), *JASA* 53(282); Greenwood (1926).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distributions::chi_squared_sf;
use crate::error::{check_positive, Result, StatsError};
use crate::table::{ratio, Estimate, Interval};

/// One subject: follow-up time, whether it ended in an event, and group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalRecord {
    pub time: f64,
    pub event: bool,
    pub group: String,
}

impl SurvivalRecord {
    pub fn new(time: f64, event: bool, group: impl Into<String>) -> Self {
        Self {
            time,
            event,
            group: group.into(),
        }
    }
}

/// One row of a Kaplan–Meier table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KmStep {
    pub time: f64,
    pub at_risk: u64,
    pub events: u64,
    pub censored: u64,
    pub survival: f64,
    /// Greenwood standard error.
    pub se: f64,
    pub ci: Interval,
}

/// Median survival with a Brookmeyer–Crowley-style interval. `None` where
/// the curve never gets low enough.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MedianSurvival {
    pub estimate: Option<f64>,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// Kaplan–Meier curve for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KaplanMeier {
    pub group: String,
    pub steps: Vec<KmStep>,
    pub median: MedianSurvival,
}

impl KaplanMeier {
    /// Survival probability at `time` (right-continuous step function).
    pub fn survival_at(&self, time: f64) -> f64 {
        self.steps
            .iter()
            .take_while(|s| s.time <= time)
            .last()
            .map_or(1.0, |s| s.survival)
    }

    /// Subjects still under observation just before `time`.
    pub fn number_at_risk(&self, time: f64) -> u64 {
        self.steps
            .iter()
            .find(|s| s.time >= time)
            .map_or(0, |s| s.at_risk)
    }
}

fn validate(records: &[SurvivalRecord]) -> Result<()> {
    if records.is_empty() {
        return Err(StatsError::EmptyInput("records"));
    }
    if let Some(r) = records.iter().find(|r| !(r.time >= 0.0 && r.time.is_finite())) {
        return Err(StatsError::InvalidParameter(format!(
            "survival time must be finite and non-negative, got {}",
            r.time
        )));
    }
    Ok(())
}

fn by_group(records: &[SurvivalRecord]) -> BTreeMap<&str, Vec<&SurvivalRecord>> {
    let mut groups: BTreeMap<&str, Vec<&SurvivalRecord>> = BTreeMap::new();
    for r in records {
        groups.entry(r.group.as_str()).or_default().push(r);
    }
    for members in groups.values_mut() {
        members.sort_by(|a, b| a.time.total_cmp(&b.time));
    }
    groups
}

/// Distinct times with their event and censoring counts, ascending.
fn tally(sorted: &[&SurvivalRecord]) -> Vec<(f64, u64, u64)> {
    let mut rows: Vec<(f64, u64, u64)> = Vec::new();
    for r in sorted {
        match rows.last_mut() {
            Some(last) if last.0 == r.time => {
                if r.event {
                    last.1 += 1;
                } else {
                    last.2 += 1;
                }
            }
            _ => rows.push((r.time, r.event as u64, (!r.event) as u64)),
        }
    }
    rows
}

/// Kaplan–Meier curves, one per group in label order.
///
/// `z` is the two-sided critical value for the pointwise and median
/// intervals.
///
/// # Examples
/// ```
/// use clinstat::survival::{kaplan_meier, SurvivalRecord};
/// let records: Vec<_> = [(5.0, true), (6.0, true), (6.0, false), (8.0, true)]
///     .iter()
///     .map(|&(t, e)| SurvivalRecord::new(t, e, "all"))
///     .collect();
/// let curves = kaplan_meier(&records, 1.959964).unwrap();
/// assert_eq!(curves[0].median.estimate, Some(6.0));
/// ```
pub fn kaplan_meier(records: &[SurvivalRecord], z: f64) -> Result<Vec<KaplanMeier>> {
    validate(records)?;
    check_positive("z", z)?;
    let curves = by_group(records)
        .into_iter()
        .map(|(group, members)| {
            let steps = km_steps(&members, z);
            let median = median_survival(&steps, z);
            debug!(group, subjects = members.len(), ?median, "kaplan-meier");
            KaplanMeier {
                group: group.to_string(),
                steps,
                median,
            }
        })
        .collect();
    Ok(curves)
}

fn km_steps(sorted: &[&SurvivalRecord], z: f64) -> Vec<KmStep> {
    let mut at_risk = sorted.len() as u64;
    let mut survival = 1.0_f64;
    let mut greenwood = 0.0_f64;

    tally(sorted)
        .into_iter()
        .map(|(time, events, censored)| {
            let n = at_risk;
            if events > 0 {
                survival *= 1.0 - events as f64 / n as f64;
                if n > events {
                    greenwood += events as f64 / (n as f64 * (n - events) as f64);
                }
            }
            let se = if survival > 0.0 {
                survival * greenwood.sqrt()
            } else {
                0.0
            };
            let ci = if survival > 0.0 && survival < 1.0 {
                let theta = greenwood.sqrt() / survival.ln().abs();
                Interval::new(
                    survival.powf((z * theta).exp()),
                    survival.powf((-z * theta).exp()),
                )
            } else {
                Interval::point(survival)
            };
            at_risk -= events + censored;
            KmStep {
                time,
                at_risk: n,
                events,
                censored,
                survival,
                se,
                ci,
            }
        })
        .collect()
}

/// Median is the first time with `S ≤ 0.5`. The interval runs from the
/// first time with `S − z·se ≤ 0.5` to the first time with `S + z·se ≤ 0.5`.
fn median_survival(steps: &[KmStep], z: f64) -> MedianSurvival {
    let first = |pred: &dyn Fn(&KmStep) -> bool| steps.iter().find(|s| pred(s)).map(|s| s.time);
    MedianSurvival {
        estimate: first(&|s: &KmStep| s.survival <= 0.5),
        lower: first(&|s: &KmStep| s.survival - z * s.se <= 0.5),
        upper: first(&|s: &KmStep| s.survival + z * s.se <= 0.5),
    }
}

// ============================================================================
// Log-rank
// ============================================================================

/// Observed and expected events in one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupEvents {
    pub group: String,
    pub observed: u64,
    pub expected: f64,
}

/// Result of [`log_rank`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRank {
    /// Both groups in label order.
    pub groups: Vec<GroupEvents>,
    pub chi2: f64,
    pub df: usize,
    pub p_value: f64,
    /// Hypergeometric variance of the first group's observed count.
    pub variance: f64,
    /// Hazard ratio of the first group relative to the second,
    /// `exp((O − E)/V)` with `se(ln HR) = 1/√V`.
    pub hazard_ratio: Estimate,
}

/// Mantel–Cox log-rank test comparing exactly two groups.
///
/// At every distinct event time:
///
/// ```text
/// Eₜ = dₜ n₁ₜ / Nₜ
/// Vₜ = n₁ₜ n₂ₜ dₜ (Nₜ − dₜ) / (Nₜ² (Nₜ − 1))
/// ```
///
/// and `χ² = (O₁ − E₁)² / V` on one degree of freedom.
///
/// # Errors
/// `InvalidParameter` unless the records contain exactly two groups.
pub fn log_rank(records: &[SurvivalRecord], z: f64) -> Result<LogRank> {
    validate(records)?;
    check_positive("z", z)?;
    let groups = by_group(records);
    if groups.len() != 2 {
        return Err(StatsError::InvalidParameter(format!(
            "log-rank test needs exactly two groups, got {}",
            groups.len()
        )));
    }
    let labels: Vec<&str> = groups.keys().copied().collect();

    let mut all: Vec<&SurvivalRecord> = records.iter().collect();
    all.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut at_risk = [groups[labels[0]].len() as f64, groups[labels[1]].len() as f64];
    let mut observed = [0u64; 2];
    let mut expected = [0.0_f64; 2];
    let mut variance = 0.0_f64;

    let mut i = 0;
    while i < all.len() {
        let time = all[i].time;
        let mut deaths = [0u64; 2];
        let mut leaving = [0u64; 2];
        while i < all.len() && all[i].time == time {
            let g = usize::from(all[i].group != labels[0]);
            leaving[g] += 1;
            if all[i].event {
                deaths[g] += 1;
            }
            i += 1;
        }
        let d = (deaths[0] + deaths[1]) as f64;
        if d > 0.0 {
            let n = at_risk[0] + at_risk[1];
            for g in 0..2 {
                observed[g] += deaths[g];
                expected[g] += d * at_risk[g] / n;
            }
            if n > 1.0 {
                variance += at_risk[0] * at_risk[1] * d * (n - d) / (n * n * (n - 1.0));
            }
        }
        at_risk[0] -= leaving[0] as f64;
        at_risk[1] -= leaving[1] as f64;
    }

    let diff = observed[0] as f64 - expected[0];
    let chi2 = ratio(diff * diff, variance);
    let hazard_ratio = Estimate::from_log(ratio(diff, variance), 1.0 / variance.sqrt(), z);
    debug!(chi2, variance, "log-rank");

    Ok(LogRank {
        groups: (0..2)
            .map(|g| GroupEvents {
                group: labels[g].to_string(),
                observed: observed[g],
                expected: expected[g],
            })
            .collect(),
        chi2,
        df: 1,
        p_value: chi_squared_sf(chi2, 1.0),
        variance,
        hazard_ratio,
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn survival_is_monotone_and_se_non_negative(
            data in proptest::collection::vec((0_u32..50, any::<bool>()), 1..60)
        ) {
            let records: Vec<SurvivalRecord> = data
                .iter()
                .map(|&(t, e)| SurvivalRecord::new(t as f64, e, "g"))
                .collect();
            let km = kaplan_meier(&records, 1.96).unwrap();
            let mut previous = 1.0;
            for s in &km[0].steps {
                prop_assert!(s.survival <= previous + 1e-15);
                prop_assert!((0.0..=1.0).contains(&s.survival));
                prop_assert!(s.se >= 0.0);
                prop_assert!(s.ci.lower <= s.survival + 1e-12 && s.survival <= s.ci.upper + 1e-12);
                previous = s.survival;
            }
        }

        #[test]
        fn log_rank_statistic_is_non_negative(
            a in proptest::collection::vec((1_u32..30, any::<bool>()), 2..30),
            b in proptest::collection::vec((1_u32..30, any::<bool>()), 2..30),
        ) {
            let mut records: Vec<SurvivalRecord> = a
                .iter()
                .map(|&(t, e)| SurvivalRecord::new(t as f64, e, "a"))
                .collect();
            records.extend(b.iter().map(|&(t, e)| SurvivalRecord::new(t as f64, e, "b")));
            let lr = log_rank(&records, 1.96).unwrap();
            prop_assume!(lr.variance > 0.0);
            prop_assert!(lr.chi2 >= 0.0);
            prop_assert!((0.0..=1.0).contains(&lr.p_value));
        }
    }
}
