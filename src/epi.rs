//! Epidemiologic summaries.
//!
//! 2×2 tables follow the [`Table2x2`] layout with exposure in rows
//! (`a, b` exposed; `c, d` unexposed) and outcome in columns (events first).
//!
//! # Examples
//! ```
//! use clinstat::epi::two_by_two;
//! use clinstat::table::Table2x2;
//! let s = two_by_two(&Table2x2::new(30, 70, 15, 85), 1.959964).unwrap();
//! assert!((s.risk_ratio.value - 2.0).abs() < 1e-12);
//! ```

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{check_closed_unit, check_open_unit, check_positive, Result, StatsError};
use crate::hypothesis::{chi_squared_2x2, fisher_exact, ChiSquaredTest, FisherTest};
use crate::intervals::{clopper_pearson, newcombe, poisson_exact};
use crate::table::{ratio, Estimate, Interval, Table2x2};

/// Significance level the fragility index tries to cross.
const FRAGILITY_ALPHA: f64 = 0.05;

// ============================================================================
// 2×2 summary
// ============================================================================

/// Direction of a number needed to treat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NntKind {
    /// Exposure lowers risk (NNT).
    Benefit,
    /// Exposure raises risk (NNH).
    Harm,
    NoEffect,
}

/// Number needed to treat or harm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Nnt {
    /// `1 / RD`; positive for harm, negative for benefit, `+∞` when `RD = 0`.
    pub value: f64,
    pub kind: NntKind,
    /// Reciprocal of the risk-difference interval, present only when that
    /// interval excludes 0.
    pub ci: Option<Interval>,
}

/// Number needed to treat from a risk difference `p_exposed − p_unexposed`.
pub fn nnt(risk_difference: f64) -> Nnt {
    let kind = if risk_difference > 0.0 {
        NntKind::Harm
    } else if risk_difference < 0.0 {
        NntKind::Benefit
    } else {
        NntKind::NoEffect
    };
    Nnt {
        value: if risk_difference == 0.0 {
            f64::INFINITY
        } else {
            1.0 / risk_difference
        },
        kind,
        ci: None,
    }
}

/// Epidemiologic summary of an exposure × outcome table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TwoByTwo {
    /// Risk among the exposed, `a / (a + b)`.
    pub p1: f64,
    /// Risk among the unexposed, `c / (c + d)`.
    pub p2: f64,
    pub risk_ratio: Estimate,
    pub odds_ratio: Estimate,
    /// `p1 − p2` with the Newcombe hybrid score interval.
    pub risk_difference: Estimate,
    pub nnt: Nnt,
    pub chi_squared: ChiSquaredTest,
    pub yates: ChiSquaredTest,
    pub fisher: FisherTest,
    /// `(RR − 1) / RR`.
    pub attributable_fraction_exposed: f64,
    /// Levin's `pₑ(RR − 1) / (1 + pₑ(RR − 1))` with `pₑ = (a + b) / N`.
    pub population_attributable_fraction: f64,
}

/// Risk ratio, odds ratio, risk difference, NNT, association tests and
/// attributable fractions for one table.
///
/// Ratios take log-scale intervals when the cells they need are non-zero;
/// otherwise they keep the `x/0` value and report `[0, ∞]`.
///
/// # Errors
/// `InvalidParameter` when either exposure row is empty.
pub fn two_by_two(table: &Table2x2, z: f64) -> Result<TwoByTwo> {
    check_positive("z", z)?;
    if table.n1() == 0 || table.n0() == 0 {
        return Err(StatsError::InvalidParameter(
            "both exposure rows need at least one subject".into(),
        ));
    }
    let Table2x2 { a, b, c, d } = *table;
    let (af, bf, cf, df) = (a as f64, b as f64, c as f64, d as f64);
    let (n1, n0) = (table.n1() as f64, table.n0() as f64);
    let p1 = table.p1();
    let p2 = table.p0();

    let rr = ratio(p1, p2);
    let rr_se = (a > 0 && c > 0).then(|| (1.0 / af - 1.0 / n1 + 1.0 / cf - 1.0 / n0).sqrt());
    let or_se = (!table.has_zero_cell()).then(|| (1.0 / af + 1.0 / bf + 1.0 / cf + 1.0 / df).sqrt());
    let risk_difference = newcombe(a, table.n1(), c, table.n0(), z)?;

    let mut number_needed = nnt(risk_difference.value);
    let rd_ci = risk_difference.ci;
    if rd_ci.lower > 0.0 || rd_ci.upper < 0.0 {
        number_needed.ci = Some(Interval::new(1.0 / rd_ci.upper, 1.0 / rd_ci.lower));
    }

    let exposed_share = n1 / (n1 + n0);
    let excess = exposed_share * (rr - 1.0);

    Ok(TwoByTwo {
        p1,
        p2,
        risk_ratio: Estimate::ratio(rr, rr_se, z),
        odds_ratio: Estimate::ratio(ratio(af * df, bf * cf), or_se, z),
        risk_difference,
        nnt: number_needed,
        chi_squared: chi_squared_2x2(table, false),
        yates: chi_squared_2x2(table, true),
        fisher: fisher_exact(table),
        attributable_fraction_exposed: if rr.is_infinite() {
            1.0
        } else {
            ratio(rr - 1.0, rr)
        },
        population_attributable_fraction: if excess.is_infinite() {
            1.0
        } else {
            excess / (1.0 + excess)
        },
    })
}

// ============================================================================
// Fragility index
// ============================================================================

/// Row of a 2×2 table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Arm {
    Exposed,
    Unexposed,
}

/// Result of [`fragility_index`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fragility {
    /// Reassignments needed to lift Fisher's p to 0.05 or above; `Some(0)`
    /// when the observed result is already non-significant and `None` when
    /// the arm runs out of non-events first.
    pub index: Option<u64>,
    pub initial_p_value: f64,
    pub final_p_value: f64,
    /// Arm with the lower event proportion, whose outcomes are modified.
    pub modified_arm: Arm,
    pub final_table: Table2x2,
}

/// Fragility index (Walsh et al., 2014).
///
/// In the arm with the lower event proportion, non-events are turned into
/// events one at a time until Fisher's two-sided p-value reaches 0.05.
///
/// # Errors
/// `InvalidParameter` when either arm is empty.
pub fn fragility_index(table: &Table2x2) -> Result<Fragility> {
    if table.n1() == 0 || table.n0() == 0 {
        return Err(StatsError::InvalidParameter(
            "both arms need at least one subject".into(),
        ));
    }
    let modified_arm = if table.p1() < table.p0() {
        Arm::Exposed
    } else {
        Arm::Unexposed
    };
    let initial_p_value = fisher_exact(table).p_value;

    let mut current = *table;
    let mut p_value = initial_p_value;
    let mut steps = 0_u64;
    let mut index = Some(0);
    while p_value < FRAGILITY_ALPHA {
        let (events, non_events) = match modified_arm {
            Arm::Exposed => (&mut current.a, &mut current.b),
            Arm::Unexposed => (&mut current.c, &mut current.d),
        };
        if *non_events == 0 {
            index = None;
            break;
        }
        *events += 1;
        *non_events -= 1;
        steps += 1;
        p_value = fisher_exact(&current).p_value;
        debug!(steps, p_value, "fragility step");
        index = Some(steps);
    }

    Ok(Fragility {
        index,
        initial_p_value,
        final_p_value: p_value,
        modified_arm,
        final_table: current,
    })
}

// ============================================================================
// Matched pairs and interaction
// ============================================================================

/// Conditional odds ratio `b / c` from the discordant pairs of a matched
/// design, with interval `exp(ln(b/c) ± z√(1/b + 1/c))`.
///
/// A zero count keeps the `x/0` convention: `(b, 0)` gives `∞`, `(0, c)`
/// gives 0 and `(0, 0)` gives NaN, each with `[0, ∞]`.
pub fn matched_pairs_odds_ratio(b: u64, c: u64, z: f64) -> Result<Estimate> {
    check_positive("z", z)?;
    let (bf, cf) = (b as f64, c as f64);
    let se = (b > 0 && c > 0).then(|| (1.0 / bf + 1.0 / cf).sqrt());
    Ok(Estimate::ratio(ratio(bf, cf), se, z))
}

/// Additive and multiplicative interaction between two exposures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Interaction {
    /// Relative excess risk due to interaction, `RR₁₁ − RR₁₀ − RR₀₁ + 1`.
    pub reri: f64,
    /// Attributable proportion, `RERI / RR₁₁`.
    pub attributable_proportion: f64,
    /// Synergy index, `(RR₁₁ − 1) / ((RR₁₀ − 1) + (RR₀₁ − 1))`.
    pub synergy_index: f64,
    /// `RR₁₁ / (RR₁₀ · RR₀₁)`.
    pub multiplicative: f64,
}

/// Interaction measures from the relative risks of joint exposure (`rr11`)
/// and each exposure alone (`rr10`, `rr01`), all against the doubly
/// unexposed.
pub fn interaction(rr11: f64, rr10: f64, rr01: f64) -> Result<Interaction> {
    check_positive("rr11", rr11)?;
    check_positive("rr10", rr10)?;
    check_positive("rr01", rr01)?;
    let reri = rr11 - rr10 - rr01 + 1.0;
    Ok(Interaction {
        reri,
        attributable_proportion: reri / rr11,
        synergy_index: ratio(rr11 - 1.0, (rr10 - 1.0) + (rr01 - 1.0)),
        multiplicative: rr11 / (rr10 * rr01),
    })
}

// ============================================================================
// Rates
// ============================================================================

/// Incidence rate `events / person_time` with the exact Poisson interval
/// scaled by person-time. `se` is `√events / person_time`.
pub fn incidence_rate(events: u64, person_time: f64, alpha: f64) -> Result<Estimate> {
    check_positive("person_time", person_time)?;
    let ci = poisson_exact(events, alpha)?;
    Ok(Estimate {
        value: events as f64 / person_time,
        se: Some((events as f64).sqrt() / person_time),
        ci: Interval::new(ci.lower / person_time, ci.upper / person_time),
    })
}

/// Incidence rate ratio `(e₁/T₁) / (e₀/T₀)`.
///
/// The interval is exact, conditioning on the total count: `e₁` is binomial
/// with `π = T₁·IRR / (T₁·IRR + T₀)`, so the Clopper–Pearson limits for `π`
/// map to `IRR = π/(1 − π) · T₀/T₁`. With no events at all the ratio is NaN
/// with `[0, ∞]`.
pub fn rate_ratio(
    events1: u64,
    person_time1: f64,
    events0: u64,
    person_time0: f64,
    alpha: f64,
) -> Result<Estimate> {
    check_positive("person_time1", person_time1)?;
    check_positive("person_time0", person_time0)?;
    check_open_unit("alpha", alpha)?;
    let value = ratio(events1 as f64 / person_time1, events0 as f64 / person_time0);
    let total = events1 + events0;
    if total == 0 {
        return Ok(Estimate {
            value,
            se: None,
            ci: Interval::new(0.0, f64::INFINITY),
        });
    }
    let pi = clopper_pearson(events1, total, alpha)?;
    let scale = person_time0 / person_time1;
    let to_ratio = |p: f64| ratio(p, 1.0 - p) * scale;
    let se = (events1 > 0 && events0 > 0)
        .then(|| (1.0 / events1 as f64 + 1.0 / events0 as f64).sqrt());
    Ok(Estimate {
        value,
        se,
        ci: Interval::new(to_ratio(pi.lower), to_ratio(pi.upper)),
    })
}

/// Standardized mortality (or morbidity) ratio `observed / expected` with the
/// exact Poisson interval for `observed` divided by `expected`.
pub fn smr(observed: u64, expected: f64, alpha: f64) -> Result<Estimate> {
    check_positive("expected", expected)?;
    let ci = poisson_exact(observed, alpha)?;
    Ok(Estimate {
        value: observed as f64 / expected,
        se: (observed > 0).then(|| 1.0 / (observed as f64).sqrt()),
        ci: Interval::new(ci.lower / expected, ci.upper / expected),
    })
}

/// One stratum (typically an age band) for direct standardization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardStratum {
    pub events: u64,
    pub person_time: f64,
    /// Standard population size or weight; weights are normalised.
    pub standard: f64,
}

/// Directly standardized rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StandardizedRate {
    /// `Σ wᵢ eᵢ/Tᵢ` with `Σ wᵢ = 1`.
    pub rate: f64,
    /// `√(Σ wᵢ² eᵢ/Tᵢ²)`.
    pub se: f64,
    /// Wald interval with the lower bound clipped at 0.
    pub ci: Interval,
    /// `Σ eᵢ / Σ Tᵢ`.
    pub crude_rate: f64,
}

/// Direct standardization of stratum-specific rates to a standard population.
pub fn direct_standardization(strata: &[StandardStratum], z: f64) -> Result<StandardizedRate> {
    if strata.is_empty() {
        return Err(StatsError::EmptyInput("strata"));
    }
    check_positive("z", z)?;
    for s in strata {
        check_positive("person_time", s.person_time)?;
        if !(s.standard >= 0.0 && s.standard.is_finite()) {
            return Err(StatsError::InvalidParameter(format!(
                "standard weight must be finite and non-negative, got {}",
                s.standard
            )));
        }
    }
    let total_weight: f64 = strata.iter().map(|s| s.standard).sum();
    if total_weight <= 0.0 {
        return Err(StatsError::InvalidParameter(
            "standard weights sum to zero".into(),
        ));
    }

    let mut rate = 0.0;
    let mut variance = 0.0;
    for s in strata {
        let w = s.standard / total_weight;
        let e = s.events as f64;
        rate += w * e / s.person_time;
        variance += w * w * e / (s.person_time * s.person_time);
    }
    let se = variance.sqrt();
    let events: u64 = strata.iter().map(|s| s.events).sum();
    let person_time: f64 = strata.iter().map(|s| s.person_time).sum();
    let ci = Interval::wald(rate, se, z);

    Ok(StandardizedRate {
        rate,
        se,
        ci: Interval::new(ci.lower.max(0.0), ci.upper),
        crude_rate: events as f64 / person_time,
    })
}

// ============================================================================
// Effect-size conversions
// ============================================================================

/// Odds ratio to risk ratio given the unexposed risk `p0` (Zhang & Yu):
/// `OR / (1 − p₀ + p₀·OR)`.
pub fn or_to_rr(odds_ratio: f64, p0: f64) -> Result<f64> {
    check_positive("odds_ratio", odds_ratio)?;
    check_closed_unit("p0", p0)?;
    Ok(odds_ratio / (1.0 - p0 + p0 * odds_ratio))
}

/// Risk ratio to odds ratio given `p0`: `RR(1 − p₀) / (1 − RR·p₀)`.
///
/// # Errors
/// `InvalidParameter` when `RR·p₀ ≥ 1` (the exposed risk would reach 1).
pub fn rr_to_or(risk_ratio: f64, p0: f64) -> Result<f64> {
    check_positive("risk_ratio", risk_ratio)?;
    check_closed_unit("p0", p0)?;
    if risk_ratio * p0 >= 1.0 {
        return Err(StatsError::InvalidParameter(format!(
            "risk ratio {risk_ratio} with baseline {p0} implies an exposed risk of 1 or more"
        )));
    }
    Ok(risk_ratio * (1.0 - p0) / (1.0 - risk_ratio * p0))
}

/// Odds ratio to Cohen's d via the logistic distribution: `ln OR · √3/π`.
pub fn or_to_d(odds_ratio: f64) -> Result<f64> {
    check_positive("odds_ratio", odds_ratio)?;
    Ok(odds_ratio.ln() * 3.0_f64.sqrt() / PI)
}

/// Cohen's d to odds ratio: `exp(d·π/√3)`.
pub fn d_to_or(d: f64) -> f64 {
    (d * PI / 3.0_f64.sqrt()).exp()
}

/// Hedges' g: `d · (1 − 3/(4N − 9))` with `N = n₁ + n₂`.
pub fn d_to_g(d: f64, n1: u64, n2: u64) -> Result<f64> {
    let n = n1 + n2;
    if n < 3 {
        return Err(StatsError::InsufficientData {
            required: 3,
            actual: n as usize,
        });
    }
    Ok(d * (1.0 - 3.0 / (4.0 * n as f64 - 9.0)))
}

/// Correlation to Cohen's d: `2r / √(1 − r²)`.
pub fn r_to_d(r: f64) -> Result<f64> {
    if !(r > -1.0 && r < 1.0) {
        return Err(StatsError::InvalidProbability {
            name: "r",
            value: r,
            expected: "-1 < r < 1",
        });
    }
    Ok(2.0 * r / (1.0 - r * r).sqrt())
}

/// Cohen's d to correlation (equal groups): `d / √(d² + 4)`.
pub fn d_to_r(d: f64) -> f64 {
    d / (d * d + 4.0).sqrt()
}
