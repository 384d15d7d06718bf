//! Numerically careful summaries shared by the pooling routines.
//!
//! # Algorithms
//!
//! - **Sums**: Neumaier compensated summation for O(ε) error independent of n.
//!   Reference: Neumaier (1974), *Zeitschrift für Angewandte Mathematik und
//!   Mechanik* 54(1), pp. 39–51.
//! - **Weighted mean / dispersion**: two-pass, centred before squaring.
//! - **Simple linear regression**: ordinary least squares on centred data.

/// Neumaier compensated summation.
///
/// An improved variant of Kahan summation that also handles the case where
/// the addend is larger in magnitude than the running sum.
///
/// # Examples
/// ```
/// use clinstat::stats::kahan_sum;
/// let v = [1.0, 1e100, 1.0, -1e100];
/// assert_eq!(kahan_sum(v), 2.0);
/// ```
pub fn kahan_sum<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0_f64;
    let mut c = 0.0_f64;
    for x in values {
        let t = sum + x;
        if sum.abs() >= x.abs() {
            c += (sum - t) + x;
        } else {
            c += (x - t) + sum;
        }
        sum = t;
    }
    sum + c
}

/// Weighted mean `Σwᵢxᵢ / Σwᵢ`.
///
/// # Returns
/// - `None` if the slices differ in length, are empty, contain NaN/Inf, or
///   the weights do not sum to a positive value.
pub fn weighted_mean(values: &[f64], weights: &[f64]) -> Option<f64> {
    if values.len() != weights.len() || values.is_empty() {
        return None;
    }
    if !values.iter().chain(weights).all(|v| v.is_finite()) {
        return None;
    }
    let total = kahan_sum(weights.iter().copied());
    if total <= 0.0 {
        return None;
    }
    Some(kahan_sum(values.iter().zip(weights).map(|(x, w)| w * x)) / total)
}

/// Weighted sum of squared deviations `Σwᵢ(xᵢ − center)²`.
///
/// This is Cochran's Q when the weights are inverse variances and `center` is
/// the inverse-variance mean.
pub fn weighted_sum_squares(values: &[f64], weights: &[f64], center: f64) -> f64 {
    kahan_sum(
        values
            .iter()
            .zip(weights)
            .map(|(x, w)| w * (x - center) * (x - center)),
    )
}

/// Ordinary least-squares fit of `y = intercept + slope·x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
    pub intercept_se: f64,
    pub slope_se: f64,
    /// Residual variance `Σe² / (n − 2)`.
    pub residual_variance: f64,
    /// Residual degrees of freedom `n − 2`.
    pub df: usize,
}

/// Fits a straight line by ordinary least squares.
///
/// ```text
/// slope     = Sxy / Sxx
/// intercept = ȳ − slope·x̄
/// se(slope) = √(s² / Sxx)
/// se(int.)  = √(s² (1/n + x̄²/Sxx))
/// ```
///
/// # Returns
/// - `None` if `x.len() != y.len()`, `n < 3`, the data contain NaN/Inf, or
///   all `x` are equal.
///
/// # Examples
/// ```
/// use clinstat::stats::linear_regression;
/// let fit = linear_regression(&[1.0, 2.0, 3.0, 4.0], &[3.0, 5.0, 7.0, 9.0]).unwrap();
/// assert!((fit.slope - 2.0).abs() < 1e-12);
/// assert!((fit.intercept - 1.0).abs() < 1e-12);
/// ```
pub fn linear_regression(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let n = x.len();
    if n != y.len() || n < 3 {
        return None;
    }
    if !x.iter().chain(y).all(|v| v.is_finite()) {
        return None;
    }
    let nf = n as f64;
    let mean_x = kahan_sum(x.iter().copied()) / nf;
    let mean_y = kahan_sum(y.iter().copied()) / nf;
    let sxx = kahan_sum(x.iter().map(|xi| (xi - mean_x).powi(2)));
    if sxx <= 0.0 {
        return None;
    }
    let sxy = kahan_sum(x.iter().zip(y).map(|(xi, yi)| (xi - mean_x) * (yi - mean_y)));
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let df = n - 2;
    let sse = kahan_sum(
        x.iter()
            .zip(y)
            .map(|(xi, yi)| (yi - intercept - slope * xi).powi(2)),
    );
    let s2 = sse / df as f64;
    Some(LinearFit {
        intercept,
        slope,
        intercept_se: (s2 * (1.0 / nf + mean_x * mean_x / sxx)).sqrt(),
        slope_se: (s2 / sxx).sqrt(),
        residual_variance: s2,
        df,
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn weighted_mean_within_range(
            data in proptest::collection::vec((-1e6_f64..1e6, 0.01_f64..100.0), 1..50)
        ) {
            let (values, weights): (Vec<f64>, Vec<f64>) = data.into_iter().unzip();
            let m = weighted_mean(&values, &weights).unwrap();
            let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(m >= lo - 1e-6 && m <= hi + 1e-6);
        }

        #[test]
        fn exact_line_is_recovered(
            a in -100.0_f64..100.0,
            b in -10.0_f64..10.0,
            n in 3_usize..30,
        ) {
            let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
            let y: Vec<f64> = x.iter().map(|xi| a + b * xi).collect();
            let fit = linear_regression(&x, &y).unwrap();
            prop_assert!((fit.slope - b).abs() < 1e-9);
            prop_assert!((fit.intercept - a).abs() < 1e-8);
        }
    }
}
