//! # clinstat
//!
//! Statistical engine for clinical research.
//!
//! The crate is a set of pure numerical functions: no I/O and no shared
//! mutable state. Every function can be called from any thread.
//!
//! ## Modules
//!
//! - [`special`] — Gamma, beta and the regularized incomplete integrals
//! - [`distributions`] — Normal, t, χ², F, binomial, Poisson, hypergeometric
//! - [`intervals`] — Confidence intervals for proportions, differences, counts and rates
//! - [`hypothesis`] — z, χ², Fisher, McNemar, Cochran–Armitage, Mantel–Haenszel
//! - [`sample_size`] — Design formulas from two-arm trials to group-sequential plans
//! - [`power`] — Power for a fixed size and minimum detectable effects
//! - [`meta`] — Fixed/random-effects pooling, bias and sensitivity analyses
//! - [`survival`] — Kaplan–Meier estimation and the log-rank test
//! - [`diagnostic`] — Test accuracy, Fagan nomogram, ROC area
//! - [`epi`] — 2×2 summaries, fragility, interaction, rates, conversions
//! - [`stats`] — Compensated sums and least squares shared by the above
//! - [`table`] — `Table2x2`, `Interval`, `Estimate`, `Measure`
//! - [`config`] — `Defaults` for alpha, power, allocation ratio and confidence
//! - [`error`] — `StatsError`
//!
//! ## Conventions
//!
//! - **Sentinels inside, `Result` at the boundary**: scalar kernels return
//!   NaN or ±∞ for out-of-domain input; composite routines validate their
//!   input and return [`error::Result`], while degenerate values such as
//!   `x/0 = ∞` are kept inside the result records.
//! - **Convergence is visible**: iterative kernels have `*_eval` variants
//!   reporting [`special::Evaluation::converged`].
//! - **Property-based testing**: mathematical invariants verified via proptest
//!
//! ## Example
//!
//! ```
//! use clinstat::config::Defaults;
//! use clinstat::sample_size::{two_proportions, ProportionMethod};
//!
//! let n = two_proportions(0.30, 0.15, ProportionMethod::Normal, &Defaults::default()).unwrap();
//! assert_eq!(n.n1, 121);
//! ```

pub mod config;
pub mod diagnostic;
pub mod distributions;
pub mod epi;
pub mod error;
pub mod hypothesis;
pub mod intervals;
pub mod meta;
pub mod power;
pub mod sample_size;
pub mod special;
pub mod stats;
pub mod survival;
pub mod table;
