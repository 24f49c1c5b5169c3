//! # Candidate linear models of territory size
//!
//! Fits the 16 predictor subsets of `{comm_distance, age, condition, noise}` against the
//! 75 % home-range area with ordinary least squares, and ranks them by **AICc**.
//!
//! ## Model
//! -----------------
//! ```text
//! area_75 = β0 + Σ βj·xj + ε,      ε ~ N(0, σ²)
//! ```
//!
//! `age` is categorical and enters the design matrix with treatment coding: one indicator
//! column per level except the reference, which is the first level in sorted order.
//!
//! ## Scores
//! -----------------
//! With `n` rows, `p` design columns and residual sum of squares `RSS`:
//!
//! * `logLik = −n/2 · (ln 2π + ln(RSS/n) + 1)` (maximum likelihood σ² = RSS/n),
//! * `k = p + 1` (the variance counts as a parameter),
//! * `AICc = −2·logLik + 2k + 2k(k+1)/(n − k − 1)`,
//! * `Δi = AICc_i − min AICc`, Akaike weight `wi = exp(−Δi/2) / Σ exp(−Δj/2)`.
//!
//! Coefficient standard errors use `σ̂² = RSS/(n − p)`; their p-values come from a
//! Student t with `n − p` degrees of freedom.
//!
//! The candidate list lives in the single const table [`CANDIDATE_MODELS`]; each entry
//! pairs a display name with its predictors, so names and formulas cannot drift apart.
//!
//! See also
//! ------------
//! * [`welch`] – urban vs. rural comparisons on the same records.
pub mod welch;

use std::fmt;

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    condition::Habitat,
    constants::BirdId,
    stats::distributions::student_t_two_sided_p,
    territory_errors::TerritoryError,
};

use self::Predictor::{Age, CommDistance, Condition, Noise};

pub use welch::{habitat_comparisons, welch_from_summary, welch_t_test, HabitatComparisons, WelchTest};

/// Relative singular value of the design matrix below which it is treated as rank deficient.
const RANK_TOLERANCE: f64 = 1e-10;

/// One row of the combined model sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub bird_id: BirdId,
    pub habitat: Habitat,
    pub dialect: String,
    pub age: String,
    pub noise: f64,
    pub comm_distance: f64,
    pub condition: f64,
    /// 75 % kernel home-range area (m²)
    pub area_75: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Predictor {
    CommDistance,
    Age,
    Condition,
    Noise,
}

impl Predictor {
    pub fn name(&self) -> &'static str {
        match self {
            Predictor::CommDistance => "comm_distance",
            Predictor::Age => "age",
            Predictor::Condition => "condition",
            Predictor::Noise => "noise",
        }
    }

    fn value(&self, record: &ModelRecord) -> f64 {
        match self {
            Predictor::CommDistance => record.comm_distance,
            Predictor::Condition => record.condition,
            Predictor::Noise => record.noise,
            Predictor::Age => f64::NAN,
        }
    }
}

/// A candidate formula: `area_75 ~ predictors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateModel {
    pub name: &'static str,
    pub predictors: &'static [Predictor],
}

pub const CANDIDATE_MODELS: [CandidateModel; 16] = [
    CandidateModel { name: "null", predictors: &[] },
    CandidateModel { name: "comm_distance", predictors: &[CommDistance] },
    CandidateModel { name: "age", predictors: &[Age] },
    CandidateModel { name: "condition", predictors: &[Condition] },
    CandidateModel { name: "noise", predictors: &[Noise] },
    CandidateModel { name: "comm_distance + age", predictors: &[CommDistance, Age] },
    CandidateModel { name: "comm_distance + condition", predictors: &[CommDistance, Condition] },
    CandidateModel { name: "comm_distance + noise", predictors: &[CommDistance, Noise] },
    CandidateModel { name: "age + condition", predictors: &[Age, Condition] },
    CandidateModel { name: "age + noise", predictors: &[Age, Noise] },
    CandidateModel { name: "condition + noise", predictors: &[Condition, Noise] },
    CandidateModel { name: "comm_distance + age + condition", predictors: &[CommDistance, Age, Condition] },
    CandidateModel { name: "comm_distance + age + noise", predictors: &[CommDistance, Age, Noise] },
    CandidateModel { name: "comm_distance + condition + noise", predictors: &[CommDistance, Condition, Noise] },
    CandidateModel { name: "age + condition + noise", predictors: &[Age, Condition, Noise] },
    CandidateModel {
        name: "comm_distance + age + condition + noise",
        predictors: &[CommDistance, Age, Condition, Noise],
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
}

/// A fitted candidate with its information-criterion scores.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    pub name: &'static str,
    pub n: usize,
    /// Number of estimated parameters, variance included
    pub k: usize,
    pub coefficients: Vec<Coefficient>,
    pub r_squared: f64,
    pub log_likelihood: f64,
    pub aicc: f64,
    /// Filled in by the ranking
    pub delta_aicc: f64,
    pub weight: f64,
}

impl fmt::Display for FittedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "area_75 ~ {}  (n={}, k={}, R²={:.3}, AICc={:.2})",
            self.name, self.n, self.k, self.r_squared, self.aicc
        )?;
        writeln!(
            f,
            "{:<22} {:>14} {:>12} {:>8} {:>9}",
            "term", "estimate", "std.error", "t", "p"
        )?;
        for c in &self.coefficients {
            writeln!(
                f,
                "{:<22} {:>14.4} {:>12.4} {:>8.3} {:>9.4}",
                c.term, c.estimate, c.std_error, c.t_value, c.p_value
            )?;
        }
        Ok(())
    }
}

/// Sorted levels of the categorical `age` column.
fn age_levels(records: &[ModelRecord]) -> Vec<&str> {
    records
        .iter()
        .map(|r| r.age.trim())
        .unique()
        .sorted()
        .collect()
}

/// Build the design matrix and its column names.
fn design_matrix(
    records: &[ModelRecord],
    predictors: &[Predictor],
    levels: &[&str],
) -> (DMatrix<f64>, Vec<String>) {
    let mut terms = vec!["(Intercept)".to_string()];
    for p in predictors {
        match p {
            Predictor::Age => terms.extend(levels.iter().skip(1).map(|l| format!("age[{l}]"))),
            other => terms.push(other.name().to_string()),
        }
    }

    let mut x = DMatrix::zeros(records.len(), terms.len());
    for (i, rec) in records.iter().enumerate() {
        x[(i, 0)] = 1.0;
        let mut col = 1;
        for p in predictors {
            match p {
                Predictor::Age => {
                    for level in levels.iter().skip(1) {
                        x[(i, col)] = if rec.age.trim() == *level { 1.0 } else { 0.0 };
                        col += 1;
                    }
                }
                other => {
                    x[(i, col)] = other.value(rec);
                    col += 1;
                }
            }
        }
    }
    (x, terms)
}

/// Fit one candidate by OLS through the normal equations.
///
/// Return
/// ----------
/// * `Err(InsufficientData)` when `n − k − 1 ≤ 0` (AICc undefined).
/// * `Err(SingularDesign)` when `XᵀX` cannot be inverted.
/// * `Err(DegenerateGeometry)` for a perfect fit (zero residuals).
pub fn fit_candidate(
    records: &[ModelRecord],
    candidate: &CandidateModel,
) -> Result<FittedModel, TerritoryError> {
    let levels = age_levels(records);
    fit_with_levels(records, candidate, &levels)
}

fn fit_with_levels(
    records: &[ModelRecord],
    candidate: &CandidateModel,
    levels: &[&str],
) -> Result<FittedModel, TerritoryError> {
    let (x, terms) = design_matrix(records, candidate.predictors, levels);
    let n = records.len();
    let p = terms.len();
    let k = p + 1;
    if n <= k + 1 {
        return Err(TerritoryError::insufficient(
            k + 2,
            n,
            format!("AICc of model '{}'", candidate.name),
        ));
    }

    let sv = x.clone().svd(false, false).singular_values;
    if sv.min() <= RANK_TOLERANCE * sv.max() {
        return Err(TerritoryError::SingularDesign(candidate.name.to_string()));
    }

    let y = DVector::from_iterator(n, records.iter().map(|r| r.area_75));
    let xt = x.transpose();
    let xtx_inv = (&xt * &x)
        .try_inverse()
        .filter(|m| m.iter().all(|v| v.is_finite()))
        .ok_or_else(|| TerritoryError::SingularDesign(candidate.name.to_string()))?;
    let beta = &xtx_inv * (&xt * &y);

    let residuals = &y - &x * &beta;
    let rss = residuals.norm_squared();
    let y_mean = y.mean();
    let tss = y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>();
    if rss <= f64::EPSILON * tss.max(1.0) {
        return Err(TerritoryError::DegenerateGeometry(format!(
            "model '{}' fits exactly, log-likelihood undefined",
            candidate.name
        )));
    }

    let nf = n as f64;
    let kf = k as f64;
    let df_resid = (n - p) as f64;
    let sigma2 = rss / df_resid;

    let coefficients = terms
        .into_iter()
        .enumerate()
        .map(|(j, term)| {
            let estimate = beta[j];
            let std_error = (sigma2 * xtx_inv[(j, j)]).sqrt();
            let t_value = estimate / std_error;
            Coefficient {
                term,
                estimate,
                std_error,
                t_value,
                p_value: student_t_two_sided_p(t_value, df_resid),
            }
        })
        .collect();

    let log_likelihood =
        -0.5 * nf * ((2.0 * std::f64::consts::PI).ln() + (rss / nf).ln() + 1.0);
    let aicc = -2.0 * log_likelihood + 2.0 * kf + 2.0 * kf * (kf + 1.0) / (nf - kf - 1.0);

    Ok(FittedModel {
        name: candidate.name,
        n,
        k,
        coefficients,
        r_squared: if tss > 0.0 { 1.0 - rss / tss } else { 0.0 },
        log_likelihood,
        aicc,
        delta_aicc: 0.0,
        weight: 0.0,
    })
}

/// Sort by AICc and fill in Δ and the Akaike weights.
pub fn rank_models(mut models: Vec<FittedModel>) -> Vec<FittedModel> {
    models.sort_by(|a, b| a.aicc.total_cmp(&b.aicc));
    let Some(best) = models.first().map(|m| m.aicc) else {
        return models;
    };
    let total: f64 = models
        .iter()
        .map(|m| (-0.5 * (m.aicc - best)).exp())
        .sum();
    for m in &mut models {
        m.delta_aicc = m.aicc - best;
        m.weight = (-0.5 * m.delta_aicc).exp() / total;
    }
    models
}

/// Ranked candidates, best first.
#[derive(Debug, Default)]
pub struct ModelSelection {
    pub models: Vec<FittedModel>,
    /// Candidates that could not be fitted, with the cause
    pub failures: Vec<(&'static str, TerritoryError)>,
}

impl ModelSelection {
    pub fn best(&self) -> Option<&FittedModel> {
        self.models.first()
    }

    pub fn get(&self, name: &str) -> Option<&FittedModel> {
        self.models.iter().find(|m| m.name == name)
    }

    /// 1-based rank of a candidate.
    pub fn rank_of(&self, name: &str) -> Option<usize> {
        self.models.iter().position(|m| m.name == name).map(|i| i + 1)
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>4}  {:<40} {:>3} {:>12} {:>8} {:>7}",
            "rank", "model", "k", "AICc", "ΔAICc", "weight"
        )?;
        for (i, m) in self.models.iter().enumerate() {
            writeln!(
                f,
                "{:>4}  {:<40} {:>3} {:>12.2} {:>8.2} {:>7.3}",
                i + 1,
                m.name,
                m.k,
                m.aicc,
                m.delta_aicc,
                m.weight
            )?;
        }
        Ok(())
    }
}

/// Fit every candidate of [`CANDIDATE_MODELS`] and rank them by AICc.
///
/// Candidates that fail are kept in [`ModelSelection::failures`]; the call only fails
/// when no candidate could be fitted at all.
pub fn select_models(records: &[ModelRecord]) -> Result<ModelSelection, TerritoryError> {
    if records.is_empty() {
        return Err(TerritoryError::insufficient(1, 0, "model selection"));
    }
    let levels = age_levels(records);
    debug!(n = records.len(), ?levels, "age levels");
    if levels.len() < 2 {
        warn!("a single age class, age terms reduce to the intercept");
    }

    let mut fitted = Vec::with_capacity(CANDIDATE_MODELS.len());
    let mut failures = Vec::new();
    for candidate in &CANDIDATE_MODELS {
        match fit_with_levels(records, candidate, &levels) {
            Ok(m) => fitted.push(m),
            Err(err) => {
                warn!(model = candidate.name, "candidate not fitted: {err}");
                failures.push((candidate.name, err));
            }
        }
    }

    if fitted.is_empty() {
        return Err(failures
            .into_iter()
            .next()
            .map(|(_, e)| e)
            .unwrap_or_else(|| TerritoryError::insufficient(1, 0, "model selection")));
    }

    let selection = ModelSelection {
        models: rank_models(fitted),
        failures,
    };
    if let Some(best) = selection.best() {
        info!(model = best.name, aicc = best.aicc, weight = best.weight, "best supported model");
    }
    Ok(selection)
}
