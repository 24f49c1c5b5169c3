//! # Body-condition index
//!
//! A scaled mass index normalizes body mass by a linear body-size proxy (wing length) using
//! parameters fitted on the **whole population**:
//!
//! 1. least-squares slope `b` of weight on wing length,
//! 2. Pearson correlation `r` between weight and wing length,
//! 3. exponent `b / r`,
//! 4. population mean wing length `L0`,
//! 5. for each bird, `condition = weight · (L0 / wing_length)^(b / r)`.
//!
//! The parameters are fitted once by [`ScaledMassIndex::fit`] and then applied to every
//! individual; they are never recomputed per row.
//!
//! With [`ConditionScale::LogLog`] steps 1–2 are performed on `ln(weight)` against
//! `ln(wing_length)`, which is the classical form of the index and makes the exponent
//! invariant to the unit of the wing measurement.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::{
    constants::BirdId,
    stats::{mean, ols_slope, pearson},
    territory_errors::TerritoryError,
};

/// Minimum population size for the regression and the correlation.
pub const MIN_CONDITION_RECORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Habitat {
    Urban,
    Rural,
}

impl FromStr for Habitat {
    type Err = TerritoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "urban" => Ok(Habitat::Urban),
            "rural" => Ok(Habitat::Rural),
            other => Err(TerritoryError::SchemaError(format!(
                "habitat must be 'urban' or 'rural', found '{other}'"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for Habitat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Habitat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Habitat::Urban => write!(f, "urban"),
            Habitat::Rural => write!(f, "rural"),
        }
    }
}

/// One row of the morphometrics sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRecord {
    pub bird_id: BirdId,
    pub wing_length: f64,
    pub weight: f64,
    pub habitat: Habitat,
}

/// Condition index of one individual.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionScore {
    pub bird_id: BirdId,
    pub habitat: Habitat,
    pub wing_length: f64,
    pub weight: f64,
    pub condition_index: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionScale {
    /// Regression on raw weight and wing length
    #[default]
    Linear,
    /// Regression on ln(weight) and ln(wing length)
    LogLog,
}

impl FromStr for ConditionScale {
    type Err = TerritoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(ConditionScale::Linear),
            "log-log" | "loglog" => Ok(ConditionScale::LogLog),
            other => Err(TerritoryError::InvalidParameter(format!(
                "unknown condition scale '{other}' (expected 'linear' or 'log-log')"
            ))),
        }
    }
}

/// Population parameters of the scaled mass index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledMassIndex {
    pub scale: ConditionScale,
    pub slope: f64,
    pub correlation: f64,
    pub exponent: f64,
    /// Population mean wing length L0
    pub mean_wing_length: f64,
    pub n: usize,
}

impl ScaledMassIndex {
    /// Fit the population parameters.
    ///
    /// Arguments
    /// -----------------
    /// * `records`: the whole population (at least [`MIN_CONDITION_RECORDS`] birds).
    /// * `scale`: raw or log-log regression.
    ///
    /// Return
    /// ----------
    /// * `Err(InsufficientData)` for fewer than 3 records.
    /// * `Err(DegenerateGeometry)` if wing length or weight is constant across the population.
    /// * `Err(InvalidParameter)` for non-positive measurements (the power law needs them > 0).
    pub fn fit(records: &[ConditionRecord], scale: ConditionScale) -> Result<Self, TerritoryError> {
        if records.len() < MIN_CONDITION_RECORDS {
            return Err(TerritoryError::insufficient(
                MIN_CONDITION_RECORDS,
                records.len(),
                "condition index fit",
            ));
        }
        if let Some(bad) = records
            .iter()
            .find(|r| !(r.wing_length > 0.0 && r.weight > 0.0))
        {
            return Err(TerritoryError::InvalidParameter(format!(
                "bird {}: wing length and weight must be positive",
                bad.bird_id
            )));
        }

        let wings: Vec<f64> = records.iter().map(|r| r.wing_length).collect();
        let weights: Vec<f64> = records.iter().map(|r| r.weight).collect();

        let (x, y) = match scale {
            ConditionScale::Linear => (wings.clone(), weights),
            ConditionScale::LogLog => (
                wings.iter().map(|w| w.ln()).collect(),
                weights.iter().map(|w| w.ln()).collect(),
            ),
        };

        let (_, slope) = ols_slope(&x, &y)?;
        let correlation = pearson(&x, &y)?;
        let mean_wing_length = mean(&wings).unwrap_or(f64::NAN);

        let smi = ScaledMassIndex {
            scale,
            slope,
            correlation,
            exponent: slope / correlation,
            mean_wing_length,
            n: records.len(),
        };
        info!(
            n = smi.n,
            slope = smi.slope,
            r = smi.correlation,
            exponent = smi.exponent,
            l0 = smi.mean_wing_length,
            "condition index fitted"
        );
        Ok(smi)
    }

    /// Condition index of one individual with the fitted population parameters.
    #[inline]
    pub fn index(&self, wing_length: f64, weight: f64) -> f64 {
        weight * (self.mean_wing_length / wing_length).powf(self.exponent)
    }

    pub fn score(&self, record: &ConditionRecord) -> ConditionScore {
        ConditionScore {
            bird_id: record.bird_id.clone(),
            habitat: record.habitat,
            wing_length: record.wing_length,
            weight: record.weight,
            condition_index: self.index(record.wing_length, record.weight),
        }
    }

    pub fn score_all(&self, records: &[ConditionRecord]) -> Vec<ConditionScore> {
        records.iter().map(|r| self.score(r)).collect()
    }
}

/// Fit the population parameters and score every record in one call.
pub fn condition_scores(
    records: &[ConditionRecord],
    scale: ConditionScale,
) -> Result<(ScaledMassIndex, Vec<ConditionScore>), TerritoryError> {
    let smi = ScaledMassIndex::fit(records, scale)?;
    let scores = smi.score_all(records);
    Ok((smi, scores))
}
