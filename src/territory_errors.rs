use thiserror::Error;

use crate::constants::BirdId;

#[derive(Error, Debug)]
pub enum TerritoryError {
    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Projection error: {0}")]
    ProjectionError(String),

    #[error("Insufficient data for {context}: need at least {needed}, found {found}")]
    InsufficientData {
        needed: usize,
        found: usize,
        context: String,
    },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Observation refers to a bird missing from the roster: {0}")]
    UnknownBird(BirdId),

    #[error("No valid resampling trial for bird {0}")]
    NoValidTrials(BirdId),

    #[error("No reference bandwidth for bird {0}")]
    MissingBandwidth(BirdId),

    #[error("Singular design matrix for model {0}")]
    SingularDesign(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TerritoryError {
    pub(crate) fn insufficient(needed: usize, found: usize, context: impl Into<String>) -> Self {
        TerritoryError::InsufficientData {
            needed,
            found,
            context: context.into(),
        }
    }
}

impl PartialEq for TerritoryError {
    fn eq(&self, other: &Self) -> bool {
        use TerritoryError::*;
        match (self, other) {
            (SchemaError(a), SchemaError(b)) => a == b,
            (ProjectionError(a), ProjectionError(b)) => a == b,
            (
                InsufficientData {
                    needed: n1,
                    found: f1,
                    context: c1,
                },
                InsufficientData {
                    needed: n2,
                    found: f2,
                    context: c2,
                },
            ) => n1 == n2 && f1 == f2 && c1 == c2,
            (DegenerateGeometry(a), DegenerateGeometry(b)) => a == b,
            (InvalidParameter(a), InvalidParameter(b)) => a == b,
            (UnknownBird(a), UnknownBird(b)) => a == b,
            (NoValidTrials(a), NoValidTrials(b)) => a == b,
            (MissingBandwidth(a), MissingBandwidth(b)) => a == b,
            (SingularDesign(a), SingularDesign(b)) => a == b,

            // Wrapped errors are not comparable: equal when the variant matches
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            (JsonError(_), JsonError(_)) => true,

            _ => false,
        }
    }
}
