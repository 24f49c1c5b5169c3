//! # Constants and type definitions for perch
//!
//! This module centralizes the **geodetic constants**, **analysis defaults**, and **common type
//! definitions** used throughout the `perch` library.
//!
//! ## Overview
//!
//! - WGS84 ellipsoid and UTM constants
//! - Default kernel grid and resampling grid settings
//! - Core type aliases used across the crate
//! - The [`BirdId`] identifier and the [`BirdSet`] container of relocations

use std::collections::{BTreeMap, HashMap};

use ahash::RandomState;
use serde::{Deserialize, Serialize};

use crate::observations::Observation;

// -------------------------------------------------------------------------------------------------
// Geodetic constants
// -------------------------------------------------------------------------------------------------

/// WGS84 semi-major axis in meters
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS84 inverse flattening
pub const WGS84_INV_F: f64 = 298.257_223_563;

/// UTM scale factor on the central meridian
pub const UTM_K0: f64 = 0.9996;

/// UTM false easting in meters
pub const UTM_FALSE_EASTING: f64 = 500_000.0;

/// UTM false northing for the southern hemisphere in meters
pub const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Southern latitude limit of the UTM system (degrees)
pub const UTM_MIN_LAT: f64 = -80.0;

/// Northern latitude limit of the UTM system (degrees)
pub const UTM_MAX_LAT: f64 = 84.0;

/// Maximum accepted distance from the central meridian (degrees)
pub const UTM_MAX_LON_OFFSET: f64 = 9.0;

// -------------------------------------------------------------------------------------------------
// Analysis defaults
// -------------------------------------------------------------------------------------------------

/// Number of cells per side of the density grid
pub const DEFAULT_GRID: usize = 60;

/// Grid extent, as a fraction of the relocation range added on each side
pub const DEFAULT_EXTENT: f64 = 1.0;

/// Minimum number of relocations for a kernel fit
pub const MIN_RELOCATIONS: usize = 5;

/// Default resampling trials per sample size
pub const DEFAULT_TRIALS: usize = 100;

/// Default contour level for the validator (percent)
pub const DEFAULT_PERCENT: f64 = 95.0;

/// Default sample-size grid for the validator
pub const DEFAULT_SAMPLE_SIZES: [usize; 9] = [10, 20, 30, 40, 50, 60, 70, 80, 90];

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Distance in meters
pub type Meter = f64;
/// Area in square meters
pub type SquareMeter = f64;
/// Contour level in percent (0, 100]
pub type Percent = f64;

// -------------------------------------------------------------------------------------------------
// Identifiers and data containers
// -------------------------------------------------------------------------------------------------

/// Identifier of a banded bird, as written in the field data sheets (e.g. `"RBWA-12"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BirdId(pub String);

impl BirdId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BirdId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BirdId {
    fn from(s: &str) -> Self {
        BirdId(s.trim().to_string())
    }
}

impl From<String> for BirdId {
    fn from(s: String) -> Self {
        BirdId(s.trim().to_string())
    }
}

/// Projected relocations grouped per bird.
///
/// A `BTreeMap` keeps the iteration order stable, which the resampling
/// validator relies on for reproducible trial ledgers.
pub type BirdSet = BTreeMap<BirdId, Vec<Observation>>;

/// Reference bandwidth of each bird, derived once from its full dataset.
pub type BandwidthTable = HashMap<BirdId, Meter, RandomState>;
