//! # perch
//!
//! Territory statistics for banded songbirds: kernel home ranges from GPS relocations,
//! a resampling check of how the home-range area depends on the number of relocations,
//! a scaled body-condition index, and AICc model selection relating territory size to
//! communication distance, noise, age and condition.
//!
//! ## Pipeline
//!
//! ```text
//! territories.csv ──csv_reader──▶ RawRelocation ──projection (UTM)──▶ Observation
//!        │                                                              │
//!        │                                                   BirdSet (per bird, ordered)
//!        │                                                              │
//!        │                  home_range::reference_bandwidths ◀──────────┤
//!        │                          │ BandwidthTable                    │
//!        │                          ▼                                   ▼
//!        │      validation::SampleSizeValidation ─▶ TrialLedger   home_range::area_table
//!        │                          │                                   │
//!        ▼                          ▼                                   ▼
//! condition.csv ─▶ condition ─▶ export::*_csv              export::contours_to_geojson
//! models.csv ────▶ models (AICc, Welch) ─▶ export::write_model_table_csv
//! ```
//!
//! The `perch` binary (feature `cli`) wires these stages into subcommands.
pub mod condition;
pub mod constants;
pub mod export;
pub mod home_range;
pub mod models;
pub mod observations;
pub mod projection;
pub mod stats;
pub mod territory_errors;
pub mod validation;

pub use territory_errors::TerritoryError;
