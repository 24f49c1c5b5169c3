//! # Relocations and per-bird point sets
//!
//! This module defines the observation types that flow through the home-range pipeline:
//!
//! * [`RawRelocation`] – one row of the territory sheet, in geographic coordinates.
//! * [`Observation`] – a relocation after projection to UTM meters (immutable from then on).
//! * [`BirdSetExt`] – construction of a [`BirdSet`] from projected observations
//!   with roster validation, and summary helpers.
//!
//! Reading the delimited input files lives in [`csv_reader`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use perch::observations::{csv_reader::{read_relocations, RelocationColumns}, BirdSetExt};
//! use perch::projection::{project_relocations, UtmProjection};
//! use perch::constants::BirdSet;
//!
//! # fn run() -> Result<(), perch::territory_errors::TerritoryError> {
//! let raw = read_relocations("territories.csv", &RelocationColumns::default(), b',')?;
//! let utm = UtmProjection::from_proj_str("+proj=utm +zone=17 +datum=WGS84 +units=m")?;
//! let (obs, _report) = project_relocations(&utm, &raw);
//! let birds = BirdSet::from_observations(obs, None)?;
//! println!("{} birds, {} points", birds.len(), birds.total_observations());
//! # Ok(()) }
//! ```
pub mod csv_reader;

use std::{collections::BTreeSet, fmt};

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{BirdId, BirdSet, Degree, Meter},
    territory_errors::TerritoryError,
};

/// A relocation as read from the territory sheet, before projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRelocation {
    pub bird_id: BirdId,
    pub longitude: Degree,
    pub latitude: Degree,
    pub recorded_at: Option<String>,
}

impl RawRelocation {
    pub fn new(bird_id: impl Into<BirdId>, longitude: Degree, latitude: Degree) -> Self {
        RawRelocation {
            bird_id: bird_id.into(),
            longitude,
            latitude,
            recorded_at: None,
        }
    }
}

/// A projected relocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub bird_id: BirdId,
    pub longitude: Degree,
    pub latitude: Degree,
    pub easting: Meter,
    pub northing: Meter,
    pub recorded_at: Option<String>,
}

impl Observation {
    /// Planar position in UTM meters.
    #[inline]
    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.easting, self.northing)
    }
}

/// Planar positions of a slice of observations.
pub fn positions(observations: &[Observation]) -> Vec<Point2<f64>> {
    observations.iter().map(Observation::position).collect()
}

/// Summary statistics for per-bird relocation counts.
///
/// Percentiles use the nearest-rank method on `[0, n-1]`: index `round(q × (N-1))`.
///
/// * `format!("{}", stats)` – compact single line, `min=12, median=45, max=90`.
/// * `format!("{:#}", stats)` – multi-line table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelocationCountStats {
    pub birds: usize,
    pub min: usize,
    pub p25: usize,
    pub median: usize,
    pub max: usize,
}

impl fmt::Display for RelocationCountStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Relocations per bird ({} birds)", self.birds)?;
            writeln!(f, "-------------------------------")?;
            writeln!(f, "min    : {}", self.min)?;
            writeln!(f, "p25    : {}", self.p25)?;
            writeln!(f, "median : {}", self.median)?;
            write!(f, "max    : {}", self.max)
        } else {
            write!(
                f,
                "birds={}, min={}, p25={}, median={}, max={}",
                self.birds, self.min, self.p25, self.median, self.max
            )
        }
    }
}

pub trait BirdSetExt: Sized {
    /// Group projected observations by bird.
    ///
    /// Arguments
    /// -----------------
    /// * `observations`: projected relocations, in any order.
    /// * `roster`: when given, every observation's bird must belong to it.
    ///
    /// Return
    /// ----------
    /// * `Err(TerritoryError::UnknownBird)` for the first observation whose bird is
    ///   not in the roster.
    fn from_observations(
        observations: Vec<Observation>,
        roster: Option<&BTreeSet<BirdId>>,
    ) -> Result<Self, TerritoryError>;

    /// Total number of relocations across all birds.
    fn total_observations(&self) -> usize;

    /// Number of relocations of one bird (0 if unknown).
    fn relocation_count(&self, bird: &BirdId) -> usize;

    /// Distribution of relocation counts, `None` when the set is empty.
    fn relocation_count_stats(&self) -> Option<RelocationCountStats>;
}

impl BirdSetExt for BirdSet {
    fn from_observations(
        observations: Vec<Observation>,
        roster: Option<&BTreeSet<BirdId>>,
    ) -> Result<Self, TerritoryError> {
        let mut set = BirdSet::new();
        for obs in observations {
            if let Some(roster) = roster {
                if !roster.contains(&obs.bird_id) {
                    return Err(TerritoryError::UnknownBird(obs.bird_id));
                }
            }
            set.entry(obs.bird_id.clone()).or_default().push(obs);
        }
        Ok(set)
    }

    #[inline]
    fn total_observations(&self) -> usize {
        self.values().map(Vec::len).sum()
    }

    #[inline]
    fn relocation_count(&self, bird: &BirdId) -> usize {
        self.get(bird).map_or(0, Vec::len)
    }

    fn relocation_count_stats(&self) -> Option<RelocationCountStats> {
        let mut counts: Vec<usize> = self.values().map(Vec::len).collect();
        if counts.is_empty() {
            return None;
        }
        counts.sort_unstable();

        let n = counts.len();
        let q_index = |q: f64| -> usize {
            let idx = (q * (n as f64 - 1.0)).round() as isize;
            idx.clamp(0, n as isize - 1) as usize
        };

        Some(RelocationCountStats {
            birds: n,
            min: counts[0],
            p25: counts[q_index(0.25)],
            median: counts[q_index(0.5)],
            max: counts[n - 1],
        })
    }
}

#[cfg(test)]
pub(crate) mod observations_test {
    use super::*;

    pub(crate) fn obs(bird: &str, easting: f64, northing: f64) -> Observation {
        Observation {
            bird_id: bird.into(),
            longitude: 0.0,
            latitude: 0.0,
            easting,
            northing,
            recorded_at: None,
        }
    }

    #[test]
    fn test_group_by_bird() {
        let set = BirdSet::from_observations(
            vec![obs("B", 1.0, 1.0), obs("A", 0.0, 0.0), obs("B", 2.0, 2.0)],
            None,
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.relocation_count(&"B".into()), 2);
        assert_eq!(set.relocation_count(&"Z".into()), 0);
        assert_eq!(set.total_observations(), 3);
        // ordered roster
        let keys: Vec<_> = set.keys().map(BirdId::as_str).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn test_roster_validation() {
        let roster: BTreeSet<BirdId> = ["A".into()].into_iter().collect();
        let err = BirdSet::from_observations(vec![obs("A", 0.0, 0.0), obs("C", 1.0, 1.0)], Some(&roster))
            .unwrap_err();
        assert_eq!(err, TerritoryError::UnknownBird("C".into()));
    }

    #[test]
    fn test_relocation_count_stats() {
        let mut all = Vec::new();
        for (bird, n) in [("A", 10), ("B", 40), ("C", 90), ("D", 25)] {
            all.extend((0..n).map(|i| obs(bird, i as f64, 0.0)));
        }
        let set = BirdSet::from_observations(all, None).unwrap();
        let stats = set.relocation_count_stats().unwrap();
        assert_eq!(stats.min, 10);
        assert_eq!(stats.max, 90);
        assert_eq!(stats.median, 40);
        assert_eq!(
            format!("{stats}"),
            "birds=4, min=10, p25=25, median=40, max=90"
        );
        assert!(BirdSet::new().relocation_count_stats().is_none());
    }
}
