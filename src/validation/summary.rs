//! Aggregation of a [`TrialLedger`] into mean ± standard error per `(bird, sample size)`.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    constants::{BirdId, SquareMeter},
    stats::{mean, std_error},
};

use super::TrialLedger;

/// Mean area and its standard error over the trials of one `(bird, n)` cell.
///
/// `mean_area` and `std_error` are computed over valid trials only; they are `None` when
/// fewer than one (resp. two) trials produced an area.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSizeSummary {
    pub bird_id: BirdId,
    pub sample_size: usize,
    pub n_trials: usize,
    pub n_valid: usize,
    pub mean_area: Option<SquareMeter>,
    pub std_error: Option<SquareMeter>,
}

/// Summarize a ledger, ordered by bird then sample size.
pub fn summarize(ledger: &TrialLedger) -> Vec<SampleSizeSummary> {
    let mut cells: BTreeMap<(&BirdId, usize), (usize, Vec<f64>)> = BTreeMap::new();
    for t in ledger.trials() {
        let cell = cells.entry((&t.bird_id, t.sample_size)).or_default();
        cell.0 += 1;
        if let Some(a) = t.area_m2 {
            cell.1.push(a);
        }
    }

    cells
        .into_iter()
        .map(|((bird, n), (n_trials, areas))| SampleSizeSummary {
            bird_id: bird.clone(),
            sample_size: n,
            n_trials,
            n_valid: areas.len(),
            mean_area: mean(&areas),
            std_error: std_error(&areas),
        })
        .collect()
}

/// Smallest sample size from which the mean area stays within `tolerance` (relative) of
/// the mean at the largest evaluated size, per bird.
///
/// `None` when a bird has no cell with a mean area. A bird evaluated at a single size
/// trivially plateaus there.
pub fn plateau_sample_size(
    summaries: &[SampleSizeSummary],
    tolerance: f64,
) -> BTreeMap<BirdId, Option<usize>> {
    let mut by_bird: BTreeMap<&BirdId, Vec<(usize, f64)>> = BTreeMap::new();
    for s in summaries {
        let entry = by_bird.entry(&s.bird_id).or_default();
        if let Some(m) = s.mean_area {
            entry.push((s.sample_size, m));
        }
    }

    by_bird
        .into_iter()
        .map(|(bird, mut curve)| {
            curve.sort_by_key(|(n, _)| *n);
            let plateau = curve.last().and_then(|&(_, reference)| {
                // walk back from the largest size while the curve stays in the band
                let within = |m: f64| (m - reference).abs() <= tolerance * reference.abs();
                let stable = curve.iter().rev().take_while(|(_, m)| within(*m)).count();
                curve.get(curve.len() - stable).map(|(n, _)| *n)
            });
            (bird.clone(), plateau)
        })
        .collect()
}

#[cfg(test)]
mod summary_test {
    use super::*;
    use crate::validation::TrialResult;
    use approx::assert_relative_eq;

    fn trial(bird: &str, n: usize, trial: usize, area: Option<f64>) -> TrialResult {
        TrialResult {
            bird_id: bird.into(),
            sample_size: n,
            trial,
            area_m2: area,
            h_value: 10.0,
        }
    }

    #[test]
    fn test_summarize_groups_and_ignores_missing() {
        let mut ledger = TrialLedger::new();
        ledger.record(trial("B", 10, 0, Some(100.0)));
        ledger.record(trial("A", 20, 0, Some(2.0)));
        ledger.record(trial("A", 10, 0, Some(1.0)));
        ledger.record(trial("A", 10, 1, Some(3.0)));
        ledger.record(trial("A", 10, 2, None));

        let rows = summarize(&ledger);
        assert_eq!(rows.len(), 3);
        assert_eq!((rows[0].bird_id.as_str(), rows[0].sample_size), ("A", 10));
        assert_eq!(rows[0].n_trials, 3);
        assert_eq!(rows[0].n_valid, 2);
        assert_eq!(rows[0].mean_area, Some(2.0));
        // sd = sqrt(2), se = sqrt(2)/sqrt(2)
        assert_relative_eq!(rows[0].std_error.unwrap(), 1.0, epsilon = 1e-12);

        assert_eq!(rows[1].sample_size, 20);
        assert_eq!(rows[1].std_error, None);
        assert_eq!(rows[2].bird_id.as_str(), "B");
    }

    #[test]
    fn test_plateau_detection() {
        let row = |bird: &str, n, m: Option<f64>| SampleSizeSummary {
            bird_id: bird.into(),
            sample_size: n,
            n_trials: 10,
            n_valid: 10,
            mean_area: m,
            std_error: None,
        };
        let rows = vec![
            row("A", 10, Some(50.0)),
            row("A", 20, Some(80.0)),
            row("A", 30, Some(97.0)),
            row("A", 40, Some(101.0)),
            row("A", 50, Some(100.0)),
            row("B", 10, Some(10.0)),
            row("B", 20, Some(20.0)),
            row("C", 10, None),
        ];
        let plateau = plateau_sample_size(&rows, 0.05);
        assert_eq!(plateau[&BirdId::from("A")], Some(30));
        assert_eq!(plateau[&BirdId::from("B")], Some(20));
        assert_eq!(plateau[&BirdId::from("C")], None);
    }
}
