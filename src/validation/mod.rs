//! # Sample-size validation of kernel home ranges
//!
//! Checks empirically whether a bird's home-range area estimate has **plateaued**, i.e.
//! stopped growing as more relocations are added. For every bird `b` with reference
//! bandwidth `h_b`:
//!
//! ```text
//! for n in sample_sizes (ascending), skipping n > |b|:
//!     repeat `trials` times:
//!         draw n relocations uniformly WITHOUT replacement
//!         fit the kernel with the FIXED bandwidth h_b
//!         record (bird, n, trial, area, h_b)
//! ```
//!
//! The bandwidth is taken from a [`BandwidthTable`] built once from the full datasets
//! ([`reference_bandwidths`](crate::home_range::reference_bandwidths)), so that the area
//! curve reflects the sample size only and not bandwidth-selection noise.
//!
//! ## Result model
//! -----------------
//! Trials are appended to an explicit [`TrialLedger`] owned by the run and returned in a
//! [`ValidationOutcome`], together with:
//!
//! * `skipped` – every `(bird, n)` combination skipped because `n` exceeds the bird's
//!   relocation count,
//! * `failed_birds` – birds with no usable bandwidth, or with zero valid trials.
//!
//! A trial whose fit fails (e.g. a collinear subsample) is recorded with `area_m2 = None`;
//! it never aborts the run. [`summarize`] turns the ledger into mean ± standard error per
//! `(bird, n)`, the table behind the sample-size plot.
//!
//! ## Determinism
//! -----------------
//! Birds are visited in roster order and all randomness comes from the caller's RNG, so
//! a seeded [`rand::rngs::StdRng`] reproduces the ledger exactly.
//!
//! ## Progress
//! -----------------
//! [`SampleSizeValidation::validate_sample_sizes_with_progress`] reports the number of
//! completed trials after each trial. With the `progress` feature,
//! [`SampleSizeValidation::validate_sample_sizes`] also renders an `indicatif` bar.
//!
//! ## Example
//! -----------------
//! ```rust,no_run
//! use rand::{rngs::StdRng, SeedableRng};
//! use perch::home_range::{reference_bandwidths, KernelParams};
//! use perch::validation::{summarize, SampleSizeValidation, ValidationParams};
//!
//! # fn run(birds: perch::constants::BirdSet) -> Result<(), perch::territory_errors::TerritoryError> {
//! let params = ValidationParams::builder().trials(100).percent(95.0).build()?;
//! let (bandwidths, _failed) = reference_bandwidths(&birds, &params.kernel);
//! let mut rng = StdRng::seed_from_u64(42);
//!
//! let outcome = birds.validate_sample_sizes(&bandwidths, &mut rng, &params);
//! for row in summarize(&outcome.ledger) {
//!     println!("{} n={} mean={:?} se={:?}", row.bird_id, row.sample_size, row.mean_area, row.std_error);
//! }
//! # Ok(()) }
//! ```
#[cfg(feature = "progress")]
mod progress_bar;
pub mod summary;

use std::fmt;

use nalgebra::Point2;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    constants::{
        BandwidthTable, BirdId, BirdSet, Meter, Percent, SquareMeter, DEFAULT_PERCENT,
        DEFAULT_SAMPLE_SIZES, DEFAULT_TRIALS,
    },
    home_range::{estimate_area, Bandwidth, KernelParams},
    observations::positions,
    territory_errors::TerritoryError,
};

pub use summary::{plateau_sample_size, summarize, SampleSizeSummary};

/// Configuration of a validation run.
///
/// Defaults: sample sizes `10, 20, …, 90`, `100` trials per size, `95` % contour,
/// default [`KernelParams`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationParams {
    pub sample_sizes: Vec<usize>,
    pub trials: usize,
    pub percent: Percent,
    pub kernel: KernelParams,
}

impl Default for ValidationParams {
    fn default() -> Self {
        ValidationParams {
            sample_sizes: DEFAULT_SAMPLE_SIZES.to_vec(),
            trials: DEFAULT_TRIALS,
            percent: DEFAULT_PERCENT,
            kernel: KernelParams::default(),
        }
    }
}

impl ValidationParams {
    pub fn builder() -> ValidationParamsBuilder {
        ValidationParamsBuilder::default()
    }
}

impl fmt::Display for ValidationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ValidationParams(sizes={:?}, trials={}, percent={}, {})",
            self.sample_sizes, self.trials, self.percent, self.kernel
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationParamsBuilder {
    params: ValidationParams,
}

impl ValidationParamsBuilder {
    pub fn sample_sizes(mut self, v: Vec<usize>) -> Self {
        self.params.sample_sizes = v;
        self
    }
    pub fn trials(mut self, v: usize) -> Self {
        self.params.trials = v;
        self
    }
    pub fn percent(mut self, v: Percent) -> Self {
        self.params.percent = v;
        self
    }
    pub fn kernel(mut self, v: KernelParams) -> Self {
        self.params.kernel = v;
        self
    }

    /// Validate and return the parameters.
    ///
    /// Rules: a non-empty, strictly ascending grid of sizes `≥ kernel.min_points`,
    /// `trials ≥ 1`, `percent ∈ (0, 100]`.
    pub fn build(self) -> Result<ValidationParams, TerritoryError> {
        let p = &self.params;
        if p.sample_sizes.is_empty() {
            return Err(TerritoryError::InvalidParameter(
                "sample_sizes must not be empty".into(),
            ));
        }
        if p.sample_sizes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(TerritoryError::InvalidParameter(
                "sample_sizes must be strictly ascending".into(),
            ));
        }
        if p.sample_sizes[0] < p.kernel.min_points {
            return Err(TerritoryError::InvalidParameter(format!(
                "sample sizes must be >= min_points ({})",
                p.kernel.min_points
            )));
        }
        if p.trials == 0 {
            return Err(TerritoryError::InvalidParameter(
                "trials must be >= 1".into(),
            ));
        }
        if !(p.percent > 0.0 && p.percent <= 100.0) {
            return Err(TerritoryError::InvalidParameter(
                "percent must be in (0, 100]".into(),
            ));
        }
        Ok(self.params)
    }
}

/// One resampling trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    pub bird_id: BirdId,
    pub sample_size: usize,
    pub trial: usize,
    /// `None` when the fit failed on this subsample
    pub area_m2: Option<SquareMeter>,
    pub h_value: Meter,
}

/// Append-only record of the trials of a run, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialLedger {
    trials: Vec<TrialResult>,
}

impl TrialLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, trial: TrialResult) {
        self.trials.push(trial);
    }

    pub fn trials(&self) -> &[TrialResult] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Trials of one bird.
    pub fn for_bird<'a>(&'a self, bird: &'a BirdId) -> impl Iterator<Item = &'a TrialResult> + 'a {
        self.trials.iter().filter(move |t| &t.bird_id == bird)
    }

    pub fn into_inner(self) -> Vec<TrialResult> {
        self.trials
    }
}

/// A `(bird, n)` combination left out because the bird has fewer than `n` relocations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSize {
    pub bird_id: BirdId,
    pub sample_size: usize,
    pub available: usize,
}

/// Everything a validation run produced.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub ledger: TrialLedger,
    pub skipped: Vec<SkippedSize>,
    pub failed_birds: Vec<(BirdId, TerritoryError)>,
}

impl ValidationOutcome {
    /// Number of trials with a valid area.
    pub fn valid_trials(&self) -> usize {
        self.ledger
            .trials()
            .iter()
            .filter(|t| t.area_m2.is_some())
            .count()
    }
}

/// Snapshot passed to the progress callback after each trial.
#[derive(Debug, Clone, Copy)]
pub struct ValidationProgress<'a> {
    pub bird_id: &'a BirdId,
    pub sample_size: usize,
    pub completed: usize,
    pub total: usize,
}

/// Draw `n` distinct indices uniformly from `0..available`.
///
/// Return
/// ----------
/// * `Err(InsufficientData)` if `n > available`; a subsample never exceeds the data.
pub fn draw_subsample(
    rng: &mut impl Rng,
    available: usize,
    n: usize,
) -> Result<Vec<usize>, TerritoryError> {
    if n > available {
        return Err(TerritoryError::insufficient(n, available, "subsample"));
    }
    Ok(rand::seq::index::sample(rng, available, n).into_vec())
}

/// Sample sizes of the grid usable for a bird with `available` relocations.
fn usable_sizes(sizes: &[usize], available: usize) -> impl Iterator<Item = usize> + '_ {
    sizes.iter().copied().filter(move |&n| n <= available)
}

/// Run all trials of one `(bird, n)` cell into the ledger.
#[allow(clippy::too_many_arguments)]
fn run_cell<F>(
    bird: &BirdId,
    points: &[Point2<f64>],
    h: Meter,
    n: usize,
    rng: &mut impl Rng,
    params: &ValidationParams,
    ledger: &mut TrialLedger,
    completed: &mut usize,
    total: usize,
    on_progress: &mut F,
) -> usize
where
    F: FnMut(&ValidationProgress<'_>),
{
    let mut valid = 0;
    let mut subset = Vec::with_capacity(n);

    for trial in 0..params.trials {
        let area = draw_subsample(rng, points.len(), n).and_then(|idx| {
            subset.clear();
            subset.extend(idx.into_iter().map(|i| points[i]));
            estimate_area(&subset, Bandwidth::Fixed(h), params.percent, &params.kernel)
        });

        let area_m2 = match area {
            Ok((area, _)) => {
                valid += 1;
                Some(area)
            }
            Err(err) => {
                warn!(%bird, n, trial, "trial recorded as missing: {err}");
                None
            }
        };
        ledger.record(TrialResult {
            bird_id: bird.clone(),
            sample_size: n,
            trial,
            area_m2,
            h_value: h,
        });

        *completed += 1;
        on_progress(&ValidationProgress {
            bird_id: bird,
            sample_size: n,
            completed: *completed,
            total,
        });
    }
    valid
}

pub trait SampleSizeValidation {
    /// Run the resampling validation over every bird.
    ///
    /// Arguments
    /// -----------------
    /// * `bandwidths`: reference bandwidth per bird, derived once from the full data.
    /// * `rng`: random source for the subsamples (seed it for reproducible runs).
    /// * `params`: sample-size grid, trials, contour level and kernel grid.
    ///
    /// Return
    /// ----------
    /// * A [`ValidationOutcome`] holding the trial ledger, the skipped sizes and the
    ///   birds for which validation failed. Per-trial failures never abort the run.
    fn validate_sample_sizes(
        &self,
        bandwidths: &BandwidthTable,
        rng: &mut impl Rng,
        params: &ValidationParams,
    ) -> ValidationOutcome;

    /// Same as [`validate_sample_sizes`](SampleSizeValidation::validate_sample_sizes),
    /// calling `on_progress` after every trial.
    fn validate_sample_sizes_with_progress<F>(
        &self,
        bandwidths: &BandwidthTable,
        rng: &mut impl Rng,
        params: &ValidationParams,
        on_progress: F,
    ) -> ValidationOutcome
    where
        F: FnMut(&ValidationProgress<'_>);

    /// Number of trials a run with these parameters will perform.
    fn planned_trials(&self, bandwidths: &BandwidthTable, params: &ValidationParams) -> usize;
}

impl SampleSizeValidation for BirdSet {
    #[cfg(feature = "progress")]
    fn validate_sample_sizes(
        &self,
        bandwidths: &BandwidthTable,
        rng: &mut impl Rng,
        params: &ValidationParams,
    ) -> ValidationOutcome {
        use progress_bar::{fmt_dur, trial_bar, IterTimer};

        let pb = trial_bar(self.planned_trials(bandwidths, params) as u64);
        let mut timer = IterTimer::new(0.2);

        let outcome = self.validate_sample_sizes_with_progress(bandwidths, rng, params, |p| {
            timer.tick();
            pb.set_position(p.completed as u64);
            pb.set_message(format!(
                "bird {} n={} | avg {}",
                p.bird_id,
                p.sample_size,
                fmt_dur(timer.avg())
            ));
        });

        pb.finish_and_clear();
        outcome
    }

    #[cfg(not(feature = "progress"))]
    fn validate_sample_sizes(
        &self,
        bandwidths: &BandwidthTable,
        rng: &mut impl Rng,
        params: &ValidationParams,
    ) -> ValidationOutcome {
        self.validate_sample_sizes_with_progress(bandwidths, rng, params, |_| {})
    }

    fn validate_sample_sizes_with_progress<F>(
        &self,
        bandwidths: &BandwidthTable,
        rng: &mut impl Rng,
        params: &ValidationParams,
        mut on_progress: F,
    ) -> ValidationOutcome
    where
        F: FnMut(&ValidationProgress<'_>),
    {
        let total = self.planned_trials(bandwidths, params);
        info!(birds = self.len(), total, "sample-size validation started");

        let mut outcome = ValidationOutcome::default();
        let mut completed = 0;

        for (bird, observations) in self {
            let Some(&h) = bandwidths.get(bird) else {
                warn!(%bird, "no reference bandwidth, bird skipped");
                outcome
                    .failed_birds
                    .push((bird.clone(), TerritoryError::MissingBandwidth(bird.clone())));
                continue;
            };
            let points = positions(observations);
            let available = points.len();

            for &n in params.sample_sizes.iter().filter(|&&n| n > available) {
                debug!(%bird, n, available, "sample size above relocation count, skipped");
                outcome.skipped.push(SkippedSize {
                    bird_id: bird.clone(),
                    sample_size: n,
                    available,
                });
            }

            let mut valid = 0;
            for n in usable_sizes(&params.sample_sizes, available) {
                valid += run_cell(
                    bird,
                    &points,
                    h,
                    n,
                    rng,
                    params,
                    &mut outcome.ledger,
                    &mut completed,
                    total,
                    &mut on_progress,
                );
            }

            if valid == 0 {
                warn!(%bird, "no valid trial");
                outcome
                    .failed_birds
                    .push((bird.clone(), TerritoryError::NoValidTrials(bird.clone())));
            }
        }

        info!(
            trials = outcome.ledger.len(),
            valid = outcome.valid_trials(),
            skipped_sizes = outcome.skipped.len(),
            failed_birds = outcome.failed_birds.len(),
            "sample-size validation finished"
        );
        outcome
    }

    fn planned_trials(&self, bandwidths: &BandwidthTable, params: &ValidationParams) -> usize {
        self.iter()
            .filter(|(bird, _)| bandwidths.contains_key(*bird))
            .map(|(_, obs)| usable_sizes(&params.sample_sizes, obs.len()).count() * params.trials)
            .sum()
    }
}
