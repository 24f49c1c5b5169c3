//! # Kernel home-range estimation
//!
//! Fits a bivariate Gaussian kernel density to a bird's projected relocations and derives
//! the area (and outline) of the `p` % **volume contour**: the smallest region that holds
//! `p` % of the estimated utilization distribution.
//!
//! ## Bandwidth
//!
//! Two modes, see [`Bandwidth`]:
//!
//! * [`Bandwidth::Reference`] – the *ad hoc* reference rule ("href"),
//!   `h = sqrt(0.5 · (var x + var y)) · n^(-1/6)`. This is the **only** place a bandwidth
//!   is estimated from data; it is meant to be run once per bird on the full dataset.
//! * [`Bandwidth::Fixed`] – reuse a previously derived `h`. The resampling validator uses
//!   this mode so that sample-size effects on area are not mixed with bandwidth noise.
//!
//! ## Grid
//!
//! The density is evaluated on a square grid of `grid × grid` cells (default 60) around the
//! relocations; the grid extends on each side by `extent` times the relocation range
//! (default 1.0), and by at least four bandwidths. Areas are counted in whole cells, so the
//! output is deterministic for a given input.
//!
//! ## Failure modes
//!
//! * fewer than `min_points` relocations (default 5) → [`TerritoryError::InsufficientData`];
//! * coincident or collinear relocations, or a non-positive bandwidth →
//!   [`TerritoryError::DegenerateGeometry`].
//!
//! ## Example
//!
//! ```rust
//! use nalgebra::Point2;
//! use perch::home_range::{estimate, Bandwidth, KernelParams};
//!
//! let pts: Vec<Point2<f64>> = (0..30)
//!     .map(|i| {
//!         let t = i as f64;
//!         Point2::new(500_000.0 + 40.0 * t.cos() + t, 4_650_000.0 + 25.0 * (1.7 * t).sin())
//!     })
//!     .collect();
//!
//! let params = KernelParams::default();
//! let full = estimate(&pts, Bandwidth::Reference, 95.0, &params).unwrap();
//! let sub = estimate(&pts[..15], Bandwidth::Fixed(full.bandwidth), 95.0, &params).unwrap();
//! assert_eq!(sub.bandwidth, full.bandwidth);
//! ```
pub mod contour;
pub mod density_grid;

use std::fmt;

use nalgebra::Point2;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    constants::{
        BandwidthTable, BirdId, BirdSet, Meter, Percent, SquareMeter, DEFAULT_EXTENT,
        DEFAULT_GRID, MIN_RELOCATIONS,
    },
    observations::positions,
    stats::sample_variance,
    territory_errors::TerritoryError,
};

pub use contour::{ring_area, Ring};
pub use density_grid::DensityGrid;

/// Relative tolerance on the covariance determinant below which a point set is collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-9;

/// Bandwidth selection mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bandwidth {
    /// Derive `h` from the data with the reference rule
    Reference,
    /// Use the given `h` (meters) as is
    Fixed(Meter),
}

/// Grid settings of the kernel estimator.
///
/// Fields
/// -----------------
/// * `grid` – number of cells per side of the square density grid.
/// * `extent` – margin added on each side, as a fraction of the relocation range.
/// * `min_points` – minimum relocations for a fit.
///
/// Defaults: `grid = 60`, `extent = 1.0`, `min_points = 5`.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelParams {
    pub grid: usize,
    pub extent: f64,
    pub min_points: usize,
}

impl Default for KernelParams {
    fn default() -> Self {
        KernelParams {
            grid: DEFAULT_GRID,
            extent: DEFAULT_EXTENT,
            min_points: MIN_RELOCATIONS,
        }
    }
}

impl KernelParams {
    pub fn builder() -> KernelParamsBuilder {
        KernelParamsBuilder::default()
    }
}

impl fmt::Display for KernelParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KernelParams(grid={}, extent={:.2}, min_points={})",
            self.grid, self.extent, self.min_points
        )
    }
}

/// Builder for [`KernelParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct KernelParamsBuilder {
    params: KernelParams,
}

impl KernelParamsBuilder {
    pub fn grid(mut self, v: usize) -> Self {
        self.params.grid = v;
        self
    }
    pub fn extent(mut self, v: f64) -> Self {
        self.params.extent = v;
        self
    }
    pub fn min_points(mut self, v: usize) -> Self {
        self.params.min_points = v;
        self
    }

    /// Validate and return the parameters.
    ///
    /// Rules: `grid ≥ 4`, `extent` finite and `≥ 0`, `min_points ≥ 3`.
    pub fn build(self) -> Result<KernelParams, TerritoryError> {
        let p = &self.params;
        if p.grid < 4 {
            return Err(TerritoryError::InvalidParameter(
                "grid must be >= 4".into(),
            ));
        }
        if !(p.extent.is_finite() && p.extent >= 0.0) {
            return Err(TerritoryError::InvalidParameter(
                "extent must be finite and >= 0".into(),
            ));
        }
        if p.min_points < 3 {
            return Err(TerritoryError::InvalidParameter(
                "min_points must be >= 3".into(),
            ));
        }
        Ok(self.params)
    }
}

/// Home range of one point set at one contour level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomeRangeEstimate {
    pub percent: Percent,
    pub area_m2: SquareMeter,
    /// Bandwidth actually used by the fit
    pub bandwidth: Meter,
    pub cell_size: Meter,
    pub n_points: usize,
    #[serde(skip)]
    pub contour: Vec<Ring>,
}

fn coordinate_variances(points: &[Point2<f64>]) -> (f64, f64, f64) {
    let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
    let vx = sample_variance(&xs).unwrap_or(0.0);
    let vy = sample_variance(&ys).unwrap_or(0.0);

    let n = points.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let cov = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (x - mx) * (y - my))
        .sum::<f64>()
        / (n - 1.0);
    (vx, vy, cov)
}

/// Check that a point set supports a kernel fit.
pub fn check_geometry(points: &[Point2<f64>], params: &KernelParams) -> Result<(), TerritoryError> {
    if points.len() < params.min_points {
        return Err(TerritoryError::insufficient(
            params.min_points,
            points.len(),
            "kernel home range",
        ));
    }
    if points.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
        return Err(TerritoryError::DegenerateGeometry(
            "non-finite relocation".into(),
        ));
    }
    let (vx, vy, cov) = coordinate_variances(points);
    let trace = vx + vy;
    if trace <= 0.0 {
        return Err(TerritoryError::DegenerateGeometry(
            "all relocations are coincident".into(),
        ));
    }
    if vx * vy - cov * cov <= COLLINEAR_TOLERANCE * trace * trace {
        return Err(TerritoryError::DegenerateGeometry(
            "relocations are collinear".into(),
        ));
    }
    Ok(())
}

/// Reference ("href") bandwidth: `sqrt(0.5 · (var x + var y)) · n^(-1/6)`.
pub fn reference_bandwidth(points: &[Point2<f64>]) -> Result<Meter, TerritoryError> {
    if points.len() < 2 {
        return Err(TerritoryError::insufficient(2, points.len(), "reference bandwidth"));
    }
    let (vx, vy, _) = coordinate_variances(points);
    let h = (0.5 * (vx + vy)).sqrt() * (points.len() as f64).powf(-1.0 / 6.0);
    if !(h > 0.0 && h.is_finite()) {
        return Err(TerritoryError::DegenerateGeometry(format!(
            "reference bandwidth is not positive ({h})"
        )));
    }
    Ok(h)
}

/// Fitted kernel density of one point set.
///
/// Several contour levels can be queried from the same fit.
#[derive(Debug, Clone)]
pub struct KernelDensity {
    grid: DensityGrid,
}

impl KernelDensity {
    /// Fit the density surface.
    ///
    /// Arguments
    /// -----------------
    /// * `points`: projected relocations (meters).
    /// * `bandwidth`: [`Bandwidth::Reference`] or [`Bandwidth::Fixed`].
    /// * `params`: grid settings.
    ///
    /// Return
    /// ----------
    /// * The fitted density, or `InsufficientData` / `DegenerateGeometry`.
    pub fn fit(
        points: &[Point2<f64>],
        bandwidth: Bandwidth,
        params: &KernelParams,
    ) -> Result<Self, TerritoryError> {
        check_geometry(points, params)?;
        let h = match bandwidth {
            Bandwidth::Reference => reference_bandwidth(points)?,
            Bandwidth::Fixed(h) => {
                if !(h > 0.0 && h.is_finite()) {
                    return Err(TerritoryError::DegenerateGeometry(format!(
                        "fixed bandwidth must be positive and finite, got {h}"
                    )));
                }
                h
            }
        };
        Ok(KernelDensity {
            grid: DensityGrid::fit(points, h, params),
        })
    }

    pub fn bandwidth(&self) -> Meter {
        self.grid.bandwidth()
    }

    pub fn grid(&self) -> &DensityGrid {
        &self.grid
    }

    /// Area of the `percent` % volume contour (m²).
    pub fn area(&self, percent: Percent) -> Result<SquareMeter, TerritoryError> {
        self.grid.area(percent)
    }

    /// Outline of the `percent` % volume contour.
    pub fn contour(&self, percent: Percent) -> Result<Vec<Ring>, TerritoryError> {
        let (_, threshold) = self.grid.volume_cells(percent)?;
        Ok(contour::iso_rings(&self.grid, threshold))
    }

    /// Area and outline at one level.
    pub fn estimate(&self, percent: Percent) -> Result<HomeRangeEstimate, TerritoryError> {
        let (cells, threshold) = self.grid.volume_cells(percent)?;
        Ok(HomeRangeEstimate {
            percent,
            area_m2: cells as f64 * self.grid.cell_area(),
            bandwidth: self.grid.bandwidth(),
            cell_size: self.grid.cell_size(),
            n_points: self.grid.n_points(),
            contour: contour::iso_rings(&self.grid, threshold),
        })
    }
}

/// Fit and extract the home range at one level in a single call.
pub fn estimate(
    points: &[Point2<f64>],
    bandwidth: Bandwidth,
    percent: Percent,
    params: &KernelParams,
) -> Result<HomeRangeEstimate, TerritoryError> {
    KernelDensity::fit(points, bandwidth, params)?.estimate(percent)
}

/// Area only (no contour tracing) – used by the resampling loop.
///
/// Return
/// ----------
/// * `(area_m2, bandwidth used)`
pub fn estimate_area(
    points: &[Point2<f64>],
    bandwidth: Bandwidth,
    percent: Percent,
    params: &KernelParams,
) -> Result<(SquareMeter, Meter), TerritoryError> {
    let kd = KernelDensity::fit(points, bandwidth, params)?;
    Ok((kd.area(percent)?, kd.bandwidth()))
}

/// Several levels from a single fit.
pub fn estimate_levels(
    points: &[Point2<f64>],
    bandwidth: Bandwidth,
    percents: &[Percent],
    params: &KernelParams,
) -> Result<Vec<HomeRangeEstimate>, TerritoryError> {
    let kd = KernelDensity::fit(points, bandwidth, params)?;
    percents.iter().map(|&p| kd.estimate(p)).collect()
}

/// Derive the reference bandwidth of every bird from its full dataset.
///
/// The table is built once, up front, and is read-only afterwards. Birds whose full
/// dataset cannot support a kernel fit are returned separately with the cause.
pub fn reference_bandwidths(
    birds: &BirdSet,
    params: &KernelParams,
) -> (BandwidthTable, Vec<(BirdId, TerritoryError)>) {
    let mut table = BandwidthTable::default();
    let mut failed = Vec::new();

    for (bird, observations) in birds {
        let pts = positions(observations);
        match check_geometry(&pts, params).and_then(|_| reference_bandwidth(&pts)) {
            Ok(h) => {
                debug!(%bird, n = pts.len(), h, "reference bandwidth");
                table.insert(bird.clone(), h);
            }
            Err(err) => {
                warn!(%bird, "no reference bandwidth: {err}");
                failed.push((bird.clone(), err));
            }
        }
    }
    (table, failed)
}

/// One row of the per-bird area table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaRow {
    pub bird_id: BirdId,
    pub n_points: usize,
    pub h_ref: Meter,
    pub percent: Percent,
    pub area_m2: SquareMeter,
}

/// Per-bird home ranges on the full data, at each requested level.
///
/// Return
/// ----------
/// * `(rows, estimates, failures)` – `rows` is the flat area table, `estimates` keeps
///   the contours for export; birds that cannot be fitted are listed in `failures`.
#[allow(clippy::type_complexity)]
pub fn area_table(
    birds: &BirdSet,
    percents: &[Percent],
    params: &KernelParams,
) -> (
    Vec<AreaRow>,
    Vec<(BirdId, HomeRangeEstimate)>,
    Vec<(BirdId, TerritoryError)>,
) {
    let mut rows = Vec::new();
    let mut estimates = Vec::new();
    let mut failures = Vec::new();

    for (bird, observations) in birds {
        let pts = positions(observations);
        match estimate_levels(&pts, Bandwidth::Reference, percents, params) {
            Ok(levels) => {
                for est in levels {
                    rows.push(AreaRow {
                        bird_id: bird.clone(),
                        n_points: est.n_points,
                        h_ref: est.bandwidth,
                        percent: est.percent,
                        area_m2: est.area_m2,
                    });
                    estimates.push((bird.clone(), est));
                }
            }
            Err(err) => {
                warn!(%bird, "home range skipped: {err}");
                failures.push((bird.clone(), err));
            }
        }
    }
    (rows, estimates, failures)
}
