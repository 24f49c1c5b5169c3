//! Gaussian kernel density evaluated on a square grid.
//!
//! The bivariate normal kernel is separable, so the density on the grid is one matrix
//! product: with `Kx[p, i] = exp(-(x_i - x_p)² / 2h²)` and `Ky[p, j] = exp(-(y_j - y_p)² / 2h²)`,
//!
//! ```text
//! f[j, i] = (Kyᵀ · Kx)[j, i] / (2π n h²)
//! ```
//!
//! which costs `O(n · grid)` exponentials instead of `O(n · grid²)`.
use nalgebra::{DMatrix, Point2};

use crate::{
    constants::{Meter, Percent, SquareMeter},
    territory_errors::TerritoryError,
};

use super::KernelParams;

/// Smallest margin around the relocations, in bandwidths, so that the grid holds
/// essentially all of the kernel mass even for small subsamples.
const MIN_MARGIN_BANDWIDTHS: f64 = 4.0;

/// Kernel density surface of one point set.
#[derive(Debug, Clone)]
pub struct DensityGrid {
    /// Center of the lower-left cell
    pub(crate) origin: Point2<f64>,
    pub(crate) cell_size: Meter,
    /// `values[(row, col)]` is the density at `(origin.x + col·cell, origin.y + row·cell)`
    pub(crate) values: DMatrix<f64>,
    pub(crate) bandwidth: Meter,
    pub(crate) n_points: usize,
}

impl DensityGrid {
    /// Evaluate the kernel density of `points` with bandwidth `h`.
    ///
    /// The grid is square, `params.grid` cells per side, centered on the bounding box of the
    /// points, and extends on each side by `max(extent · range, 4h)` where `range` is the
    /// larger side of the bounding box.
    pub(crate) fn fit(points: &[Point2<f64>], h: Meter, params: &KernelParams) -> Self {
        let (mut xmin, mut xmax, mut ymin, mut ymax) = (
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
        );
        for p in points {
            xmin = xmin.min(p.x);
            xmax = xmax.max(p.x);
            ymin = ymin.min(p.y);
            ymax = ymax.max(p.y);
        }
        let range = (xmax - xmin).max(ymax - ymin);
        let margin = (params.extent * range).max(MIN_MARGIN_BANDWIDTHS * h);
        let half_side = 0.5 * range + margin;
        let cx = 0.5 * (xmin + xmax);
        let cy = 0.5 * (ymin + ymax);

        let grid = params.grid;
        let cell_size = 2.0 * half_side / grid as f64;
        let origin = Point2::new(
            cx - half_side + 0.5 * cell_size,
            cy - half_side + 0.5 * cell_size,
        );

        let n = points.len();
        let inv_two_h2 = 1.0 / (2.0 * h * h);
        let kx = DMatrix::from_fn(n, grid, |p, i| {
            let dx = origin.x + i as f64 * cell_size - points[p].x;
            (-dx * dx * inv_two_h2).exp()
        });
        let ky = DMatrix::from_fn(n, grid, |p, j| {
            let dy = origin.y + j as f64 * cell_size - points[p].y;
            (-dy * dy * inv_two_h2).exp()
        });

        let norm = 1.0 / (2.0 * std::f64::consts::PI * n as f64 * h * h);
        let values = ky.transpose() * kx * norm;

        DensityGrid {
            origin,
            cell_size,
            values,
            bandwidth: h,
            n_points: n,
        }
    }

    #[inline]
    pub fn cell_area(&self) -> SquareMeter {
        self.cell_size * self.cell_size
    }

    /// Kernel mass captured by the grid (≈ 1 when the grid covers the kernels).
    pub fn captured_mass(&self) -> f64 {
        self.values.sum() * self.cell_area()
    }

    /// Smallest set of cells holding `percent` % of the density mass.
    ///
    /// Return
    /// ----------
    /// * `(cell count, density threshold)` – cells with density `>= threshold` form the set.
    pub(crate) fn volume_cells(&self, percent: Percent) -> Result<(usize, f64), TerritoryError> {
        if !(percent > 0.0 && percent <= 100.0) {
            return Err(TerritoryError::InvalidParameter(format!(
                "contour percent must be in (0, 100], got {percent}"
            )));
        }
        let total = self.values.sum();
        if !(total > 0.0 && total.is_finite()) {
            return Err(TerritoryError::DegenerateGeometry(
                "density surface has no finite mass on the grid".into(),
            ));
        }

        let mut sorted: Vec<f64> = self.values.iter().copied().collect();
        sorted.sort_unstable_by(|a, b| b.total_cmp(a));

        let target = percent / 100.0 * total;
        let mut cumulative = 0.0;
        for (k, v) in sorted.iter().enumerate() {
            cumulative += v;
            if cumulative >= target {
                return Ok((k + 1, *v));
            }
        }
        // rounding on percent = 100
        Ok((sorted.len(), *sorted.last().unwrap_or(&0.0)))
    }

    /// Area of the `percent` % volume contour in square meters.
    pub fn area(&self, percent: Percent) -> Result<SquareMeter, TerritoryError> {
        let (cells, _) = self.volume_cells(percent)?;
        Ok(cells as f64 * self.cell_area())
    }

    pub fn bandwidth(&self) -> Meter {
        self.bandwidth
    }

    pub fn cell_size(&self) -> Meter {
        self.cell_size
    }

    pub fn n_points(&self) -> usize {
        self.n_points
    }
}

#[cfg(test)]
mod density_grid_test {
    use super::*;
    use approx::assert_relative_eq;

    fn square_cloud() -> Vec<Point2<f64>> {
        let mut pts = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                pts.push(Point2::new(1000.0 + 10.0 * i as f64, 2000.0 + 10.0 * j as f64));
            }
        }
        pts
    }

    #[test]
    fn test_grid_holds_the_mass() {
        let params = KernelParams::default();
        let grid = DensityGrid::fit(&square_cloud(), 8.0, &params);
        assert_eq!(grid.values.nrows(), params.grid);
        assert_eq!(grid.values.ncols(), params.grid);
        assert_relative_eq!(grid.captured_mass(), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_separable_density_matches_direct_sum() {
        let params = KernelParams::builder().grid(12).build().unwrap();
        let pts = square_cloud();
        let h = 15.0;
        let grid = DensityGrid::fit(&pts, h, &params);

        let (row, col) = (5, 7);
        let x = grid.origin.x + col as f64 * grid.cell_size;
        let y = grid.origin.y + row as f64 * grid.cell_size;
        let direct: f64 = pts
            .iter()
            .map(|p| {
                let d2 = (x - p.x).powi(2) + (y - p.y).powi(2);
                (-d2 / (2.0 * h * h)).exp()
            })
            .sum::<f64>()
            / (2.0 * std::f64::consts::PI * pts.len() as f64 * h * h);
        assert_relative_eq!(grid.values[(row, col)], direct, max_relative = 1e-12);
    }

    #[test]
    fn test_area_grows_with_percent() {
        let grid = DensityGrid::fit(&square_cloud(), 8.0, &KernelParams::default());
        let a50 = grid.area(50.0).unwrap();
        let a75 = grid.area(75.0).unwrap();
        let a95 = grid.area(95.0).unwrap();
        assert!(a50 < a75 && a75 < a95);
        assert!(grid.area(0.0).is_err());
        assert!(grid.area(101.0).is_err());
    }
}
