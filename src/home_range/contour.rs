//! Iso-density contours by marching squares.
//!
//! The lattice is formed by the cell centers of a [`DensityGrid`]. Each lattice square
//! contributes up to two segments whose endpoints are linear interpolations along the
//! square's edges; segments sharing an edge are then chained into rings. Saddle squares
//! are resolved with the average of the four corners.
use std::collections::HashMap;

use ahash::RandomState;
use nalgebra::Point2;

use crate::constants::SquareMeter;

use super::density_grid::DensityGrid;

/// A closed polygon ring in projected meters; the first vertex is not repeated.
pub type Ring = Vec<Point2<f64>>;

/// Lattice edge: `(col, row, vertical)`. A horizontal edge joins `(col,row)`–`(col+1,row)`,
/// a vertical edge joins `(col,row)`–`(col,row+1)`.
type EdgeKey = (usize, usize, bool);

#[derive(Clone, Copy)]
enum Side {
    Bottom,
    Right,
    Top,
    Left,
}

fn edge_key(col: usize, row: usize, side: Side) -> EdgeKey {
    match side {
        Side::Bottom => (col, row, false),
        Side::Top => (col, row + 1, false),
        Side::Left => (col, row, true),
        Side::Right => (col + 1, row, true),
    }
}

/// Segments crossing a square, given its corner mask (bit 0 = lower-left, 1 = lower-right,
/// 2 = upper-right, 3 = upper-left) and whether its center lies inside.
fn square_segments(mask: u8, center_inside: bool) -> &'static [(Side, Side)] {
    use Side::*;
    match mask {
        1 | 14 => &[(Left, Bottom)],
        2 | 13 => &[(Bottom, Right)],
        3 | 12 => &[(Left, Right)],
        4 | 11 => &[(Right, Top)],
        6 | 9 => &[(Bottom, Top)],
        7 | 8 => &[(Left, Top)],
        5 if center_inside => &[(Bottom, Right), (Top, Left)],
        5 => &[(Left, Bottom), (Right, Top)],
        10 if center_inside => &[(Left, Bottom), (Right, Top)],
        10 => &[(Bottom, Right), (Top, Left)],
        _ => &[],
    }
}

/// Point where the contour crosses a lattice edge.
fn edge_point(grid: &DensityGrid, key: EdgeKey, level: f64) -> Point2<f64> {
    let (col, row, vertical) = key;
    let (col2, row2) = if vertical { (col, row + 1) } else { (col + 1, row) };
    let v1 = grid.values[(row, col)];
    let v2 = grid.values[(row2, col2)];
    let t = if (v2 - v1).abs() > f64::MIN_POSITIVE {
        ((level - v1) / (v2 - v1)).clamp(0.0, 1.0)
    } else {
        0.5
    };
    let x1 = grid.origin.x + col as f64 * grid.cell_size;
    let y1 = grid.origin.y + row as f64 * grid.cell_size;
    let (dx, dy) = if vertical {
        (0.0, grid.cell_size)
    } else {
        (grid.cell_size, 0.0)
    };
    Point2::new(x1 + t * dx, y1 + t * dy)
}

/// Extract the rings of the `level` iso-density line.
pub(crate) fn iso_rings(grid: &DensityGrid, level: f64) -> Vec<Ring> {
    let rows = grid.values.nrows();
    let cols = grid.values.ncols();
    if rows < 2 || cols < 2 {
        return Vec::new();
    }
    let inside = |row: usize, col: usize| grid.values[(row, col)] >= level;

    let mut segments: Vec<(EdgeKey, EdgeKey)> = Vec::new();
    for row in 0..rows - 1 {
        for col in 0..cols - 1 {
            let mask = inside(row, col) as u8
                | (inside(row, col + 1) as u8) << 1
                | (inside(row + 1, col + 1) as u8) << 2
                | (inside(row + 1, col) as u8) << 3;
            if mask == 0 || mask == 15 {
                continue;
            }
            let center = 0.25
                * (grid.values[(row, col)]
                    + grid.values[(row, col + 1)]
                    + grid.values[(row + 1, col + 1)]
                    + grid.values[(row + 1, col)]);
            for &(a, b) in square_segments(mask, center >= level) {
                segments.push((edge_key(col, row, a), edge_key(col, row, b)));
            }
        }
    }

    let mut by_edge: HashMap<EdgeKey, Vec<usize>, RandomState> = HashMap::default();
    for (i, (a, b)) in segments.iter().enumerate() {
        by_edge.entry(*a).or_default().push(i);
        by_edge.entry(*b).or_default().push(i);
    }

    let mut used = vec![false; segments.len()];
    let mut rings = Vec::new();
    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let (first, mut current) = segments[start];
        let mut ring = vec![edge_point(grid, first, level)];

        while current != first {
            ring.push(edge_point(grid, current, level));
            let next = by_edge
                .get(&current)
                .and_then(|segs| segs.iter().copied().find(|&s| !used[s]));
            let Some(next) = next else {
                // open chain at the grid border
                break;
            };
            used[next] = true;
            let (a, b) = segments[next];
            current = if a == current { b } else { a };
        }
        if ring.len() >= 3 {
            rings.push(ring);
        }
    }
    rings
}

/// Unsigned area of a ring (shoelace formula).
pub fn ring_area(ring: &Ring) -> SquareMeter {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let p = ring[i];
            let q = ring[(i + 1) % n];
            p.x * q.y - q.x * p.y
        })
        .sum();
    0.5 * twice.abs()
}
