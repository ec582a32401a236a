//! Severity of a freshly scanned sheet
//!
//! Confirmed defect cells of a two-page spread are marked on a
//! `grid × 2·grid` occupancy grid. Large connected clusters are worse than the
//! same number of scattered cells, so connected components are checked first
//! and overall occupancy is only the fallback.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::geometry::GridCell;

/// Component share of all cells that makes a sheet red
pub const RED_COMPONENT_FRACTION: f64 = 0.10;

/// Component share of all cells that makes a sheet orange
pub const ORANGE_COMPONENT_FRACTION: f64 = 0.04;

/// Occupied share above which a sheet is yellow
pub const YELLOW_OCCUPANCY_FRACTION: f64 = 0.10;

/// Occupied share above which a sheet is gray
pub const GRAY_OCCUPANCY_FRACTION: f64 = 0.05;

/// Discrete risk level, ordered from harmless to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Green,
    Gray,
    Yellow,
    Orange,
    Red,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Green => "green",
            Severity::Gray => "gray",
            Severity::Yellow => "yellow",
            Severity::Orange => "orange",
            Severity::Red => "red",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Spatial clustering over a spread's defect grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityEstimator {
    grid_size: u32,
}

impl SeverityEstimator {
    pub fn new(grid_size: u32) -> Self {
        Self {
            grid_size: grid_size.max(1),
        }
    }

    pub fn rows(&self) -> usize {
        self.grid_size as usize
    }

    /// Two pages side by side
    pub fn cols(&self) -> usize {
        2 * self.grid_size as usize
    }

    /// Cells of a full spread
    pub fn spread_cells(&self) -> usize {
        self.rows() * self.cols()
    }

    /// Reduce defect cells to one severity.
    ///
    /// `total_cells` is the denominator for every fraction. Cells outside the
    /// spread grid are ignored and duplicate cells count once.
    pub fn estimate(&self, cells: &[GridCell], total_cells: usize) -> Severity {
        let (rows, cols) = (self.rows(), self.cols());
        let mut occupied = vec![false; rows * cols];
        let mut count = 0usize;
        for cell in cells {
            let (r, c) = (cell.row as usize, cell.col as usize);
            if r < rows && c < cols && !occupied[r * cols + c] {
                occupied[r * cols + c] = true;
                count += 1;
            }
        }

        if count == 0 || total_cells == 0 {
            return Severity::Green;
        }
        let total = total_cells as f64;

        // the largest cluster decides; a small one must not mask it
        let largest = component_sizes(&occupied, rows, cols)
            .into_iter()
            .max()
            .unwrap_or(0);
        let share = largest as f64 / total;
        if share >= RED_COMPONENT_FRACTION {
            return Severity::Red;
        }
        if share >= ORANGE_COMPONENT_FRACTION {
            return Severity::Orange;
        }

        let occupancy = count as f64 / total;
        if occupancy > YELLOW_OCCUPANCY_FRACTION {
            Severity::Yellow
        } else if occupancy > GRAY_OCCUPANCY_FRACTION {
            Severity::Gray
        } else {
            Severity::Green
        }
    }
}

/// Sizes of 4-connected components of `occupied`
fn component_sizes(occupied: &[bool], rows: usize, cols: usize) -> Vec<usize> {
    let mut visited = vec![false; occupied.len()];
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..occupied.len() {
        if !occupied[start] || visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        let mut size = 0;

        while let Some(index) = queue.pop_front() {
            size += 1;
            let (r, c) = (index / cols, index % cols);
            let neighbours = [
                (r > 0).then(|| index - cols),
                (r + 1 < rows).then(|| index + cols),
                (c > 0).then(|| index - 1),
                (c + 1 < cols).then(|| index + 1),
            ];
            for next in neighbours.into_iter().flatten() {
                if occupied[next] && !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        sizes.push(size);
    }
    sizes
}
