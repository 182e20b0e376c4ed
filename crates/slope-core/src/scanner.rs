//! Window scan: slope at every cell of an elevation grid.
//!
//! Interior cells use their centred 3×3 neighbourhood. Border cells follow an
//! [`EdgePolicy`]; `Reflect` mirrors indices across the edge including the
//! edge cell itself (`-1 → 0`, `n → n − 1`), which is the padding a
//! size-3 image filter applies by default.
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::estimator::{SlopeMethod, Window};
use crate::grid::{ElevationGrid, Grid, SlopeGrid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolicy {
    /// Synthesize out-of-range neighbours by mirroring across the edge.
    #[default]
    Reflect,
    /// Cells without a full 3×3 neighbourhood are missing.
    Missing,
}

impl std::str::FromStr for EdgePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reflect" => Ok(EdgePolicy::Reflect),
            "missing" | "nan" => Ok(EdgePolicy::Missing),
            other => Err(format!("unknown edge policy: {other}")),
        }
    }
}

/// Mirror an offset index into `0..n`. Valid for offsets of at most one cell.
#[inline]
pub(crate) fn reflect_index(i: isize, n: usize) -> usize {
    let n = n as isize;
    let j = if i < 0 {
        -i - 1
    } else if i >= n {
        2 * n - i - 1
    } else {
        i
    };
    j.clamp(0, n - 1) as usize
}

/// Extract the 3×3 window centred on `(r, c)`.
///
/// Returns `None` when the window leaves the grid and the policy is
/// `Missing`.
pub fn window_at(grid: &Grid, r: usize, c: usize, policy: EdgePolicy) -> Option<Window> {
    let interior = r >= 1 && c >= 1 && r + 1 < grid.height && c + 1 < grid.width;
    if !interior && policy == EdgePolicy::Missing {
        return None;
    }

    let mut z = [[0f64; 3]; 3];
    for (dr, row) in z.iter_mut().enumerate() {
        let rr = reflect_index(r as isize + dr as isize - 1, grid.height);
        for (dc, cell) in row.iter_mut().enumerate() {
            let cc = reflect_index(c as isize + dc as isize - 1, grid.width);
            *cell = grid.get(rr, cc);
        }
    }
    Some(Window(z))
}

fn scan_row(
    dem: &ElevationGrid,
    method: SlopeMethod,
    policy: EdgePolicy,
    r: usize,
    out: &mut [f64],
) {
    let grid = dem.grid();
    let spacing = dem.spacing();
    for (c, cell) in out.iter_mut().enumerate() {
        *cell = match window_at(grid, r, c, policy) {
            Some(w) => method.estimate(&w, spacing),
            None => f64::NAN,
        };
    }
}

/// Compute a slope grid (degrees) with the given estimator and edge policy.
///
/// Output has the same shape as the input; missing elevations propagate as
/// missing slope. The input grid is never modified.
pub fn scan(dem: &ElevationGrid, method: SlopeMethod, policy: EdgePolicy) -> SlopeGrid {
    let (height, width) = dem.shape();
    debug!("scanning {height}x{width} grid with {method} ({policy:?} edges)");

    let mut data = vec![f64::NAN; height * width];
    if data.is_empty() {
        return Grid {
            data,
            width,
            height,
        };
    }

    #[cfg(feature = "threading")]
    {
        use rayon::prelude::*;
        data.par_chunks_mut(width)
            .enumerate()
            .for_each(|(r, row)| scan_row(dem, method, policy, r, row));
    }
    #[cfg(not(feature = "threading"))]
    {
        for (r, row) in data.chunks_mut(width).enumerate() {
            scan_row(dem, method, policy, r, row);
        }
    }

    let out = Grid {
        data,
        width,
        height,
    };
    if all_windows_lost(dem.grid(), &out) {
        warn!(
            "{method} left every cell of the {height}x{width} grid missing ({} valid elevations)",
            dem.grid().valid_count()
        );
    }
    out
}

/// True when the input has valid elevations but no window produced a slope.
fn all_windows_lost(input: &Grid, out: &SlopeGrid) -> bool {
    input.valid_count() > 0 && out.valid_count() == 0
}
