use serde::{Deserialize, Serialize};

use crate::error::{Result, SlopeError};

/// A 2D grid of f64 values, row-major. `NaN` marks a missing (nodata) cell.
/// Row 0 is the first raster row (north for a north-up DEM).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    /// Row-major cell values.
    pub data: Vec<f64>,
    pub width: usize,
    pub height: usize,
}

/// Slope grid in degrees, same shape as its source elevation grid.
pub type SlopeGrid = Grid;

impl Grid {
    /// Create a grid filled with the given value.
    pub fn filled(height: usize, width: usize, fill: f64) -> Result<Self> {
        Self::from_vec(height, width, vec![fill; height * width])
    }

    /// Wrap row-major data, rejecting empty shapes and length mismatches.
    pub fn from_vec(height: usize, width: usize, data: Vec<f64>) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(SlopeError::EmptyGrid { height, width });
        }
        if data.len() != height * width {
            return Err(SlopeError::DataLength {
                len: data.len(),
                height,
                width,
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Build a grid from a cell function `f(row, col)`.
    pub fn from_fn(height: usize, width: usize, f: impl Fn(usize, usize) -> f64) -> Result<Self> {
        let mut data = Vec::with_capacity(height * width);
        for r in 0..height {
            for c in 0..width {
                data.push(f(r, c));
            }
        }
        Self::from_vec(height, width, data)
    }

    /// `(height, width)`
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        self.data[row * self.width + col] = val;
    }

    /// Row and column of a flattened index.
    #[inline]
    pub fn row_col(&self, index: usize) -> (usize, usize) {
        (index / self.width, index % self.width)
    }

    /// Number of non-missing cells.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_nan()).count()
    }

    /// Smallest non-missing value, `None` if every cell is missing.
    pub fn min_valid(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .reduce(f64::min)
    }

    /// Largest non-missing value, `None` if every cell is missing.
    pub fn max_valid(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .reduce(f64::max)
    }
}

/// Ground distance between adjacent cell centres along x (`dx`) and y (`dy`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSpacing {
    dx: f64,
    dy: f64,
}

impl PixelSpacing {
    /// Both components must be finite and strictly positive.
    pub fn new(dx: f64, dy: f64) -> Result<Self> {
        if !(dx.is_finite() && dy.is_finite() && dx > 0.0 && dy > 0.0) {
            return Err(SlopeError::NonPositiveSpacing { dx, dy });
        }
        Ok(Self { dx, dy })
    }

    #[inline]
    pub fn dx(&self) -> f64 {
        self.dx
    }

    #[inline]
    pub fn dy(&self) -> f64 {
        self.dy
    }
}

/// An elevation model with its pixel spacing. Immutable once built.
#[derive(Debug, Clone)]
pub struct ElevationGrid {
    grid: Grid,
    spacing: PixelSpacing,
}

impl ElevationGrid {
    pub fn new(grid: Grid, spacing: PixelSpacing) -> Self {
        Self { grid, spacing }
    }

    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[inline]
    pub fn spacing(&self) -> PixelSpacing {
        self.spacing
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.grid.shape()
    }
}
