//! 3×3 finite-difference slope estimators.
//!
//! Both estimators take a [`Window`] plus [`PixelSpacing`] and return slope in
//! degrees. A missing cell anywhere in the window yields `NaN`; invalid
//! spacing cannot reach this module because `PixelSpacing::new` rejects it.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::grid::PixelSpacing;

/// A 3×3 elevation neighbourhood addressed `[row][col]`, `(1, 1)` the centre.
///
/// ```text
///   NW[0][0]  N[0][1]  NE[0][2]
///   W [1][0]  *[1][1]  E [1][2]
///   SW[2][0]  S[2][1]  SE[2][2]
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window(pub [[f64; 3]; 3]);

impl Window {
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        Self(rows)
    }

    pub fn has_missing(&self) -> bool {
        self.0.iter().flatten().any(|v| v.is_nan())
    }
}

/// Horn (1981) weighted gradient over all eight neighbours.
///
/// `dz/dx = ((NE + 2E + SE) − (NW + 2W + SW)) / (8 · dx)`
/// `dz/dy = ((NW + 2N + NE) − (SW + 2S + SE)) / (8 · dy)`
pub fn horn_gradient(w: &Window, spacing: PixelSpacing) -> (f64, f64) {
    let z = &w.0;
    let dz_dx = ((z[0][2] + 2.0 * z[1][2] + z[2][2]) - (z[0][0] + 2.0 * z[1][0] + z[2][0]))
        / (8.0 * spacing.dx());
    let dz_dy = ((z[0][0] + 2.0 * z[0][1] + z[0][2]) - (z[2][0] + 2.0 * z[2][1] + z[2][2]))
        / (8.0 * spacing.dy());
    (dz_dx, dz_dy)
}

/// Zevenbergen & Thorne (1987) central differences over the four
/// edge-adjacent neighbours.
///
/// `p = (E − W) / (2 · dx)`, `q = (N − S) / (2 · dy)`
pub fn zevenbergen_thorne_gradient(w: &Window, spacing: PixelSpacing) -> (f64, f64) {
    let z = &w.0;
    let p = (z[1][2] - z[1][0]) / (2.0 * spacing.dx());
    let q = (z[0][1] - z[2][1]) / (2.0 * spacing.dy());
    (p, q)
}

#[inline]
fn gradient_to_degrees(gx: f64, gy: f64) -> f64 {
    (gx * gx + gy * gy).sqrt().atan().to_degrees()
}

/// Horn slope in degrees, `NaN` if the window has a missing cell.
pub fn horn_slope(w: &Window, spacing: PixelSpacing) -> f64 {
    if w.has_missing() {
        return f64::NAN;
    }
    let (gx, gy) = horn_gradient(w, spacing);
    gradient_to_degrees(gx, gy)
}

/// Zevenbergen–Thorne slope in degrees, `NaN` if the window has a missing cell.
///
/// The corners do not enter the gradient but still gate missingness.
pub fn zevenbergen_thorne_slope(w: &Window, spacing: PixelSpacing) -> f64 {
    if w.has_missing() {
        return f64::NAN;
    }
    let (p, q) = zevenbergen_thorne_gradient(w, spacing);
    gradient_to_degrees(p, q)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlopeMethod {
    #[default]
    Horn,
    ZevenbergenThorne,
}

impl SlopeMethod {
    pub const ALL: [SlopeMethod; 2] = [SlopeMethod::Horn, SlopeMethod::ZevenbergenThorne];

    pub fn name(&self) -> &'static str {
        match self {
            SlopeMethod::Horn => "horn",
            SlopeMethod::ZevenbergenThorne => "zevenbergen_thorne",
        }
    }

    /// Short tag used in persisted file names.
    pub fn file_tag(&self) -> &'static str {
        match self {
            SlopeMethod::Horn => "horn",
            SlopeMethod::ZevenbergenThorne => "zeven",
        }
    }

    #[inline]
    pub fn estimate(&self, w: &Window, spacing: PixelSpacing) -> f64 {
        match self {
            SlopeMethod::Horn => horn_slope(w, spacing),
            SlopeMethod::ZevenbergenThorne => zevenbergen_thorne_slope(w, spacing),
        }
    }
}

impl fmt::Display for SlopeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SlopeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "horn" => Ok(SlopeMethod::Horn),
            "zevenbergen_thorne" | "zeven" | "zt" => Ok(SlopeMethod::ZevenbergenThorne),
            other => Err(format!("unknown slope method: {other}")),
        }
    }
}
