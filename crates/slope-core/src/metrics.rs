//! Accuracy statistics between a reference slope grid and estimates.
//!
//! Every statistic is taken over the cells where the reference is valid,
//! intersected with the cells where the estimate under test is valid.
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SlopeError};
use crate::grid::Grid;
use crate::quantile::percentile;

/// RMSE, MAE and Pearson r of one estimate against the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodMetrics {
    pub method: String,
    /// Cells where both reference and estimate are valid.
    pub n_valid: usize,
    pub rmse: f64,
    pub mae: f64,
    /// `None` when fewer than two valid cells remain or one side is constant.
    pub correlation: Option<f64>,
}

/// Metrics for several estimates, in the order they were requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub methods: Vec<MethodMetrics>,
}

impl MetricsReport {
    pub fn get(&self, method: &str) -> Option<&MethodMetrics> {
        self.methods.iter().find(|m| m.method == method)
    }
}

pub(crate) fn ensure_same_shape(reference: &Grid, other: &Grid) -> Result<()> {
    if reference.shape() != other.shape() || reference.len() != other.len() {
        return Err(SlopeError::ShapeMismatch {
            expected: reference.shape(),
            actual: other.shape(),
        });
    }
    Ok(())
}

/// Pairs `(a, b)` where both values are valid.
fn valid_pairs(a: &Grid, b: &Grid) -> (Vec<f64>, Vec<f64>) {
    a.data
        .iter()
        .zip(&b.data)
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .map(|(&x, &y)| (x, y))
        .unzip()
}

/// Pearson correlation coefficient.
///
/// Returns `None` for fewer than two samples or zero variance on either side.
pub fn pearson_r(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / nf;
    let mean_y = y[..n].iter().sum::<f64>() / nf;

    let mut cov = 0f64;
    let mut var_x = 0f64;
    let mut var_y = 0f64;
    for (&a, &b) in x[..n].iter().zip(&y[..n]) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some((cov / (var_x * var_y).sqrt()).clamp(-1.0, 1.0))
}

/// RMSE, MAE and correlation of `estimate` against `reference`.
///
/// Both grids must already share a shape (see [`crate::align::align`]).
pub fn compute_metrics(method: &str, reference: &Grid, estimate: &Grid) -> Result<MethodMetrics> {
    ensure_same_shape(reference, estimate)?;

    let (refs, ests) = valid_pairs(reference, estimate);
    let n_valid = refs.len();
    if n_valid == 0 {
        return Err(SlopeError::NoValidCells(method.to_string()));
    }

    let n = n_valid as f64;
    let mut sq = 0f64;
    let mut abs = 0f64;
    for (&r, &e) in refs.iter().zip(&ests) {
        let d = e - r;
        sq += d * d;
        abs += d.abs();
    }

    let correlation = pearson_r(&refs, &ests);
    if correlation.is_none() {
        warn!("{method}: correlation undefined over {n_valid} valid cells");
    }

    Ok(MethodMetrics {
        method: method.to_string(),
        n_valid,
        rmse: (sq / n).sqrt(),
        mae: abs / n,
        correlation,
    })
}

/// Metrics for each named estimate against one reference.
pub fn evaluate(reference: &Grid, estimates: &[(&str, &Grid)]) -> Result<MetricsReport> {
    let methods = estimates
        .iter()
        .map(|(name, grid)| compute_metrics(name, reference, grid))
        .collect::<Result<Vec<_>>>()?;
    Ok(MetricsReport { methods })
}

/// Descriptive statistics of the valid values of a field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n − 1). `None` for a single value.
    pub std: Option<f64>,
    pub min: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub max: f64,
}

/// Count, mean, std, min, quartiles and max, skipping `NaN`.
/// `None` when no valid value exists.
pub fn describe(values: &[f64]) -> Option<Summary> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let n = count as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let std = (count > 1).then(|| {
        let ss = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
        (ss / (n - 1.0)).sqrt()
    });

    Some(Summary {
        count,
        mean,
        std,
        min: sorted[0],
        p25: percentile(&sorted, 25.0),
        p50: percentile(&sorted, 50.0),
        p75: percentile(&sorted, 75.0),
        max: sorted[count - 1],
    })
}

/// One cell where both estimators produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgreementRow {
    pub horn: f64,
    pub zeven: f64,
    /// `|horn − zeven|`
    pub difference: f64,
}

/// Per-cell Horn / Zevenbergen–Thorne pairs, skipping cells where either is missing.
pub fn agreement_rows(horn: &Grid, zeven: &Grid) -> Result<Vec<AgreementRow>> {
    ensure_same_shape(horn, zeven)?;
    Ok(horn
        .data
        .iter()
        .zip(&zeven.data)
        .filter(|(h, z)| !h.is_nan() && !z.is_nan())
        .map(|(&h, &z)| AgreementRow {
            horn: h,
            zeven: z,
            difference: (h - z).abs(),
        })
        .collect())
}

/// How closely the two estimators agree on the same grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodComparison {
    pub horn: Summary,
    pub zeven: Summary,
    pub difference: Summary,
    pub correlation: Option<f64>,
}

pub fn compare_methods(horn: &Grid, zeven: &Grid) -> Result<MethodComparison> {
    let rows = agreement_rows(horn, zeven)?;
    let no_cells = || SlopeError::NoValidCells("horn/zevenbergen_thorne comparison".to_string());

    let h: Vec<f64> = rows.iter().map(|r| r.horn).collect();
    let z: Vec<f64> = rows.iter().map(|r| r.zeven).collect();
    let d: Vec<f64> = rows.iter().map(|r| r.difference).collect();

    Ok(MethodComparison {
        horn: describe(&h).ok_or_else(no_cells)?,
        zeven: describe(&z).ok_or_else(no_cells)?,
        difference: describe(&d).ok_or_else(no_cells)?,
        correlation: pearson_r(&h, &z),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn field() -> Grid {
        Grid::from_fn(8, 8, |r, c| (r as f64 * 0.9 + c as f64 * 1.7).sin() * 20.0 + 30.0).unwrap()
    }

    #[test]
    fn self_comparison_is_perfect() {
        let g = field();
        let m = compute_metrics("horn", &g, &g).unwrap();
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.correlation, Some(1.0));
        assert_eq!(m.n_valid, 64);
    }

    #[test]
    fn constant_offset_gives_known_errors() {
        let g = field();
        let mut shifted = g.clone();
        shifted.data.iter_mut().for_each(|v| *v += 2.0);
        let m = compute_metrics("zt", &g, &shifted).unwrap();
        assert_abs_diff_eq!(m.rmse, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.mae, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(m.correlation.unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rmse_and_mae_on_small_case() {
        let reference = Grid::from_vec(1, 4, vec![0.0, 0.0, 0.0, 0.0]).unwrap();
        let estimate = Grid::from_vec(1, 4, vec![1.0, -1.0, 3.0, -3.0]).unwrap();
        let m = compute_metrics("x", &reference, &estimate).unwrap();
        assert_abs_diff_eq!(m.mae, 2.0);
        assert_abs_diff_eq!(m.rmse, 5.0f64.sqrt());
        // Constant reference: correlation undefined.
        assert_eq!(m.correlation, None);
    }

    #[test]
    fn missing_cells_are_excluded_per_method() {
        let reference = Grid::from_vec(1, 5, vec![1.0, f64::NAN, 3.0, 4.0, 5.0]).unwrap();
        let a = Grid::from_vec(1, 5, vec![1.0, 2.0, 3.0, f64::NAN, 5.0]).unwrap();
        let b = Grid::from_vec(1, 5, vec![2.0, 9.0, 4.0, 5.0, 6.0]).unwrap();
        let report = evaluate(&reference, &[("a", &a), ("b", &b)]).unwrap();

        let ma = report.get("a").unwrap();
        assert_eq!(ma.n_valid, 3);
        assert_eq!(ma.rmse, 0.0);

        let mb = report.get("b").unwrap();
        assert_eq!(mb.n_valid, 4);
        assert_abs_diff_eq!(mb.mae, 1.0);
        assert_eq!(report.methods[0].method, "a");
    }

    #[test]
    fn single_valid_cell_has_undefined_correlation() {
        let reference = Grid::from_vec(1, 3, vec![f64::NAN, 7.0, f64::NAN]).unwrap();
        let estimate = Grid::from_vec(1, 3, vec![1.0, 8.0, 2.0]).unwrap();
        let m = compute_metrics("x", &reference, &estimate).unwrap();
        assert_eq!(m.n_valid, 1);
        assert_eq!(m.correlation, None);
        assert_eq!(m.mae, 1.0);
    }

    #[test]
    fn no_valid_cells_is_an_error() {
        let reference = Grid::filled(2, 2, f64::NAN).unwrap();
        let estimate = Grid::filled(2, 2, 1.0).unwrap();
        assert!(matches!(
            compute_metrics("horn", &reference, &estimate),
            Err(SlopeError::NoValidCells(_))
        ));
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let reference = Grid::filled(4, 4, 1.0).unwrap();
        let estimate = Grid::filled(2, 8, 1.0).unwrap();
        assert!(matches!(
            compute_metrics("horn", &reference, &estimate),
            Err(SlopeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn pearson_anticorrelated() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [8.0, 6.0, 4.0, 2.0];
        assert_abs_diff_eq!(pearson_r(&x, &y).unwrap(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn describe_matches_quartiles() {
        let s = describe(&[4.0, f64::NAN, 1.0, 3.0, 2.0, 5.0]).unwrap();
        assert_eq!(s.count, 5);
        assert_eq!(s.mean, 3.0);
        assert_abs_diff_eq!(s.std.unwrap(), 2.5f64.sqrt(), epsilon = 1e-12);
        assert_eq!((s.min, s.p25, s.p50, s.p75, s.max), (1.0, 2.0, 3.0, 4.0, 5.0));

        assert_eq!(describe(&[7.0]).unwrap().std, None);
        assert!(describe(&[f64::NAN]).is_none());
    }

    #[test]
    fn comparison_skips_rows_with_any_missing() {
        let horn = Grid::from_vec(1, 4, vec![10.0, f64::NAN, 30.0, 40.0]).unwrap();
        let zeven = Grid::from_vec(1, 4, vec![12.0, 20.0, f64::NAN, 38.0]).unwrap();
        let rows = agreement_rows(&horn, &zeven).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].difference, 2.0);

        let cmp = compare_methods(&horn, &zeven).unwrap();
        assert_eq!(cmp.horn.count, 2);
        assert_eq!(cmp.difference.mean, 2.0);
        assert_abs_diff_eq!(cmp.correlation.unwrap(), 1.0, epsilon = 1e-12);
    }
}
