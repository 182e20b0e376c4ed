//! Resample a grid onto a reference shape with order-1 (bilinear)
//! interpolation.
//!
//! Output pixel `o` along an axis samples source coordinate
//! `o · (n_src − 1) / (n_dst − 1)`, so the first and last cells of both grids
//! coincide. Neighbour indices past the source edge are reflected back inside.
//! Both grids are assumed to cover the same ground extent.
use log::debug;

use crate::error::{Result, SlopeError};
use crate::grid::Grid;
use crate::scanner::reflect_index;

/// Per-output-index source neighbours and the fractional weight of the upper one.
#[derive(Debug, Clone, Copy)]
struct AxisSample {
    lo: usize,
    hi: usize,
    t: f64,
}

fn axis_samples(n_src: usize, n_dst: usize) -> Vec<AxisSample> {
    (0..n_dst)
        .map(|o| {
            let pos = if n_dst > 1 {
                (o * (n_src - 1)) as f64 / (n_dst - 1) as f64
            } else {
                0.0
            };
            let lo = (pos.floor() as usize).min(n_src - 1);
            let t = pos - lo as f64;
            let hi = reflect_index(lo as isize + 1, n_src);
            AxisSample { lo, hi, t }
        })
        .collect()
}

/// Resample `src` to `target` = `(height, width)`.
///
/// Equal shapes return an exact copy. Interpolated values are convex
/// combinations of source cells, so they never leave the source value range.
/// A missing source cell with non-zero weight makes the output cell missing.
pub fn align(src: &Grid, target: (usize, usize)) -> Result<Grid> {
    let (dst_h, dst_w) = target;
    if dst_h == 0 || dst_w == 0 {
        return Err(SlopeError::InvalidTarget(target));
    }
    if src.height == 0 || src.width == 0 || src.data.len() != src.height * src.width {
        return Err(SlopeError::InvalidTarget(src.shape()));
    }
    if src.shape() == target {
        return Ok(src.clone());
    }
    debug!(
        "aligning {}x{} grid onto {dst_h}x{dst_w}",
        src.height, src.width
    );

    let rows = axis_samples(src.height, dst_h);
    let cols = axis_samples(src.width, dst_w);

    let mut data = Vec::with_capacity(dst_h * dst_w);
    for ry in &rows {
        let row_terms = [(ry.lo, 1.0 - ry.t), (ry.hi, ry.t)];
        for cx in &cols {
            let col_terms = [(cx.lo, 1.0 - cx.t), (cx.hi, cx.t)];
            let mut acc = 0.0;
            let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
            for &(r, wy) in &row_terms {
                if wy == 0.0 {
                    continue;
                }
                for &(c, wx) in &col_terms {
                    if wx == 0.0 {
                        continue;
                    }
                    let v = src.get(r, c);
                    acc += wy * wx * v;
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
            }
            // Rounding in the weighted sum can step one ulp past the neighbours.
            data.push(if acc.is_nan() { acc } else { acc.clamp(lo, hi) });
        }
    }

    Grid::from_vec(dst_h, dst_w, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn coarse_field() -> Grid {
        Grid::from_fn(10, 10, |r, c| {
            let x = c as f64;
            let y = r as f64;
            20.0 + 15.0 * (0.7 * x).sin() * (0.4 * y).cos() + y
        })
        .unwrap()
    }

    #[test]
    fn identity_when_shapes_match() {
        let mut g = coarse_field();
        g.set(4, 4, f64::NAN);
        let out = align(&g, g.shape()).unwrap();
        assert_eq!(out.shape(), g.shape());
        for (a, b) in out.data.iter().zip(&g.data) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }
    }

    #[test]
    fn upsample_matches_target_and_stays_in_range() {
        let g = coarse_field();
        let out = align(&g, (100, 100)).unwrap();
        assert_eq!(out.shape(), (100, 100));

        let lo = g.min_valid().unwrap();
        let hi = g.max_valid().unwrap();
        for &v in &out.data {
            assert!(lo <= v && v <= hi, "{v} outside [{lo}, {hi}]");
        }
    }

    #[test]
    fn constant_field_stays_constant() {
        for fill in [0.1, 7.3, 89.999] {
            let g = Grid::filled(10, 10, fill).unwrap();
            let out = align(&g, (100, 100)).unwrap();
            assert!(out.data.iter().all(|&v| v == fill), "fill {fill}");
        }
    }

    #[test]
    fn corners_are_preserved() {
        let g = coarse_field();
        let out = align(&g, (37, 53)).unwrap();
        assert_abs_diff_eq!(out.get(0, 0), g.get(0, 0), epsilon = 1e-12);
        assert_abs_diff_eq!(out.get(0, 52), g.get(0, 9), epsilon = 1e-12);
        assert_abs_diff_eq!(out.get(36, 0), g.get(9, 0), epsilon = 1e-12);
        assert_abs_diff_eq!(out.get(36, 52), g.get(9, 9), epsilon = 1e-12);
    }

    #[test]
    fn linear_field_is_reproduced() {
        // Bilinear interpolation is exact on planes.
        let g = Grid::from_fn(5, 5, |r, c| 2.0 * r as f64 + 3.0 * c as f64).unwrap();
        let out = align(&g, (9, 17)).unwrap();
        for r in 0..9 {
            for c in 0..17 {
                let expected = 2.0 * (r as f64 * 4.0 / 8.0) + 3.0 * (c as f64 * 4.0 / 16.0);
                assert_abs_diff_eq!(out.get(r, c), expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn downsample_picks_coincident_cells() {
        let g = Grid::from_fn(9, 9, |r, c| (r * 9 + c) as f64).unwrap();
        let out = align(&g, (3, 3)).unwrap();
        assert_eq!(out.get(1, 1), g.get(4, 4));
        assert_eq!(out.get(2, 2), g.get(8, 8));
    }

    #[test]
    fn missing_source_cell_only_spoils_weighted_outputs() {
        let mut g = Grid::filled(3, 3, 5.0).unwrap();
        g.set(1, 1, f64::NAN);
        let out = align(&g, (5, 5)).unwrap();
        // (0, 0) maps exactly onto source (0, 0); the centre neighbour has zero weight.
        assert_eq!(out.get(0, 0), 5.0);
        assert!(out.get(1, 1).is_nan());
        assert!(out.get(2, 2).is_nan());
        assert_eq!(out.get(4, 0), 5.0);
    }

    #[test]
    fn single_cell_target_samples_origin() {
        let g = coarse_field();
        let out = align(&g, (1, 1)).unwrap();
        assert_eq!(out.get(0, 0), g.get(0, 0));
    }

    #[test]
    fn zero_target_is_rejected() {
        let g = coarse_field();
        assert!(matches!(
            align(&g, (0, 10)),
            Err(SlopeError::InvalidTarget((0, 10)))
        ));
    }
}
