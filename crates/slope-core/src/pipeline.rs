//! Cross-resolution evaluation: estimate, align, score, sample.
//!
//! A fine-resolution reference DEM yields the reference slope field (one
//! chosen estimator). A coarser test DEM covering the same extent yields
//! Horn and Zevenbergen–Thorne fields, which are aligned onto the reference
//! shape before metrics and quantile samples are taken.
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::align::align;
use crate::error::Result;
use crate::estimator::SlopeMethod;
use crate::grid::{ElevationGrid, SlopeGrid};
use crate::metrics::{ensure_same_shape, evaluate, MetricsReport};
use crate::quantile::{QuantileSampler, Sample, DEFAULT_QUANTILES, DEFAULT_THRESHOLD};
use crate::scanner::{scan, EdgePolicy};

/// Parameters threaded through every evaluation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub edge_policy: EdgePolicy,
    /// Estimator applied to the fine-resolution reference DEM.
    pub reference_method: SlopeMethod,
    /// Percentiles (0-100) of the reference slope to sample.
    pub quantiles: Vec<f64>,
    /// Near-flat cutoff (degrees) for quantile sampling.
    pub threshold: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            edge_policy: EdgePolicy::Reflect,
            reference_method: SlopeMethod::Horn,
            quantiles: DEFAULT_QUANTILES.to_vec(),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl EvaluationConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.sampler()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Validated quantile sampler for this config.
    pub fn sampler(&self) -> Result<QuantileSampler> {
        QuantileSampler::new(self.quantiles.clone(), self.threshold)
    }
}

/// Horn and Zevenbergen–Thorne slope of the same DEM.
#[derive(Debug, Clone)]
pub struct SlopePair {
    pub horn: SlopeGrid,
    pub zeven: SlopeGrid,
}

impl SlopePair {
    pub fn get(&self, method: SlopeMethod) -> &SlopeGrid {
        match method {
            SlopeMethod::Horn => &self.horn,
            SlopeMethod::ZevenbergenThorne => &self.zeven,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.horn.shape()
    }
}

/// Both estimators over one DEM.
pub fn estimate_slopes(dem: &ElevationGrid, policy: EdgePolicy) -> SlopePair {
    SlopePair {
        horn: scan(dem, SlopeMethod::Horn, policy),
        zeven: scan(dem, SlopeMethod::ZevenbergenThorne, policy),
    }
}

/// Result of scoring a test resolution against the reference.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub reference_shape: (usize, usize),
    pub test_shape: (usize, usize),
    pub metrics: MetricsReport,
    pub samples: Vec<Sample>,
}

/// Align both test fields onto the reference shape, then score and sample.
pub fn evaluate_resolution(
    reference: &SlopeGrid,
    test: &SlopePair,
    config: &EvaluationConfig,
) -> Result<Evaluation> {
    let sampler = config.sampler()?;
    ensure_same_shape(&test.horn, &test.zeven)?;

    let target = reference.shape();
    info!(
        "aligning {}x{} test slopes onto {}x{} reference",
        test.shape().0,
        test.shape().1,
        target.0,
        target.1
    );
    let horn = align(&test.horn, target)?;
    let zeven = align(&test.zeven, target)?;

    let metrics = evaluate(
        reference,
        &[
            (SlopeMethod::Horn.name(), &horn),
            (SlopeMethod::ZevenbergenThorne.name(), &zeven),
        ],
    )?;
    for m in &metrics.methods {
        info!(
            "{}: rmse={:.4} mae={:.4} r={} over {} cells",
            m.method,
            m.rmse,
            m.mae,
            m.correlation
                .map(|r| format!("{r:.4}"))
                .unwrap_or_else(|| "undefined".to_string()),
            m.n_valid
        );
    }

    let samples = sampler.sample(&reference.data, &horn.data, &zeven.data)?;

    Ok(Evaluation {
        reference_shape: target,
        test_shape: test.shape(),
        metrics,
        samples,
    })
}

/// Everything an end-to-end run produces.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Reference slope over the fine DEM.
    pub reference: SlopeGrid,
    /// Both estimators over the test DEM, at the test resolution.
    pub test: SlopePair,
    pub evaluation: Evaluation,
}

/// End-to-end run over a fine reference DEM and a coarser test DEM.
pub fn run(
    reference_dem: &ElevationGrid,
    test_dem: &ElevationGrid,
    config: &EvaluationConfig,
) -> Result<RunOutput> {
    config.sampler()?;
    info!(
        "reference slope ({}) over {}x{} DEM",
        config.reference_method,
        reference_dem.shape().0,
        reference_dem.shape().1
    );
    let reference = scan(reference_dem, config.reference_method, config.edge_policy);
    info!(
        "test slopes over {}x{} DEM",
        test_dem.shape().0,
        test_dem.shape().1
    );
    let test = estimate_slopes(test_dem, config.edge_policy);
    let evaluation = evaluate_resolution(&reference, &test, config)?;
    Ok(RunOutput {
        reference,
        test,
        evaluation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SlopeError;
    use crate::grid::{Grid, PixelSpacing};

    /// Smooth hill sampled at `n`×`n` over a fixed 1000 m square.
    fn hill(n: usize) -> ElevationGrid {
        let cell = 1000.0 / (n - 1) as f64;
        let grid = Grid::from_fn(n, n, |r, c| {
            let x = c as f64 * cell - 500.0;
            let y = r as f64 * cell - 500.0;
            300.0 * (-(x * x + y * y) / 60_000.0).exp() + 0.05 * x
        })
        .unwrap();
        ElevationGrid::new(grid, PixelSpacing::new(cell, cell).unwrap())
    }

    #[test]
    fn same_dem_scores_perfectly_for_reference_method() {
        let dem = hill(40);
        let eval = run(&dem, &dem, &EvaluationConfig::default()).unwrap().evaluation;
        let horn = eval.metrics.get("horn").unwrap();
        assert_eq!(horn.rmse, 0.0);
        assert_eq!(horn.mae, 0.0);
        assert_eq!(horn.correlation, Some(1.0));
        for s in &eval.samples {
            assert_eq!(s.horn_error, 0.0);
        }
    }

    #[test]
    fn coarse_dem_is_aligned_and_scored() {
        let fine = hill(101);
        let coarse = hill(11);
        let out = run(&fine, &coarse, &EvaluationConfig::default()).unwrap();
        let eval = &out.evaluation;
        assert_eq!(out.reference.shape(), (101, 101));
        assert_eq!(out.test.shape(), (11, 11));
        assert_eq!(eval.reference_shape, (101, 101));
        assert_eq!(eval.test_shape, (11, 11));
        assert_eq!(eval.metrics.methods.len(), 2);
        for m in &eval.metrics.methods {
            assert_eq!(m.n_valid, 101 * 101);
            assert!(m.rmse > 0.0 && m.rmse.is_finite());
            assert!(m.mae <= m.rmse);
            assert!(m.correlation.unwrap() > 0.5, "{}: {:?}", m.method, m.correlation);
        }
        assert_eq!(eval.samples.len(), DEFAULT_QUANTILES.len());
        let refs: Vec<f64> = eval.samples.iter().map(|s| s.reference).collect();
        assert!(refs.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn bad_config_fails_before_work() {
        let dem = hill(10);
        let config = EvaluationConfig {
            quantiles: vec![-5.0],
            ..EvaluationConfig::default()
        };
        assert!(matches!(
            run(&dem, &dem, &config),
            Err(SlopeError::InvalidQuantile(_))
        ));
    }

    #[test]
    fn config_json_fills_defaults() {
        let config = EvaluationConfig::from_json(
            r#"{"edge_policy": "missing", "reference_method": "zevenbergen_thorne"}"#,
        )
        .unwrap();
        assert_eq!(config.edge_policy, EdgePolicy::Missing);
        assert_eq!(config.reference_method, SlopeMethod::ZevenbergenThorne);
        assert_eq!(config.quantiles, DEFAULT_QUANTILES.to_vec());

        assert!(matches!(
            EvaluationConfig::from_json(r#"{"threshold": -1.0}"#),
            Err(SlopeError::InvalidThreshold(_))
        ));
        assert!(matches!(
            EvaluationConfig::from_json("{not json"),
            Err(SlopeError::Config(_))
        ));
    }

    #[test]
    fn slope_pair_lookup_by_method() {
        let pair = estimate_slopes(&hill(8), EdgePolicy::Missing);
        assert!(std::ptr::eq(pair.get(SlopeMethod::Horn), &pair.horn));
        assert!(std::ptr::eq(pair.get(SlopeMethod::ZevenbergenThorne), &pair.zeven));
        assert_eq!(pair.horn.valid_count(), 36);
    }
}
