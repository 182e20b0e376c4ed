//! Terrain slope from gridded elevation with Horn and Zevenbergen–Thorne
//! estimators, and accuracy evaluation of coarse grids against a
//! fine-resolution reference.

pub mod align;
pub mod error;
pub mod estimator;
pub mod grid;
pub mod metrics;
pub mod npy;
pub mod pipeline;
pub mod quantile;
pub mod report;
pub mod scanner;

pub use align::align;
pub use error::{Result, SlopeError};
pub use estimator::{horn_slope, zevenbergen_thorne_slope, SlopeMethod, Window};
pub use grid::{ElevationGrid, Grid, PixelSpacing, SlopeGrid};
pub use metrics::{
    compare_methods, compute_metrics, describe, evaluate, MethodMetrics, MetricsReport,
};
pub use pipeline::{
    estimate_slopes, evaluate_resolution, run, Evaluation, EvaluationConfig, RunOutput, SlopePair,
};
pub use quantile::{QuantileSampler, Sample};
pub use scanner::{scan, EdgePolicy};
