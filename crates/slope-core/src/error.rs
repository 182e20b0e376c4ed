use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlopeError {
    #[error("pixel spacing must be finite and positive, got dx={dx}, dy={dy}")]
    NonPositiveSpacing { dx: f64, dy: f64 },

    #[error("grid dimensions must be non-zero, got {height}x{width}")]
    EmptyGrid { height: usize, width: usize },

    #[error("grid data has {len} values, expected {height}x{width}")]
    DataLength {
        len: usize,
        height: usize,
        width: usize,
    },

    #[error("shape mismatch: reference is {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("cannot align onto target shape {0:?}")]
    InvalidTarget((usize, usize)),

    #[error("no valid cells to evaluate for {0}")]
    NoValidCells(String),

    #[error("percentile {0} is outside [0, 100]")]
    InvalidQuantile(f64),

    #[error("near-zero threshold must be finite and non-negative, got {0}")]
    InvalidThreshold(f64),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("malformed npy file: {0}")]
    Npy(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SlopeError>;
