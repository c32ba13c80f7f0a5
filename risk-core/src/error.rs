//! Error types for risk mathematics

use thiserror::Error;

/// Risk core error
#[derive(Debug, Error)]
pub enum Error {
    /// Smoothing factor outside (0, 1]
    #[error("invalid EMA smoothing factor: {0}")]
    InvalidSmoothingFactor(f64),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
