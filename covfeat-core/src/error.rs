//! Error types for covfeat

use crate::point_set::PointId;
use thiserror::Error;

/// Main error type for covfeat operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Eigenvalues are all 0 at point {point_id}, can't compute local features")]
    DegenerateGeometry { point_id: PointId },

    #[error("Cannot perform eigen decomposition at point {point_id}")]
    DecompositionFailure { point_id: PointId },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

impl Error {
    /// Whether the error was raised while processing a single point
    pub fn point_id(&self) -> Option<PointId> {
        match self {
            Error::DegenerateGeometry { point_id } | Error::DecompositionFailure { point_id } => {
                Some(*point_id)
            }
            _ => None,
        }
    }
}

/// Result type alias for covfeat operations
pub type Result<T> = std::result::Result<T, Error>;
