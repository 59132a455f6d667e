//! Core data structures and traits for covfeat
//!
//! This crate provides the fundamental types shared by the covariance feature
//! pipeline: point coordinates, the point set with its named per-point fields,
//! the nearest neighbor search trait, and the error type.

pub mod point;
pub mod point_set;
pub mod traits;
pub mod error;

pub use point::*;
pub use point_set::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3};
