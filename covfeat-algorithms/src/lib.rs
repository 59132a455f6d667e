//! # covfeat Algorithms
//!
//! Covariance-based local shape descriptors for 3D point clouds.
//!
//! For every point a neighborhood is gathered, its covariance matrix is
//! decomposed, and descriptors such as linearity, planarity, scattering and
//! verticality are derived from the ordered eigenvalues and eigenvectors.
//! Points are processed in parallel over balanced contiguous ranges.

pub mod nearest_neighbor;
pub mod covariance;
pub mod eigen;
pub mod features;
pub mod schema;
pub mod parallel;
pub mod pipeline;

// Re-export commonly used items
pub use nearest_neighbor::*;
pub use covariance::*;
pub use eigen::*;
pub use features::*;
pub use schema::*;
pub use pipeline::*;
