//! Core traits for covfeat

use crate::point::Point3d;
use crate::point_set::PointId;

/// Trait for nearest neighbor search functionality
///
/// Implementations are built once per point set and queried concurrently,
/// so they must be read-only during queries.
pub trait NearestNeighborSearch {
    /// Number of points held by the index
    fn len(&self) -> usize;

    /// Check if the index holds no points
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the k nearest neighbors to a query point, closest first
    fn find_k_nearest(&self, query: &Point3d, k: usize) -> Vec<(PointId, f64)>;

    /// Find all neighbors within a given radius
    fn find_radius_neighbors(&self, query: &Point3d, radius: f64) -> Vec<(PointId, f64)>;

    /// Find k neighbors keeping every `stride`-th of the `k * stride` nearest
    ///
    /// A stride of 1 is a plain k-nearest query. Fewer than `k` identifiers are
    /// returned when the index holds fewer than `k * stride` points.
    fn find_k_nearest_strided(&self, query: &Point3d, k: usize, stride: usize) -> Vec<PointId> {
        let stride = stride.max(1);
        self.find_k_nearest(query, k.saturating_mul(stride))
            .into_iter()
            .step_by(stride)
            .take(k)
            .map(|(idx, _)| idx)
            .collect()
    }
}
