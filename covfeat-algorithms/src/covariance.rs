//! Local covariance estimation

use covfeat_core::{Point3d, PointId, Vector3d};
use nalgebra::Matrix3;

/// Centroid of the points selected by `ids`
///
/// Returns the origin for an empty selection.
pub fn compute_centroid(points: &[Point3d], ids: &[PointId]) -> Point3d {
    if ids.is_empty() {
        return Point3d::origin();
    }

    let sum: Vector3d = ids.iter().map(|&idx| points[idx].coords).sum();
    Point3d::from(sum / ids.len() as f64)
}

/// Sample covariance of the points selected by `ids` about their centroid
///
/// The scatter matrix is divided by `n - 1`. Selections of fewer than two
/// points have no spread and yield the zero matrix.
pub fn compute_covariance(points: &[Point3d], ids: &[PointId]) -> Matrix3<f64> {
    if ids.len() < 2 {
        return Matrix3::zeros();
    }

    let centroid = compute_centroid(points, ids);
    let mut covariance = Matrix3::<f64>::zeros();
    for &idx in ids {
        let diff = points[idx] - centroid;
        covariance += diff * diff.transpose();
    }

    covariance / (ids.len() - 1) as f64
}
