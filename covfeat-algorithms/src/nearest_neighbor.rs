//! Nearest neighbor search implementations

use covfeat_core::{Error, NearestNeighborSearch, Point3d, PointId, Result};
use kiddo::SquaredEuclidean;

/// KD-Tree implementation for nearest neighbor search
///
/// Backed by a kiddo [`ImmutableKdTree`](kiddo::ImmutableKdTree) built once
/// from all coordinates. Unlike the mutable kiddo tree it accepts any number
/// of points sharing a coordinate, so flat, collinear and coincident inputs
/// are fine.
pub struct KdTree {
    tree: Option<kiddo::ImmutableKdTree<f64, 3>>,
    len: usize,
}

impl KdTree {
    pub fn new(points: &[Point3d]) -> Result<Self> {
        if let Some(idx) = first_non_finite(points) {
            return Err(Error::InvalidData(format!(
                "Point {} has non-finite coordinates",
                idx
            )));
        }

        let coords: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
        let tree = if coords.is_empty() {
            None
        } else {
            Some(kiddo::ImmutableKdTree::new_from_slice(&coords))
        };

        Ok(Self {
            tree,
            len: points.len(),
        })
    }
}

/// Identifier of the first point with a NaN or infinite coordinate
pub fn first_non_finite(points: &[Point3d]) -> Option<PointId> {
    points
        .iter()
        .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
}

impl NearestNeighborSearch for KdTree {
    fn len(&self) -> usize {
        self.len
    }

    fn find_k_nearest(&self, query: &Point3d, k: usize) -> Vec<(PointId, f64)> {
        let k = k.min(self.len);
        let Some(tree) = &self.tree else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        tree.nearest_n::<SquaredEuclidean>(&[query.x, query.y, query.z], k)
            .into_iter()
            .map(|neighbor| (neighbor.item as PointId, neighbor.distance.sqrt()))
            .collect()
    }

    fn find_radius_neighbors(&self, query: &Point3d, radius: f64) -> Vec<(PointId, f64)> {
        let Some(tree) = &self.tree else {
            return Vec::new();
        };
        if radius < 0.0 {
            return Vec::new();
        }

        tree.within::<SquaredEuclidean>(&[query.x, query.y, query.z], radius * radius)
            .into_iter()
            .map(|neighbor| (neighbor.item as PointId, neighbor.distance.sqrt()))
            .collect()
    }
}

/// Simple brute force nearest neighbor search for small datasets
///
/// Ties are broken by point identifier. Distances involving non-finite
/// coordinates sort after every finite distance.
pub struct BruteForceSearch {
    points: Vec<Point3d>,
}

impl BruteForceSearch {
    pub fn new(points: &[Point3d]) -> Self {
        Self {
            points: points.to_vec(),
        }
    }

    fn distances(&self, query: &Point3d) -> impl Iterator<Item = (PointId, f64)> + '_ {
        let query = *query;
        self.points.iter().enumerate().map(move |(idx, point)| {
            let distance = (*point - query).norm();
            if distance.is_nan() {
                (idx, f64::INFINITY)
            } else {
                (idx, distance)
            }
        })
    }
}

impl NearestNeighborSearch for BruteForceSearch {
    fn len(&self) -> usize {
        self.points.len()
    }

    fn find_k_nearest(&self, query: &Point3d, k: usize) -> Vec<(PointId, f64)> {
        let mut distances: Vec<(PointId, f64)> = self.distances(query).collect();

        // Stable sort keeps identifier order among equal distances
        distances.sort_by(|a, b| a.1.total_cmp(&b.1));
        distances.truncate(k);
        distances
    }

    fn find_radius_neighbors(&self, query: &Point3d, radius: f64) -> Vec<(PointId, f64)> {
        self.distances(query)
            .filter(|&(_, distance)| distance <= radius)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line_points(n: usize) -> Vec<Point3d> {
        (0..n).map(|i| Point3d::new(i as f64, 0.5 * i as f64, 0.0)).collect()
    }

    #[test]
    fn test_brute_force_k_nearest_sorted() {
        let search = BruteForceSearch::new(&line_points(6));
        let nearest = search.find_k_nearest(&Point3d::new(2.1, 1.05, 0.0), 3);

        assert_eq!(nearest.len(), 3);
        assert_eq!(nearest[0].0, 2);
        assert!(nearest[0].1 <= nearest[1].1 && nearest[1].1 <= nearest[2].1);
    }

    #[test]
    fn test_k_larger_than_point_count() {
        let points = line_points(4);
        let tree = KdTree::new(&points).unwrap();
        let brute = BruteForceSearch::new(&points);

        assert_eq!(tree.find_k_nearest(&points[0], 10).len(), 4);
        assert_eq!(brute.find_k_nearest(&points[0], 10).len(), 4);
    }

    #[test]
    fn test_strided_neighbors() {
        let search = BruteForceSearch::new(&line_points(10));

        // Ten nearest to point 0 are 0..10 in order; stride 2 keeps 0, 2, 4
        let ids = search.find_k_nearest_strided(&Point3d::new(0.0, 0.0, 0.0), 3, 2);
        assert_eq!(ids, vec![0, 2, 4]);

        // Only 10 points available, so stride 4 yields 0, 4, 8
        let ids = search.find_k_nearest_strided(&Point3d::new(0.0, 0.0, 0.0), 5, 4);
        assert_eq!(ids, vec![0, 4, 8]);
    }

    #[test]
    fn test_radius_neighbors_include_query_point() {
        let points = line_points(5);
        let search = BruteForceSearch::new(&points);
        let neighbors = search.find_radius_neighbors(&points[2], 1.2);

        let mut ids: Vec<PointId> = neighbors.iter().map(|(idx, _)| *idx).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
        for (_, distance) in &neighbors {
            assert!(*distance <= 1.2);
        }
    }

    #[test]
    fn test_kdtree_matches_brute_force() {
        let points: Vec<Point3d> = (0..20)
            .map(|i| {
                let t = i as f64;
                Point3d::new((t * 0.37).sin(), (t * 0.71).cos(), t * 0.05)
            })
            .collect();
        let tree = KdTree::new(&points).unwrap();
        let brute = BruteForceSearch::new(&points);

        for query in &points {
            let from_tree = tree.find_k_nearest(query, 5);
            let from_brute = brute.find_k_nearest(query, 5);
            assert_eq!(from_tree.len(), from_brute.len());
            for (a, b) in from_tree.iter().zip(from_brute.iter()) {
                assert_relative_eq!(a.1, b.1, epsilon = 1e-12);
            }

            let mut within_tree: Vec<PointId> = tree
                .find_radius_neighbors(query, 0.6)
                .into_iter()
                .map(|(idx, _)| idx)
                .collect();
            let mut within_brute: Vec<PointId> = brute
                .find_radius_neighbors(query, 0.6)
                .into_iter()
                .map(|(idx, _)| idx)
                .collect();
            within_tree.sort_unstable();
            within_brute.sort_unstable();
            assert_eq!(within_tree, within_brute);
        }
    }

    #[test]
    fn test_kdtree_handles_shared_coordinates() {
        // Far more points than a bucket holds, all with x = y = 0
        let line: Vec<Point3d> = (0..100).map(|i| Point3d::new(0.0, 0.0, i as f64)).collect();
        let tree = KdTree::new(&line).unwrap();
        let nearest = tree.find_k_nearest(&line[50], 3);
        let mut ids: Vec<PointId> = nearest.iter().map(|(idx, _)| *idx).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![49, 50, 51]);

        let coincident = vec![Point3d::new(1.0, 1.0, 1.0); 50];
        let tree = KdTree::new(&coincident).unwrap();
        assert_eq!(tree.find_k_nearest(&coincident[0], 10).len(), 10);
        assert_eq!(tree.find_radius_neighbors(&coincident[0], 0.5).len(), 50);
    }

    #[test]
    fn test_empty_kdtree() {
        let tree = KdTree::new(&[]).unwrap();
        assert!(tree.is_empty());
        assert!(tree.find_k_nearest(&Point3d::origin(), 3).is_empty());
        assert!(tree.find_radius_neighbors(&Point3d::origin(), 1.0).is_empty());
    }

    #[test]
    fn test_kdtree_rejects_non_finite() {
        let points = vec![Point3d::new(0.0, 0.0, 0.0), Point3d::new(f64::NAN, 0.0, 0.0)];
        assert!(matches!(KdTree::new(&points), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_nan_distances_sort_last() {
        let points = vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(f64::NAN, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
        ];
        let search = BruteForceSearch::new(&points);
        let ids: Vec<PointId> = search
            .find_k_nearest(&points[0], 3)
            .into_iter()
            .map(|(idx, _)| idx)
            .collect();
        assert_eq!(ids, vec![0, 2, 1]);
    }
}
