//! Symmetric eigendecomposition of local covariance matrices

use covfeat_core::Vector3d;
use nalgebra::{Matrix3, SymmetricEigen};

/// Iteration cap for the symmetric QR solver
const MAX_ITERATIONS: usize = 1000;

/// Eigenvalues and eigenvectors of a covariance matrix, largest first
///
/// `eigenvalues[0] >= eigenvalues[1] >= eigenvalues[2] >= 0`; negative values
/// from round-off are clamped to zero. `eigenvectors[i]` is the unit vector
/// paired with `eigenvalues[i]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EigenDecomposition {
    pub eigenvalues: [f64; 3],
    pub eigenvectors: [Vector3d; 3],
}

impl EigenDecomposition {
    pub fn sum(&self) -> f64 {
        self.eigenvalues.iter().sum()
    }

    /// Dominant eigenvalue is zero, so no ratio can be formed
    pub fn is_degenerate(&self) -> bool {
        self.eigenvalues[0] == 0.0
    }

    /// Eigenvector of the largest eigenvalue
    pub fn dominant(&self) -> &Vector3d {
        &self.eigenvectors[0]
    }

    /// Eigenvector of the smallest eigenvalue, the local normal direction
    pub fn minor(&self) -> &Vector3d {
        &self.eigenvectors[2]
    }
}

/// Decompose a symmetric 3x3 matrix
///
/// Returns `None` when the matrix holds non-finite entries or the solver does
/// not converge.
pub fn decompose(matrix: &Matrix3<f64>) -> Option<EigenDecomposition> {
    if matrix.iter().any(|value| !value.is_finite()) {
        return None;
    }

    let eigen = SymmetricEigen::try_new(*matrix, f64::EPSILON, MAX_ITERATIONS)?;

    // nalgebra does not sort its eigenvalues
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let eigenvalues = order.map(|i| eigen.eigenvalues[i].max(0.0));
    let eigenvectors = order.map(|i| eigen.eigenvectors.column(i).into_owned());

    Some(EigenDecomposition {
        eigenvalues,
        eigenvectors,
    })
}
