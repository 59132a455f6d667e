//! Eigenvalue-based local shape descriptors
//!
//! Descriptors follow Guinard & Landrieu, "Weakly supervised
//! segmentation-aided classification of urban scenes from 3D LiDAR point
//! clouds" (2017), plus the Demantke verticality and an adaptive-neighborhood
//! density.

use crate::eigen::EigenDecomposition;
use covfeat_core::{Error, PointId, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// A named per-point descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKind {
    Linearity,
    Planarity,
    Scattering,
    Verticality,
    Omnivariance,
    Sum,
    Eigenentropy,
    Anisotropy,
    SurfaceVariation,
    DemantkeVerticality,
    Density,
}

impl FeatureKind {
    /// Every descriptor, in output order
    pub const ALL: [FeatureKind; 11] = [
        FeatureKind::Linearity,
        FeatureKind::Planarity,
        FeatureKind::Scattering,
        FeatureKind::Verticality,
        FeatureKind::Omnivariance,
        FeatureKind::Sum,
        FeatureKind::Eigenentropy,
        FeatureKind::Anisotropy,
        FeatureKind::SurfaceVariation,
        FeatureKind::DemantkeVerticality,
        FeatureKind::Density,
    ];

    /// Field name the descriptor is written to
    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::Linearity => "Linearity",
            FeatureKind::Planarity => "Planarity",
            FeatureKind::Scattering => "Scattering",
            FeatureKind::Verticality => "Verticality",
            FeatureKind::Omnivariance => "Omnivariance",
            FeatureKind::Sum => "Sum",
            FeatureKind::Eigenentropy => "Eigenentropy",
            FeatureKind::Anisotropy => "Anisotropy",
            FeatureKind::SurfaceVariation => "SurfaceVariation",
            FeatureKind::DemantkeVerticality => "DemantkeVerticality",
            FeatureKind::Density => "Density",
        }
    }

    fn bit(&self) -> u16 {
        1 << (*self as u16)
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FeatureKind::ALL
            .iter()
            .find(|kind| kind.name() == s)
            .copied()
            .ok_or_else(|| Error::Configuration(format!("Unknown feature \"{}\"", s)))
    }
}

/// A set of descriptors, stored as a bitmask over [`FeatureKind`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FeatureSet(u16);

impl FeatureSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        FeatureKind::ALL.into_iter().collect()
    }

    pub fn insert(&mut self, kind: FeatureKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: FeatureKind) {
        self.0 &= !kind.bit();
    }

    pub fn contains(&self, kind: FeatureKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Members in [`FeatureKind::ALL`] order
    pub fn iter(&self) -> impl Iterator<Item = FeatureKind> + '_ {
        FeatureKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<FeatureKind> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = FeatureKind>>(iter: I) -> Self {
        let mut set = FeatureSet::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

/// Transform applied to all three eigenvalues before deriving descriptors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EigenvalueMode {
    /// Eigenvalues used as is
    #[default]
    Raw,
    /// Square roots of the eigenvalues (Gressin et al., 2012)
    SquareRoot,
    /// Eigenvalues divided by their sum
    Normalized,
}

impl EigenvalueMode {
    /// Apply the transform; a zero sum leaves normalized values unchanged
    pub fn apply(&self, eigenvalues: [f64; 3]) -> [f64; 3] {
        match self {
            EigenvalueMode::Raw => eigenvalues,
            EigenvalueMode::SquareRoot => eigenvalues.map(f64::sqrt),
            EigenvalueMode::Normalized => {
                let sum: f64 = eigenvalues.iter().sum();
                if sum > 0.0 {
                    eigenvalues.map(|value| value / sum)
                } else {
                    eigenvalues
                }
            }
        }
    }
}

impl fmt::Display for EigenvalueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EigenvalueMode::Raw => f.write_str(""),
            EigenvalueMode::SquareRoot => f.write_str("SQRT"),
            EigenvalueMode::Normalized => f.write_str("NORM"),
        }
    }
}

impl FromStr for EigenvalueMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(EigenvalueMode::Raw),
            "SQRT" => Ok(EigenvalueMode::SquareRoot),
            "NORM" => Ok(EigenvalueMode::Normalized),
            other => Err(Error::Configuration(format!(
                "Unknown eigenvalue mode \"{}\", expected \"\", \"SQRT\" or \"NORM\"",
                other
            ))),
        }
    }
}

/// Externally computed neighborhood size for one point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimalNeighborhood {
    pub knn: u64,
    pub radius: f64,
}

impl OptimalNeighborhood {
    /// Neighbor count (the point included) over the volume of the sphere
    pub fn density(&self) -> f64 {
        (self.knn as f64 + 1.0) / (4.0 / 3.0 * PI * self.radius.powi(3))
    }
}

/// Derive the requested descriptors for one point
///
/// Each value is handed to `write` as soon as it is computed; unrequested
/// descriptors are never evaluated. Density is only produced when `optimal`
/// is given. Eigenentropy is NaN when any transformed eigenvalue is zero.
///
/// # Errors
/// [`Error::DegenerateGeometry`] when the dominant eigenvalue is zero, before
/// anything is written. Errors returned by `write` are propagated.
pub fn derive_features<F>(
    point_id: PointId,
    decomposition: &EigenDecomposition,
    mode: EigenvalueMode,
    features: FeatureSet,
    optimal: Option<&OptimalNeighborhood>,
    mut write: F,
) -> Result<()>
where
    F: FnMut(FeatureKind, f64) -> Result<()>,
{
    if decomposition.is_degenerate() {
        return Err(Error::DegenerateGeometry { point_id });
    }

    let lambda = mode.apply(decomposition.eigenvalues);
    let sum: f64 = lambda.iter().sum();
    let [e0, e1, e2] = &decomposition.eigenvectors;

    for kind in features.iter() {
        let value = match kind {
            FeatureKind::Linearity => (lambda[0] - lambda[1]) / lambda[0],
            FeatureKind::Planarity => (lambda[1] - lambda[2]) / lambda[0],
            FeatureKind::Scattering => lambda[2] / lambda[0],
            FeatureKind::Verticality => {
                let unary = e0.abs() * lambda[0] + e1.abs() * lambda[1] + e2.abs() * lambda[2];
                unary.z / unary.norm()
            }
            FeatureKind::Omnivariance => (lambda[0] * lambda[1] * lambda[2]).cbrt(),
            FeatureKind::Sum => sum,
            FeatureKind::Eigenentropy => -lambda.iter().map(|l| l * l.ln()).sum::<f64>(),
            FeatureKind::Anisotropy => (lambda[0] - lambda[2]) / lambda[0],
            FeatureKind::SurfaceVariation => lambda[2] / sum,
            FeatureKind::DemantkeVerticality => 1.0 - e2.z.abs(),
            FeatureKind::Density => match optimal {
                Some(optimal) => optimal.density(),
                None => continue,
            },
        };
        write(kind, value)?;
    }

    Ok(())
}
