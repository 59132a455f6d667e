//! Stage configuration and per-run feature schema resolution

use crate::features::{EigenvalueMode, FeatureKind, FeatureSet};
use covfeat_core::{Error, FieldId, FieldType, PointSet, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Field holding the externally computed neighbor count of each point
pub const OPTIMAL_KNN_FIELD: &str = "OptimalKNN";

/// Field holding the externally computed neighborhood radius of each point
pub const OPTIMAL_RADIUS_FIELD: &str = "OptimalRadius";

/// Configuration for covariance feature computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CovarianceFeaturesConfig {
    /// Number of nearest neighbors, the point itself excluded
    pub knn: usize,
    /// Number of worker threads
    pub threads: usize,
    /// Preset used when `features` is empty
    pub feature_set: String,
    /// Keep every `stride`-th nearest neighbor
    pub stride: usize,
    /// Radius for neighbor search; 0 disables radius mode
    pub radius: f64,
    /// Minimum neighbors within `radius` for a point to be processed
    pub min_k: usize,
    /// Explicit feature names, overriding `feature_set` when non-empty
    pub features: Vec<String>,
    /// Eigenvalue transform: "", "SQRT" or "NORM"
    pub mode: String,
    /// Read per-point neighborhoods from the OptimalKNN/OptimalRadius fields
    pub optimized: bool,
}

impl Default for CovarianceFeaturesConfig {
    fn default() -> Self {
        Self {
            knn: 10,
            threads: 1,
            feature_set: FeaturePreset::Dimensionality.name().to_string(),
            stride: 1,
            radius: 0.0,
            min_k: 3,
            features: Vec::new(),
            mode: String::new(),
            optimized: false,
        }
    }
}

impl CovarianceFeaturesConfig {
    pub fn with_knn(mut self, knn: usize) -> Self {
        self.knn = knn;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_feature_set(mut self, feature_set: &str) -> Self {
        self.feature_set = feature_set.to_string();
        self
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    /// Switch to radius mode
    pub fn with_radius(mut self, radius: f64, min_k: usize) -> Self {
        self.radius = radius;
        self.min_k = min_k;
        self
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = mode.to_string();
        self
    }

    pub fn with_optimized(mut self, optimized: bool) -> Self {
        self.optimized = optimized;
        self
    }
}

/// Built-in feature selections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeaturePreset {
    /// Linearity, Planarity, Scattering and Verticality on square-rooted eigenvalues
    Dimensionality,
    /// Every descriptor
    All,
}

impl FeaturePreset {
    pub fn name(&self) -> &'static str {
        match self {
            FeaturePreset::Dimensionality => "Dimensionality",
            FeaturePreset::All => "All",
        }
    }

    pub fn features(&self) -> FeatureSet {
        match self {
            FeaturePreset::Dimensionality => [
                FeatureKind::Linearity,
                FeatureKind::Planarity,
                FeatureKind::Scattering,
                FeatureKind::Verticality,
            ]
            .into_iter()
            .collect(),
            FeaturePreset::All => FeatureSet::all(),
        }
    }

    /// Transform imposed by the preset regardless of the configured mode
    pub fn forced_mode(&self) -> Option<EigenvalueMode> {
        match self {
            FeaturePreset::Dimensionality => Some(EigenvalueMode::SquareRoot),
            FeaturePreset::All => None,
        }
    }
}

impl FromStr for FeaturePreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Dimensionality" => Ok(FeaturePreset::Dimensionality),
            "All" => Ok(FeaturePreset::All),
            other => Err(Error::Configuration(format!(
                "Unknown feature_set \"{}\", expected \"Dimensionality\" or \"All\"",
                other
            ))),
        }
    }
}

/// How the neighborhood of each point is gathered
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NeighborhoodMode {
    /// `knn + 1` nearest neighbors (the point included), strided
    FixedK { knn: usize, stride: usize },
    /// Every neighbor within `radius`; points with fewer than `min_k` are skipped
    Radius { radius: f64, min_k: usize },
    /// Per-point neighbor count and radius read from auxiliary fields
    Adaptive {
        knn_field: FieldId,
        radius_field: FieldId,
    },
}

/// Resolved, immutable description of one run
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    features: FeatureSet,
    mode: EigenvalueMode,
    neighborhood: NeighborhoodMode,
    threads: usize,
    outputs: Vec<(FeatureKind, FieldId)>,
}

impl FeatureSchema {
    /// Validate `config` against the layout of `point_set` and register outputs
    ///
    /// Fields are only registered once the whole configuration has been
    /// validated, so a failed resolution leaves `point_set` untouched.
    pub fn resolve(config: &CovarianceFeaturesConfig, point_set: &mut PointSet) -> Result<Self> {
        if config.threads == 0 {
            return Err(Error::Configuration("threads must be at least 1".to_string()));
        }

        let configured_mode = EigenvalueMode::from_str(&config.mode)?;
        let (features, mode) = if !config.features.is_empty() {
            info!(
                "Feature list provided. Ignoring feature_set {}.",
                config.feature_set
            );
            let features = config
                .features
                .iter()
                .map(|name| FeatureKind::from_str(name))
                .collect::<Result<FeatureSet>>()?;
            (features, configured_mode)
        } else {
            let preset = FeaturePreset::from_str(&config.feature_set)?;
            let mode = match preset.forced_mode() {
                Some(forced) => {
                    if !config.mode.is_empty() && forced != configured_mode {
                        warn!(
                            "feature_set {} uses mode {}, ignoring mode {}",
                            preset.name(),
                            forced,
                            configured_mode
                        );
                    }
                    forced
                }
                None => configured_mode,
            };
            (preset.features(), mode)
        };

        let neighborhood = Self::resolve_neighborhood(config, point_set)?;

        if features.contains(FeatureKind::Density)
            && !matches!(neighborhood, NeighborhoodMode::Adaptive { .. })
        {
            warn!("Density is only computed in optimized mode and will not be written");
        }

        let outputs: Vec<(FeatureKind, FieldId)> = features
            .iter()
            .map(|kind| (kind, point_set.register_field(kind.name(), FieldType::Double)))
            .collect();

        debug!(
            "Resolved {} features, mode {:?}, neighborhood {:?}, {} threads",
            features.len(),
            mode,
            neighborhood,
            config.threads
        );

        Ok(Self {
            features,
            mode,
            neighborhood,
            threads: config.threads,
            outputs,
        })
    }

    fn resolve_neighborhood(
        config: &CovarianceFeaturesConfig,
        point_set: &PointSet,
    ) -> Result<NeighborhoodMode> {
        if config.optimized {
            let knn_field = point_set.find_field(OPTIMAL_KNN_FIELD).ok_or_else(|| {
                Error::Configuration(format!("No dimension \"{}\"", OPTIMAL_KNN_FIELD))
            })?;
            let radius_field = point_set.find_field(OPTIMAL_RADIUS_FIELD).ok_or_else(|| {
                Error::Configuration(format!("No dimension \"{}\"", OPTIMAL_RADIUS_FIELD))
            })?;
            return Ok(NeighborhoodMode::Adaptive {
                knn_field,
                radius_field,
            });
        }

        if !config.radius.is_finite() || config.radius < 0.0 {
            return Err(Error::Configuration(format!(
                "radius must be a non-negative number, got {}",
                config.radius
            )));
        }
        if config.radius > 0.0 {
            return Ok(NeighborhoodMode::Radius {
                radius: config.radius,
                min_k: config.min_k,
            });
        }

        if config.knn == 0 {
            return Err(Error::Configuration("knn must be at least 1".to_string()));
        }
        if config.stride == 0 {
            return Err(Error::Configuration("stride must be at least 1".to_string()));
        }
        Ok(NeighborhoodMode::FixedK {
            knn: config.knn,
            stride: config.stride,
        })
    }

    pub fn features(&self) -> FeatureSet {
        self.features
    }

    pub fn mode(&self) -> EigenvalueMode {
        self.mode
    }

    pub fn neighborhood(&self) -> NeighborhoodMode {
        self.neighborhood
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Field a descriptor is written to
    pub fn field(&self, kind: FeatureKind) -> Option<FieldId> {
        self.outputs
            .iter()
            .find(|(output, _)| *output == kind)
            .map(|(_, id)| *id)
    }

    pub fn output_fields(&self) -> Vec<FieldId> {
        self.outputs.iter().map(|(_, id)| *id).collect()
    }

    /// Check that `point_set` still carries the fields this schema resolved
    pub fn check_layout(&self, point_set: &PointSet) -> Result<()> {
        for (kind, id) in &self.outputs {
            if point_set.field_name(*id) != Some(kind.name()) {
                return Err(Error::Configuration(format!(
                    "Point set has no field \"{}\" registered by this schema",
                    kind
                )));
            }
        }
        if let NeighborhoodMode::Adaptive {
            knn_field,
            radius_field,
        } = self.neighborhood
        {
            if point_set.field_name(knn_field) != Some(OPTIMAL_KNN_FIELD)
                || point_set.field_name(radius_field) != Some(OPTIMAL_RADIUS_FIELD)
            {
                return Err(Error::Configuration(format!(
                    "Point set has no \"{}\"/\"{}\" fields",
                    OPTIMAL_KNN_FIELD, OPTIMAL_RADIUS_FIELD
                )));
            }
        }
        Ok(())
    }
}
