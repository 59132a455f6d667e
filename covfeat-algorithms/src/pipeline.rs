//! Covariance feature stage
//!
//! Runs in two phases. [`CovarianceFeatures::prepare`] resolves the
//! [`FeatureSchema`] against the point set's layout and registers the output
//! fields. [`CovarianceFeatures::compute`] then processes every point in
//! parallel: gather neighbors, estimate the covariance, decompose it, and
//! write the requested descriptors back into the point set.
//!
//! ```rust
//! use covfeat_algorithms::{CovarianceFeatures, CovarianceFeaturesConfig};
//! use covfeat_core::{Point3d, PointSet};
//!
//! fn main() -> covfeat_core::Result<()> {
//!     let mut set: PointSet = (0..20)
//!         .map(|i| {
//!             let t = i as f64;
//!             Point3d::new(t.cos(), t.sin(), 0.1 * t)
//!         })
//!         .collect();
//!
//!     let mut stage = CovarianceFeatures::new(CovarianceFeaturesConfig::default().with_knn(5));
//!     stage.prepare(&mut set)?;
//!     let summary = stage.compute(&mut set)?;
//!
//!     assert_eq!(summary.processed, 20);
//!     assert!(set.find_field("Linearity").is_some());
//!     Ok(())
//! }
//! ```

use crate::covariance::compute_covariance;
use crate::eigen::decompose;
use crate::features::{derive_features, OptimalNeighborhood};
use crate::nearest_neighbor::{first_non_finite, KdTree};
use crate::parallel::{build_thread_pool, partition_ranges, run_partitions, ThreadPoolConfig};
use crate::schema::{CovarianceFeaturesConfig, FeatureSchema, NeighborhoodMode};
use covfeat_core::{Error, NearestNeighborSearch, PointId, PointSet, PointSetPartition, Result};
use tracing::debug;

/// Point counts of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComputeSummary {
    /// Points whose descriptors were written
    pub processed: usize,
    /// Points skipped for having too few neighbors within the radius
    pub skipped: usize,
}

impl ComputeSummary {
    fn merge(self, other: ComputeSummary) -> ComputeSummary {
        ComputeSummary {
            processed: self.processed + other.processed,
            skipped: self.skipped + other.skipped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PointOutcome {
    Written,
    Skipped,
}

/// Stage computing covariance-based descriptors for every point of a set
#[derive(Debug, Clone)]
pub struct CovarianceFeatures {
    config: CovarianceFeaturesConfig,
    schema: Option<FeatureSchema>,
}

impl CovarianceFeatures {
    pub fn new(config: CovarianceFeaturesConfig) -> Self {
        Self {
            config,
            schema: None,
        }
    }

    pub fn config(&self) -> &CovarianceFeaturesConfig {
        &self.config
    }

    /// Schema resolved by the last successful [`prepare`](Self::prepare)
    pub fn schema(&self) -> Option<&FeatureSchema> {
        self.schema.as_ref()
    }

    /// Resolve the schema and register output fields on `point_set`
    ///
    /// # Errors
    /// [`Error::Configuration`] for invalid options, or when optimized mode is
    /// requested and the point set lacks the OptimalKNN/OptimalRadius fields.
    pub fn prepare(&mut self, point_set: &mut PointSet) -> Result<&FeatureSchema> {
        let schema = FeatureSchema::resolve(&self.config, point_set)?;
        Ok(self.schema.insert(schema))
    }

    /// Compute descriptors using a k-d tree built over `point_set`
    ///
    /// # Errors
    /// A point with non-finite coordinates has no usable covariance and is
    /// reported as [`Error::DecompositionFailure`] before any work starts.
    pub fn compute(&self, point_set: &mut PointSet) -> Result<ComputeSummary> {
        if let Some(point_id) = first_non_finite(point_set.positions()) {
            return Err(Error::DecompositionFailure { point_id });
        }
        let index = KdTree::new(point_set.positions())?;
        self.compute_with_index(point_set, &index)
    }

    /// Compute descriptors using a caller-provided spatial index
    ///
    /// `index` must have been built over the coordinates of `point_set`.
    ///
    /// # Errors
    /// [`Error::DegenerateGeometry`] or [`Error::DecompositionFailure`] from
    /// any point aborts the run once every worker has finished.
    pub fn compute_with_index<S>(&self, point_set: &mut PointSet, index: &S) -> Result<ComputeSummary>
    where
        S: NearestNeighborSearch + Sync + ?Sized,
    {
        let schema = self.schema.as_ref().ok_or_else(|| {
            Error::Configuration("Feature schema not resolved, call prepare first".to_string())
        })?;
        schema.check_layout(point_set)?;

        if index.len() != point_set.len() {
            return Err(Error::InvalidData(format!(
                "Spatial index holds {} points but the point set has {}",
                index.len(),
                point_set.len()
            )));
        }

        let threads = schema.threads();
        let pool = build_thread_pool(&ThreadPoolConfig::default().with_threads(threads))?;
        let ranges = partition_ranges(point_set.len(), threads);
        let partitions = point_set.partition_mut(&ranges, &schema.output_fields())?;

        let summaries = run_partitions(&pool, partitions, |mut partition| {
            let mut summary = ComputeSummary::default();
            for id in partition.range() {
                match process_point(schema, index, &mut partition, id)? {
                    PointOutcome::Written => summary.processed += 1,
                    PointOutcome::Skipped => summary.skipped += 1,
                }
            }
            Ok(summary)
        })?;

        let summary = summaries
            .into_iter()
            .fold(ComputeSummary::default(), ComputeSummary::merge);
        debug!(
            "Computed covariance features: {} points written, {} skipped, {} threads",
            summary.processed, summary.skipped, threads
        );

        Ok(summary)
    }
}

/// Resolve the configuration, register fields, and compute in one call
pub fn compute_covariance_features(
    point_set: &mut PointSet,
    config: CovarianceFeaturesConfig,
) -> Result<ComputeSummary> {
    let mut stage = CovarianceFeatures::new(config);
    stage.prepare(point_set)?;
    stage.compute(point_set)
}

fn process_point<S>(
    schema: &FeatureSchema,
    index: &S,
    partition: &mut PointSetPartition<'_>,
    id: PointId,
) -> Result<PointOutcome>
where
    S: NearestNeighborSearch + ?Sized,
{
    let positions = partition.positions();
    let query = &positions[id];

    let mut optimal = None;
    let neighbors = match schema.neighborhood() {
        NeighborhoodMode::FixedK { knn, stride } => {
            index.find_k_nearest_strided(query, knn + 1, stride)
        }
        NeighborhoodMode::Radius { radius, min_k } => {
            let neighbors: Vec<PointId> = index
                .find_radius_neighbors(query, radius)
                .into_iter()
                .map(|(idx, _)| idx)
                .collect();
            if neighbors.len() < min_k {
                return Ok(PointOutcome::Skipped);
            }
            neighbors
        }
        NeighborhoodMode::Adaptive {
            knn_field,
            radius_field,
        } => {
            let knn = partition.get_field(knn_field, id).unwrap_or(0.0) as u64;
            let radius = partition.get_field(radius_field, id).unwrap_or(0.0);
            optimal = Some(OptimalNeighborhood { knn, radius });
            index.find_k_nearest_strided(query, knn as usize, 1)
        }
    };

    let covariance = compute_covariance(positions, &neighbors);
    let decomposition =
        decompose(&covariance).ok_or(Error::DecompositionFailure { point_id: id })?;

    derive_features(
        id,
        &decomposition,
        schema.mode(),
        schema.features(),
        optimal.as_ref(),
        |kind, value| match schema.field(kind) {
            Some(field) => partition.set_field(field, id, value),
            None => Err(Error::Algorithm(format!("No output field for {}", kind))),
        },
    )?;

    Ok(PointOutcome::Written)
}
