//! The clustering pipeline: reduce, partition, balance, regroup, profile,
//! validate. Strictly forward; no phase re-enters an earlier one.

use std::collections::BTreeSet;

use crate::cluster::{KMeans, SizeBalancer, SizeBounds, TemperatureRegrouper};
use crate::error::{AgruparError, Result};
use crate::loading::LoadedInputs;
use crate::output::OutputWriter;
use crate::profile::{ClusterProfile, ClusterProfiler, QualityReport};
use crate::reduce::Pca;
use crate::results::AssignmentTable;
use crate::traits::{Transformer, UnsupervisedEstimator};
use crate::validate::ResultValidator;

/// Tuning for one clustering run.
#[derive(Debug, Clone)]
pub struct SegmentationConfig {
    /// Cluster size constraints.
    pub bounds: SizeBounds,
    /// Requested PCA components (clamped to the data).
    pub n_components: usize,
    /// Seed for all randomized stages.
    pub seed: u64,
    /// Iteration cap for each balancing pass.
    pub max_balance_iterations: usize,
    /// Whether to regroup within temperature bands when band data exists.
    pub temperature_aware: bool,
    /// Minimum store count for a meaningful run.
    pub min_stores: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            bounds: SizeBounds::default(),
            n_components: 20,
            seed: 42,
            max_balance_iterations: 100,
            temperature_aware: true,
            min_stores: 60,
        }
    }
}

impl SegmentationConfig {
    /// Sets size bounds.
    #[must_use]
    pub fn with_bounds(mut self, bounds: SizeBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Sets the requested PCA component count.
    #[must_use]
    pub fn with_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enables or disables temperature-aware regrouping.
    #[must_use]
    pub fn with_temperature_aware(mut self, enabled: bool) -> Self {
        self.temperature_aware = enabled;
        self
    }

    /// Sets the minimum store count.
    #[must_use]
    pub fn with_min_stores(mut self, min_stores: usize) -> Self {
        self.min_stores = min_stores;
        self
    }
}

/// Everything a finished run hands to downstream consumers.
#[derive(Debug, Clone)]
pub struct SegmentationOutcome {
    /// Final store -> cluster table.
    pub assignments: AssignmentTable,
    /// Final labels in store-row order.
    pub labels: Vec<usize>,
    /// Per-cluster descriptive profiles (from the original matrix).
    pub profiles: Vec<ClusterProfile>,
    /// Global and per-cluster quality metrics.
    pub quality: QualityReport,
    /// Fraction of variance the reduction kept (diagnostic).
    pub explained_variance: f32,
    /// Whether size balancing satisfied the bounds before its cap.
    pub balance_converged: bool,
    /// Whether the temperature regrouping phase actually ran.
    pub regrouped: bool,
}

/// Orchestrates one clustering run end to end.
///
/// # Examples
///
/// ```no_run
/// use agrupar::engine::{SegmentationConfig, SegmentationEngine};
/// use agrupar::loading::MatrixLoader;
///
/// let inputs = MatrixLoader::new("normalized.csv", "original.csv").load().unwrap();
/// let engine = SegmentationEngine::new(SegmentationConfig::default());
/// let outcome = engine.run(&inputs).unwrap();
/// assert_eq!(outcome.labels.len(), inputs.normalized.n_stores());
/// ```
#[derive(Debug, Clone)]
pub struct SegmentationEngine {
    config: SegmentationConfig,
}

impl SegmentationEngine {
    /// Creates an engine with the given configuration.
    #[must_use]
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Runs reduce -> partition -> balance -> regroup -> profile -> validate.
    ///
    /// # Errors
    ///
    /// Returns [`AgruparError::InsufficientData`] below the store minimum,
    /// and propagates any phase or validation failure.
    pub fn run(&self, inputs: &LoadedInputs) -> Result<SegmentationOutcome> {
        let n_stores = inputs.normalized.n_stores();
        if n_stores < self.config.min_stores {
            return Err(AgruparError::InsufficientData {
                n_stores,
                min_required: self.config.min_stores,
            });
        }
        debug_assert_eq!(
            inputs.normalized.store_ids(),
            inputs.original.store_ids(),
            "loader must align the two matrices"
        );

        // 1. Reduce.
        let mut pca = Pca::new(self.config.n_components);
        let reduced = pca.fit_transform(inputs.normalized.values())?;
        let explained_variance = pca.total_explained_variance().unwrap_or(0.0);
        log::info!(
            "reduced {n_stores} stores x {} features to {} components ({:.1}% variance)",
            inputs.normalized.n_features(),
            reduced.n_cols(),
            explained_variance * 100.0
        );

        // 2. Initial partition.
        let k = n_stores.div_ceil(self.config.bounds.target_size).max(1);
        let mut kmeans = KMeans::new(k).with_random_state(self.config.seed);
        kmeans.fit(&reduced)?;
        log::info!(
            "k-means produced {k} initial cluster(s) (inertia {:.2})",
            kmeans.inertia()
        );

        // 3. Balance sizes.
        let balancer = SizeBalancer::new(self.config.bounds)
            .with_max_iterations(self.config.max_balance_iterations);
        let balance = balancer.balance(&reduced, kmeans.labels())?;
        log::info!(
            "balancing took {} iteration(s), {} move(s), converged={}",
            balance.iterations,
            balance.moves,
            balance.converged
        );

        // 4. Temperature-aware regrouping (optional phase).
        let mut undersized_allowance = 1;
        let (labels, regrouped) = if self.config.temperature_aware && inputs.has_temperature() {
            let bands: Vec<Option<String>> = match &inputs.temperature {
                Some(map) => inputs
                    .normalized
                    .store_ids()
                    .iter()
                    .map(|id| map.get(id).cloned())
                    .collect(),
                None => vec![None; n_stores],
            };
            let regrouper = TemperatureRegrouper::new(self.config.bounds, self.config.seed)
                .with_max_balance_iterations(self.config.max_balance_iterations);
            let outcome = regrouper.regroup(&reduced, &balance.labels, &bands)?;
            if outcome.regrouped {
                // Each band partitions independently and may carry its own
                // remainder; bandless stores form one more such group.
                let band_count = outcome
                    .band_of_cluster
                    .values()
                    .collect::<BTreeSet<_>>()
                    .len();
                let bandless = bands.iter().any(Option::is_none);
                undersized_allowance = band_count + usize::from(bandless);
            }
            (outcome.labels, outcome.regrouped)
        } else {
            if self.config.temperature_aware {
                log::info!("no temperature data; regrouping skipped");
            }
            (balance.labels.clone(), false)
        };

        // 5. Profile and score.
        let profiler = ClusterProfiler::new();
        let profiles = profiler.profile(&inputs.original, &labels)?;
        let quality = profiler.quality_report(&reduced, &labels);
        log::info!(
            "quality: silhouette {:.3}, davies-bouldin {:.3}, calinski-harabasz {:.1}",
            quality.silhouette,
            quality.davies_bouldin,
            quality.calinski_harabasz
        );

        // 6. Validate. Failures propagate uncaught.
        let assignments = AssignmentTable::from_labels(inputs.normalized.store_ids(), &labels)?;
        let mut validator = ResultValidator::new(self.config.bounds)
            .with_undersized_allowance(undersized_allowance);
        validator.validate(&assignments, &quality)?;

        Ok(SegmentationOutcome {
            assignments,
            labels,
            profiles,
            quality,
            explained_variance,
            balance_converged: balance.converged,
            regrouped,
        })
    }

    /// Persists a finished run through the writer: assignments, profiles,
    /// per-cluster metrics, and the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error on any write failure.
    pub fn persist(
        &self,
        inputs: &LoadedInputs,
        outcome: &SegmentationOutcome,
        writer: &mut OutputWriter,
    ) -> Result<()> {
        writer.write_assignments(&outcome.assignments)?;
        writer.write_profiles(&outcome.profiles, inputs.original.feature_names())?;
        writer.write_metrics(&outcome.quality)?;
        writer.write_manifest()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::StoreFrame;
    use crate::primitives::Matrix;
    use std::collections::BTreeMap;

    /// Synthetic inputs: `per_blob` stores around each 2D center, ids
    /// `S000..`, identical normalized/original content.
    fn synthetic_inputs(centers: &[(f32, f32)], per_blob: usize) -> LoadedInputs {
        let n = centers.len() * per_blob;
        let mut ids = Vec::with_capacity(n);
        let mut data = Vec::with_capacity(n * 2);
        for (b, &(cx, cy)) in centers.iter().enumerate() {
            for i in 0..per_blob {
                ids.push(format!("S{:04}", b * per_blob + i));
                let jitter = (i as f32 * 0.017) % 0.9;
                data.push(cx + jitter);
                data.push(cy + jitter * 0.4);
            }
        }
        let matrix = Matrix::from_vec(n, 2, data).unwrap();
        let frame = StoreFrame::new(
            ids,
            vec!["shoes".to_string(), "coats".to_string()],
            matrix,
        )
        .unwrap();
        LoadedInputs {
            normalized: frame.clone(),
            original: frame,
            temperature: None,
        }
    }

    fn config() -> SegmentationConfig {
        SegmentationConfig::default()
            .with_bounds(SizeBounds::new(8, 10, 12).unwrap())
            .with_min_stores(10)
            .with_components(2)
    }

    #[test]
    fn test_run_assigns_every_store() {
        let inputs = synthetic_inputs(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)], 10);
        let outcome = SegmentationEngine::new(config()).run(&inputs).unwrap();
        assert_eq!(outcome.labels.len(), 30);
        assert_eq!(outcome.assignments.len(), 30);
        assert!(outcome
            .assignments
            .records()
            .iter()
            .all(|r| r.cluster.is_some()));
    }

    #[test]
    fn test_run_respects_bounds() {
        let inputs = synthetic_inputs(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)], 10);
        let outcome = SegmentationEngine::new(config()).run(&inputs).unwrap();
        let sizes = outcome.assignments.cluster_sizes();
        let undersized = sizes.values().filter(|&&s| s < 8).count();
        assert!(sizes.values().all(|&s| s <= 12), "{sizes:?}");
        assert!(undersized <= 1, "{sizes:?}");
    }

    #[test]
    fn test_insufficient_data_rejected() {
        let inputs = synthetic_inputs(&[(0.0, 0.0)], 5);
        let err = SegmentationEngine::new(config()).run(&inputs).unwrap_err();
        assert!(matches!(err, AgruparError::InsufficientData { .. }));
    }

    #[test]
    fn test_deterministic_run_twice() {
        let inputs = synthetic_inputs(&[(0.0, 0.0), (6.0, 6.0)], 15);
        let engine = SegmentationEngine::new(config());
        let a = engine.run(&inputs).unwrap();
        let b = engine.run(&inputs).unwrap();
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_temperature_regrouping_runs_when_data_present() {
        let mut inputs = synthetic_inputs(&[(0.0, 0.0), (10.0, 0.0)], 10);
        let mut bands = BTreeMap::new();
        for id in inputs.normalized.store_ids() {
            let band = if id.as_str() < "S0010" { "Cold" } else { "Warm" };
            bands.insert(id.clone(), band.to_string());
        }
        inputs.temperature = Some(bands.clone());

        let engine = SegmentationEngine::new(
            config().with_bounds(SizeBounds::new(5, 10, 15).unwrap()),
        );
        let outcome = engine.run(&inputs).unwrap();
        assert!(outcome.regrouped);

        // Band purity on the final labels.
        let mut cluster_band: BTreeMap<usize, &str> = BTreeMap::new();
        for (row, id) in inputs.normalized.store_ids().iter().enumerate() {
            let band = bands[id].as_str();
            let cluster = outcome.labels[row];
            let prev = cluster_band.insert(cluster, band);
            if let Some(prev) = prev {
                assert_eq!(prev, band, "cluster {cluster} mixes bands");
            }
        }
    }

    #[test]
    fn test_small_bands_each_keep_their_remainder() {
        // Two bands below min_size next to one dominant band: every band
        // still partitions on its own, and the run validates because each
        // band is entitled to one remainder cluster.
        let mut inputs = synthetic_inputs(
            &[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)],
            12,
        );
        let mut bands = BTreeMap::new();
        for (row, id) in inputs.normalized.store_ids().iter().enumerate() {
            let band = match row {
                0..=3 => "Cold",
                4..=7 => "Hot",
                _ => "Moderate",
            };
            bands.insert(id.clone(), band.to_string());
        }
        inputs.temperature = Some(bands);

        let outcome = SegmentationEngine::new(config()).run(&inputs).unwrap();
        assert!(outcome.regrouped);
        assert_eq!(outcome.labels.len(), 48);

        let sizes = outcome.assignments.cluster_sizes();
        // Exactly the two tiny bands end up below min_size; nothing is
        // oversized.
        let undersized = sizes.values().filter(|&&s| s < 8).count();
        assert_eq!(undersized, 2, "{sizes:?}");
        assert!(sizes.values().all(|&s| s <= 12), "{sizes:?}");
    }

    #[test]
    fn test_temperature_disabled_is_passthrough() {
        let mut inputs = synthetic_inputs(&[(0.0, 0.0), (10.0, 0.0)], 10);
        let mut bands = BTreeMap::new();
        for id in inputs.normalized.store_ids() {
            bands.insert(id.clone(), "Cold".to_string());
        }
        inputs.temperature = Some(bands);

        let engine = SegmentationEngine::new(config().with_temperature_aware(false));
        let outcome = engine.run(&inputs).unwrap();
        assert!(!outcome.regrouped);
    }

    #[test]
    fn test_profiles_cover_all_clusters() {
        let inputs = synthetic_inputs(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)], 10);
        let outcome = SegmentationEngine::new(config()).run(&inputs).unwrap();
        assert_eq!(outcome.profiles.len(), outcome.assignments.n_clusters());
        for profile in &outcome.profiles {
            assert!(profile.size > 0);
            assert!(!profile.top_features.is_empty());
        }
    }
}
