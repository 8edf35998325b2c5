//! Cluster profiling and quality reporting.
//!
//! Profiles describe each final cluster by its mean feature values from the
//! **original** (unnormalized) matrix, with the top features by mean as the
//! cluster's defining characteristics. Purely descriptive; assignments are
//! never altered here.

use serde::{Deserialize, Serialize};

use crate::error::{AgruparError, Result};
use crate::frame::StoreFrame;
use crate::metrics::{
    calinski_harabasz_score, centroids_and_sizes, davies_bouldin_score, n_clusters,
    silhouette_score,
};
use crate::primitives::Matrix;

/// A feature and its cluster-mean value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopFeature {
    /// Feature (product/category) name.
    pub name: String,
    /// Mean value over the cluster's member stores.
    pub mean: f32,
}

/// Descriptive profile of one cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterProfile {
    /// Cluster identifier.
    pub cluster_id: usize,
    /// Number of member stores.
    pub size: usize,
    /// Mean of every feature column, in frame column order.
    pub feature_means: Vec<f32>,
    /// Highest-mean features, descending.
    pub top_features: Vec<TopFeature>,
}

/// Per-cluster quality summary in the clustering space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterQuality {
    /// Cluster identifier.
    pub cluster_id: usize,
    /// Number of member stores.
    pub size: usize,
    /// Mean member distance to the cluster centroid.
    pub cohesion: f32,
    /// Distance to the nearest other centroid.
    pub separation: f32,
}

/// Global and per-cluster quality metrics, computed once after regrouping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// Mean silhouette coefficient.
    pub silhouette: f32,
    /// Davies–Bouldin index (lower is better).
    pub davies_bouldin: f32,
    /// Calinski–Harabasz index (higher is better).
    pub calinski_harabasz: f32,
    /// One entry per non-empty cluster, ascending id.
    pub clusters: Vec<ClusterQuality>,
}

/// Builds cluster profiles and quality reports.
#[derive(Debug, Clone)]
pub struct ClusterProfiler {
    top_n: usize,
}

impl Default for ClusterProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterProfiler {
    /// Profiler retaining the default top 10 features per cluster.
    #[must_use]
    pub fn new() -> Self {
        Self { top_n: 10 }
    }

    /// Overrides how many top features each profile keeps.
    #[must_use]
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Profiles every non-empty cluster from the original matrix.
    ///
    /// # Errors
    ///
    /// Returns an error if `labels` doesn't match the frame's store count.
    pub fn profile(&self, original: &StoreFrame, labels: &[usize]) -> Result<Vec<ClusterProfile>> {
        if labels.len() != original.n_stores() {
            return Err(AgruparError::DimensionMismatch {
                expected: format!("{} labels", original.n_stores()),
                actual: format!("{}", labels.len()),
            });
        }

        let k = n_clusters(labels);
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); k];
        for (row, &label) in labels.iter().enumerate() {
            members[label].push(row);
        }

        let mut profiles = Vec::new();
        for (cluster_id, rows) in members.iter().enumerate() {
            if rows.is_empty() {
                continue;
            }
            let means = original.feature_means_over(rows);
            let feature_means = means.as_slice().to_vec();

            // Rank features by mean descending; name order breaks ties.
            let mut ranked: Vec<usize> = (0..feature_means.len()).collect();
            ranked.sort_by(|&a, &b| {
                feature_means[b]
                    .partial_cmp(&feature_means[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| original.feature_names()[a].cmp(&original.feature_names()[b]))
            });
            let top_features = ranked
                .into_iter()
                .take(self.top_n)
                .map(|j| TopFeature {
                    name: original.feature_names()[j].clone(),
                    mean: feature_means[j],
                })
                .collect();

            profiles.push(ClusterProfile {
                cluster_id,
                size: rows.len(),
                feature_means,
                top_features,
            });
        }
        Ok(profiles)
    }

    /// Global + per-cluster quality metrics over the clustering-space data.
    #[must_use]
    pub fn quality_report(&self, data: &Matrix<f32>, labels: &[usize]) -> QualityReport {
        let k = n_clusters(labels);
        let (centroids, sizes) = centroids_and_sizes(data, labels, k);

        let mut cohesion = vec![0.0_f32; k];
        for (row, &label) in labels.iter().enumerate() {
            cohesion[label] += data.row_distance_squared(row, &centroids, label).sqrt();
        }

        let mut clusters = Vec::new();
        for c in 0..k {
            if sizes[c] == 0 {
                continue;
            }
            let mut separation = f32::INFINITY;
            for other in 0..k {
                if other != c && sizes[other] > 0 {
                    let d = centroids.row_distance_squared(c, &centroids, other).sqrt();
                    separation = separation.min(d);
                }
            }
            clusters.push(ClusterQuality {
                cluster_id: c,
                size: sizes[c],
                cohesion: cohesion[c] / sizes[c] as f32,
                separation: if separation.is_finite() { separation } else { 0.0 },
            });
        }

        QualityReport {
            silhouette: silhouette_score(data, labels),
            davies_bouldin: davies_bouldin_score(data, labels),
            calinski_harabasz: calinski_harabasz_score(data, labels),
            clusters,
        }
    }
}
