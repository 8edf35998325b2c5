//! K-Means clustering with seeded multi-restart initialization.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{AgruparError, Result};
use crate::metrics::inertia;
use crate::primitives::Matrix;
use crate::traits::UnsupervisedEstimator;

/// K-Means clustering (Lloyd's algorithm, k-means++-style seeding).
///
/// Each restart draws its first centroid from a seeded RNG and picks the
/// remaining centroids by farthest-point selection; the restart with the
/// lowest inertia wins. With a fixed `random_state` the result is fully
/// deterministic.
///
/// # Examples
///
/// ```
/// use agrupar::prelude::*;
///
/// let data = Matrix::from_vec(6, 2, vec![
///     1.0, 2.0,
///     1.5, 1.8,
///     1.0, 0.6,
///     8.0, 8.0,
///     9.0, 11.0,
///     8.5, 9.0,
/// ]).unwrap();
///
/// let mut kmeans = KMeans::new(2).with_random_state(42);
/// kmeans.fit(&data).unwrap();
/// let labels = kmeans.predict(&data);
/// assert_eq!(labels.len(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct KMeans {
    /// Number of clusters.
    n_clusters: usize,
    /// Maximum Lloyd iterations per restart.
    max_iter: usize,
    /// Convergence tolerance on centroid movement.
    tol: f32,
    /// Number of random restarts.
    n_init: usize,
    /// Random seed for initialization.
    random_state: Option<u64>,
    /// Cluster centroids after fitting.
    centroids: Option<Matrix<f32>>,
    /// Labels for training data.
    labels: Option<Vec<usize>>,
    /// Best within-cluster sum of squares across restarts.
    inertia: f32,
    /// Iterations run by the winning restart.
    n_iter: usize,
}

impl Default for KMeans {
    fn default() -> Self {
        Self::new(8)
    }
}

impl KMeans {
    /// Creates a new K-Means with the specified number of clusters.
    #[must_use]
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 300,
            tol: 1e-4,
            n_init: 4,
            random_state: None,
            centroids: None,
            labels: None,
            inertia: 0.0,
            n_iter: 0,
        }
    }

    /// Sets the maximum number of Lloyd iterations.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sets the convergence tolerance.
    #[must_use]
    pub fn with_tol(mut self, tol: f32) -> Self {
        self.tol = tol;
        self
    }

    /// Sets the number of random restarts.
    #[must_use]
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    /// Sets the random seed for reproducibility.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Returns the cluster centroids.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn centroids(&self) -> &Matrix<f32> {
        self.centroids
            .as_ref()
            .expect("Model not fitted. Call fit() first.")
    }

    /// Returns the labels assigned to the training data.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        self.labels
            .as_ref()
            .expect("Model not fitted. Call fit() first.")
    }

    /// Returns the inertia (within-cluster sum of squares).
    #[must_use]
    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    /// Returns the number of iterations run by the winning restart.
    #[must_use]
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Returns true if the model has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.centroids.is_some()
    }

    /// Seeds centroids for one restart: random first pick, then
    /// farthest-point selection over squared distances.
    fn init_centroids(&self, x: &Matrix<f32>, restart: u64) -> Matrix<f32> {
        let (n_samples, n_features) = x.shape();
        let seed = self.random_state.unwrap_or(42).wrapping_add(restart);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut chosen = Vec::with_capacity(self.n_clusters);
        chosen.push(rng.gen_range(0..n_samples));

        let mut min_distances = vec![f32::INFINITY; n_samples];
        while chosen.len() < self.n_clusters {
            let last = *chosen.last().unwrap_or(&0);
            for (i, min_dist) in min_distances.iter_mut().enumerate() {
                let d = x.row_distance_squared(i, x, last);
                if d < *min_dist {
                    *min_dist = d;
                }
            }
            // Farthest point from the current centroid set; index order
            // breaks ties.
            let mut max_dist = -1.0;
            let mut max_idx = 0;
            for (i, &dist) in min_distances.iter().enumerate() {
                if dist > max_dist {
                    max_dist = dist;
                    max_idx = i;
                }
            }
            chosen.push(max_idx);
        }

        let mut data = Vec::with_capacity(self.n_clusters * n_features);
        for &idx in &chosen {
            data.extend_from_slice(x.row_slice(idx));
        }
        Matrix::from_vec(self.n_clusters, n_features, data)
            .unwrap_or_else(|_| Matrix::zeros(self.n_clusters, n_features))
    }

    /// Assigns each sample to the nearest centroid (lowest index wins ties).
    fn assign_labels(&self, x: &Matrix<f32>, centroids: &Matrix<f32>) -> Vec<usize> {
        let n_samples = x.n_rows();
        let mut labels = vec![0; n_samples];

        for (i, label) in labels.iter_mut().enumerate() {
            let mut min_dist = f32::INFINITY;
            let mut min_cluster = 0;
            for k in 0..self.n_clusters {
                let dist = x.row_distance_squared(i, centroids, k);
                if dist < min_dist {
                    min_dist = dist;
                    min_cluster = k;
                }
            }
            *label = min_cluster;
        }
        labels
    }

    /// Updates centroids as the mean of assigned samples; an empty cluster
    /// keeps its previous centroid.
    fn update_centroids(
        &self,
        x: &Matrix<f32>,
        labels: &[usize],
        previous: &Matrix<f32>,
    ) -> Matrix<f32> {
        let (_, n_features) = x.shape();
        let mut sums = vec![0.0_f32; self.n_clusters * n_features];
        let mut counts = vec![0usize; self.n_clusters];

        for (i, &label) in labels.iter().enumerate() {
            counts[label] += 1;
            for (j, s) in sums[label * n_features..(label + 1) * n_features]
                .iter_mut()
                .enumerate()
            {
                *s += x.get(i, j);
            }
        }

        for k in 0..self.n_clusters {
            if counts[k] > 0 {
                for j in 0..n_features {
                    sums[k * n_features + j] /= counts[k] as f32;
                }
            } else {
                for j in 0..n_features {
                    sums[k * n_features + j] = previous.get(k, j);
                }
            }
        }

        Matrix::from_vec(self.n_clusters, n_features, sums)
            .unwrap_or_else(|_| Matrix::zeros(self.n_clusters, n_features))
    }

    fn centroids_converged(&self, old: &Matrix<f32>, new: &Matrix<f32>) -> bool {
        let k = old.n_rows();
        (0..k).all(|c| old.row_distance_squared(c, new, c) <= self.tol * self.tol)
    }

    /// One full Lloyd run from a seeded initialization.
    fn run_once(&self, x: &Matrix<f32>, restart: u64) -> (Matrix<f32>, Vec<usize>, f32, usize) {
        let mut centroids = self.init_centroids(x, restart);
        let mut labels = vec![0; x.n_rows()];
        let mut iterations = 0;

        for iter in 0..self.max_iter {
            labels = self.assign_labels(x, &centroids);
            let new_centroids = self.update_centroids(x, &labels, &centroids);
            iterations = iter + 1;
            let converged = self.centroids_converged(&centroids, &new_centroids);
            centroids = new_centroids;
            if converged {
                break;
            }
        }

        let score = inertia(x, &centroids, &labels);
        (centroids, labels, score, iterations)
    }
}

impl UnsupervisedEstimator for KMeans {
    type Labels = Vec<usize>;

    /// Fits the model: runs `n_init` seeded restarts and keeps the lowest
    /// inertia.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is empty or has fewer samples than
    /// clusters.
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
        let n_samples = x.n_rows();
        if n_samples == 0 {
            return Err(AgruparError::InsufficientData {
                n_stores: 0,
                min_required: self.n_clusters,
            });
        }
        if n_samples < self.n_clusters {
            return Err(AgruparError::InvalidHyperparameter {
                param: "n_clusters".to_string(),
                value: self.n_clusters.to_string(),
                constraint: format!("<= {n_samples} samples"),
            });
        }

        let mut best: Option<(Matrix<f32>, Vec<usize>, f32, usize)> = None;
        for restart in 0..self.n_init as u64 {
            let run = self.run_once(x, restart);
            let better = best.as_ref().map_or(true, |b| run.2 < b.2);
            if better {
                best = Some(run);
            }
        }

        let (centroids, labels, score, iterations) =
            best.ok_or_else(|| AgruparError::from("k-means produced no candidate solution"))?;
        self.centroids = Some(centroids);
        self.labels = Some(labels);
        self.inertia = score;
        self.n_iter = iterations;
        Ok(())
    }

    /// Predicts cluster labels for new data.
    ///
    /// # Panics
    ///
    /// Panics if the model is not fitted.
    fn predict(&self, x: &Matrix<f32>) -> Vec<usize> {
        let centroids = self
            .centroids
            .as_ref()
            .expect("Model not fitted. Call fit() first.");
        self.assign_labels(x, centroids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> Matrix<f32> {
        // Two well-separated clusters
        Matrix::from_vec(
            6,
            2,
            vec![1.0, 2.0, 1.5, 1.8, 1.0, 0.6, 8.0, 8.0, 9.0, 11.0, 8.5, 9.0],
        )
        .unwrap()
    }

    #[test]
    fn test_new() {
        let kmeans = KMeans::new(3);
        assert_eq!(kmeans.n_clusters, 3);
        assert!(!kmeans.is_fitted());
    }

    #[test]
    fn test_fit_basic() {
        let data = sample_data();
        let mut kmeans = KMeans::new(2).with_random_state(42);
        kmeans.fit(&data).unwrap();

        assert!(kmeans.is_fitted());
        assert_eq!(kmeans.centroids().shape(), (2, 2));
        assert!(kmeans.inertia() >= 0.0);
        assert!(kmeans.n_iter() >= 1);
    }

    #[test]
    fn test_separated_blobs_recovered() {
        let data = sample_data();
        let mut kmeans = KMeans::new(2).with_random_state(42);
        kmeans.fit(&data).unwrap();

        let labels = kmeans.predict(&data);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_all_labels_valid() {
        let data = sample_data();
        let mut kmeans = KMeans::new(3).with_random_state(7);
        kmeans.fit(&data).unwrap();
        for &label in kmeans.labels() {
            assert!(label < 3);
        }
    }

    #[test]
    fn test_deterministic_with_seed() {
        let data = sample_data();
        let mut a = KMeans::new(2).with_random_state(11);
        let mut b = KMeans::new(2).with_random_state(11);
        a.fit(&data).unwrap();
        b.fit(&data).unwrap();
        assert_eq!(a.labels(), b.labels());
        assert!((a.inertia() - b.inertia()).abs() < 1e-9);
    }

    #[test]
    fn test_too_many_clusters_rejected() {
        let data = sample_data();
        let mut kmeans = KMeans::new(10);
        assert!(matches!(
            kmeans.fit(&data),
            Err(AgruparError::InvalidHyperparameter { .. })
        ));
    }

    #[test]
    fn test_empty_data_rejected() {
        let empty = Matrix::from_vec(0, 2, vec![]).unwrap();
        let mut kmeans = KMeans::new(2);
        assert!(matches!(
            kmeans.fit(&empty),
            Err(AgruparError::InsufficientData { .. })
        ));
    }
}
