//! Size balancing: turns an unconstrained partition into one where every
//! cluster's size lies inside configured bounds.
//!
//! The balancer moves individual stores between clusters rather than
//! re-clustering from scratch. Size correctness is the hard constraint;
//! silhouette is tracked before/after purely as a diagnostic. At most one
//! undersized "remainder" cluster is tolerated, and only when the store
//! count does not divide evenly by the target size.

use crate::error::{AgruparError, Result};
use crate::metrics::{centroids_and_sizes, silhouette_score};
use crate::primitives::Matrix;

/// Cluster size constraints.
///
/// # Examples
///
/// ```
/// use agrupar::cluster::SizeBounds;
///
/// let bounds = SizeBounds::default();
/// assert_eq!((bounds.min_size, bounds.target_size, bounds.max_size), (30, 50, 60));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBounds {
    /// Smallest acceptable cluster.
    pub min_size: usize,
    /// Largest acceptable cluster.
    pub max_size: usize,
    /// Preferred cluster size; drives the initial cluster count.
    pub target_size: usize,
}

impl Default for SizeBounds {
    fn default() -> Self {
        Self {
            min_size: 30,
            max_size: 60,
            target_size: 50,
        }
    }
}

impl SizeBounds {
    /// Creates validated bounds.
    ///
    /// # Errors
    ///
    /// Returns an error unless `0 < min <= target <= max`.
    pub fn new(min_size: usize, target_size: usize, max_size: usize) -> Result<Self> {
        if min_size == 0 || min_size > target_size || target_size > max_size {
            return Err(AgruparError::InvalidHyperparameter {
                param: "size_bounds".to_string(),
                value: format!("[{min_size}, {target_size}, {max_size}]"),
                constraint: "0 < min <= target <= max".to_string(),
            });
        }
        Ok(Self {
            min_size,
            max_size,
            target_size,
        })
    }

    /// How many undersized clusters are tolerated for `n_stores` stores:
    /// one remainder cluster when the count doesn't divide evenly by the
    /// target, zero otherwise.
    #[must_use]
    pub fn remainder_allowance(&self, n_stores: usize) -> usize {
        usize::from(n_stores % self.target_size != 0)
    }
}

/// Result of a balancing run.
#[derive(Debug, Clone)]
pub struct BalanceOutcome {
    /// Final labels, re-densified to `0..k`.
    pub labels: Vec<usize>,
    /// Iterations executed.
    pub iterations: usize,
    /// Whether every bound held when the loop stopped.
    pub converged: bool,
    /// Store moves performed in total.
    pub moves: usize,
    /// Silhouette of the input partition (diagnostic only).
    pub silhouette_before: f32,
    /// Silhouette of the balanced partition (diagnostic only).
    pub silhouette_after: f32,
}

/// Iterative size balancer.
///
/// Deterministic: identical data and labels produce identical output. All
/// distance ties break by row index, which the loader guarantees equals
/// store-id order.
#[derive(Debug, Clone)]
pub struct SizeBalancer {
    bounds: SizeBounds,
    max_iterations: usize,
}

impl SizeBalancer {
    /// Creates a balancer for the given bounds.
    #[must_use]
    pub fn new(bounds: SizeBounds) -> Self {
        Self {
            bounds,
            max_iterations: 100,
        }
    }

    /// Sets the iteration cap.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Balances the partition described by `labels` over `data`.
    ///
    /// Hitting the iteration cap is not an error: the outcome reports
    /// `converged = false` and validation catches any real violation later.
    ///
    /// # Errors
    ///
    /// Returns an error if `labels` doesn't cover every row of `data` or
    /// names no clusters.
    pub fn balance(&self, data: &Matrix<f32>, labels: &[usize]) -> Result<BalanceOutcome> {
        let n_stores = data.n_rows();
        if labels.len() != n_stores {
            return Err(AgruparError::DimensionMismatch {
                expected: format!("{n_stores} labels"),
                actual: format!("{}", labels.len()),
            });
        }
        if n_stores == 0 {
            return Err(AgruparError::InsufficientData {
                n_stores: 0,
                min_required: 1,
            });
        }

        let silhouette_before = silhouette_score(data, labels);
        let allowance = self.bounds.remainder_allowance(n_stores);

        let k = labels.iter().max().map_or(0, |&m| m + 1);
        let (centroids, sizes) = centroids_and_sizes(data, labels, k);
        let mut state = BalanceState {
            data,
            labels: labels.to_vec(),
            centroids,
            sizes,
            moves: 0,
        };

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            iterations += 1;

            let mut changed = state.shed_oversized(&self.bounds);
            changed |= state.fill_undersized(&self.bounds, allowance);

            if state.bounds_satisfied(&self.bounds, allowance) {
                converged = true;
                break;
            }
            if iterations % 10 == 0 {
                log::debug!(
                    "balance iteration {iterations}: active sizes {:?}",
                    state.active_sizes()
                );
            }
            if !changed {
                // No legal move remains; spinning further cannot help.
                break;
            }
        }

        if !converged {
            log::warn!(
                "size balancing stopped after {iterations} iteration(s) without satisfying bounds; active sizes {:?}",
                state.active_sizes()
            );
        }

        let labels = state.densify_labels();
        let silhouette_after = silhouette_score(data, &labels);
        log::debug!(
            "balance finished: {} moves, silhouette {silhouette_before:.3} -> {silhouette_after:.3}",
            state.moves
        );

        Ok(BalanceOutcome {
            labels,
            iterations,
            converged,
            moves: state.moves,
            silhouette_before,
            silhouette_after,
        })
    }
}

/// Mutable balancing state: an explicit label arena plus incrementally
/// maintained centroids and sizes. Clusters that reach size zero simply
/// become inactive.
struct BalanceState<'a> {
    data: &'a Matrix<f32>,
    labels: Vec<usize>,
    centroids: Matrix<f32>,
    sizes: Vec<usize>,
    moves: usize,
}

impl BalanceState<'_> {
    fn k(&self) -> usize {
        self.sizes.len()
    }

    fn active_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.sizes.iter().copied().filter(|&s| s > 0).collect();
        sizes.sort_unstable();
        sizes
    }

    /// Rows currently assigned to `cluster`, ascending.
    fn members_of(&self, cluster: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| label == cluster)
            .map(|(row, _)| row)
            .collect()
    }

    fn distance_to_centroid(&self, row: usize, cluster: usize) -> f32 {
        self.data.row_distance_squared(row, &self.centroids, cluster)
    }

    /// Moves one store, updating sizes and running-mean centroids.
    fn move_store(&mut self, row: usize, from: usize, to: usize) {
        debug_assert_eq!(self.labels[row], from);
        let n_features = self.data.n_cols();

        let old_from = self.sizes[from] as f32;
        let old_to = self.sizes[to] as f32;
        for j in 0..n_features {
            let x = self.data.get(row, j);
            let from_value = if self.sizes[from] > 1 {
                (self.centroids.get(from, j) * old_from - x) / (old_from - 1.0)
            } else {
                0.0
            };
            self.centroids.set(from, j, from_value);
            let to_value = (self.centroids.get(to, j) * old_to + x) / (old_to + 1.0);
            self.centroids.set(to, j, to_value);
        }

        self.labels[row] = to;
        self.sizes[from] -= 1;
        self.sizes[to] += 1;
        self.moves += 1;
    }

    /// Nearest active cluster to `row` other than `exclude`, restricted to
    /// clusters whose size is below `size_below` (pass `usize::MAX` for no
    /// restriction). Lowest id wins distance ties.
    fn nearest_cluster(&self, row: usize, exclude: usize, size_below: usize) -> Option<usize> {
        let mut best: Option<(f32, usize)> = None;
        for c in 0..self.k() {
            if c == exclude || self.sizes[c] == 0 || self.sizes[c] >= size_below {
                continue;
            }
            let d = self.distance_to_centroid(row, c);
            let better = best.map_or(true, |(bd, _)| d < bd);
            if better {
                best = Some((d, c));
            }
        }
        best.map(|(_, c)| c)
    }

    /// Phase 1: every oversized cluster sheds its farthest members to their
    /// nearest non-full cluster.
    fn shed_oversized(&mut self, bounds: &SizeBounds) -> bool {
        let mut changed = false;
        for c in 0..self.k() {
            if self.sizes[c] <= bounds.max_size {
                continue;
            }
            let mut members = self.members_of(c);
            // Farthest first; row order (= store-id order) breaks ties.
            members.sort_by(|&a, &b| {
                let da = self.distance_to_centroid(a, c);
                let db = self.distance_to_centroid(b, c);
                db.partial_cmp(&da)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(&b))
            });

            let excess = self.sizes[c] - bounds.max_size;
            for &row in members.iter().take(excess) {
                if let Some(dest) = self.nearest_cluster(row, c, bounds.max_size) {
                    self.move_store(row, c, dest);
                    changed = true;
                }
            }
        }
        changed
    }

    /// Phase 2: fill undersized clusters from the largest donors, sparing
    /// the single elected remainder; merge away what cannot be filled.
    fn fill_undersized(&mut self, bounds: &SizeBounds, allowance: usize) -> bool {
        let mut changed = false;

        let mut undersized: Vec<usize> = (0..self.k())
            .filter(|&c| self.sizes[c] > 0 && self.sizes[c] < bounds.min_size)
            .collect();
        // Smallest first; the elected remainder is the smallest one.
        undersized.sort_by_key(|&c| (self.sizes[c], c));

        for &c in undersized.iter().skip(allowance) {
            while self.sizes[c] < bounds.min_size {
                let Some(donor) = self.largest_donor(c, bounds) else {
                    break;
                };
                let Some(row) = self.nearest_member(donor, c) else {
                    break;
                };
                self.move_store(row, donor, c);
                changed = true;
            }

            if self.sizes[c] < bounds.min_size {
                changed |= self.merge_away(c, bounds);
            }
        }
        changed
    }

    /// Largest cluster with slack above the minimum, excluding `target`.
    /// Lowest id wins size ties.
    fn largest_donor(&self, target: usize, bounds: &SizeBounds) -> Option<usize> {
        (0..self.k())
            .filter(|&c| c != target && self.sizes[c] > bounds.min_size)
            .max_by_key(|&c| (self.sizes[c], std::cmp::Reverse(c)))
    }

    /// Donor member nearest to `target`'s centroid; row order breaks ties.
    fn nearest_member(&self, donor: usize, target: usize) -> Option<usize> {
        self.members_of(donor).into_iter().min_by(|&a, &b| {
            let da = self.distance_to_centroid(a, target);
            let db = self.distance_to_centroid(b, target);
            da.partial_cmp(&db)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        })
    }

    /// Dissolves an unfillable cluster, sending each member to its nearest
    /// other cluster (preferring non-full destinations).
    fn merge_away(&mut self, cluster: usize, bounds: &SizeBounds) -> bool {
        let members = self.members_of(cluster);
        if members.is_empty() {
            return false;
        }
        log::debug!(
            "merging away unfillable cluster {cluster} ({} member(s))",
            members.len()
        );
        for row in members {
            let dest = self
                .nearest_cluster(row, cluster, bounds.max_size)
                .or_else(|| self.nearest_cluster(row, cluster, usize::MAX));
            if let Some(dest) = dest {
                self.move_store(row, cluster, dest);
            }
        }
        true
    }

    fn bounds_satisfied(&self, bounds: &SizeBounds, allowance: usize) -> bool {
        let oversized = self.sizes.iter().any(|&s| s > bounds.max_size);
        let undersized = self
            .sizes
            .iter()
            .filter(|&&s| s > 0 && s < bounds.min_size)
            .count();
        !oversized && undersized <= allowance
    }

    /// Maps surviving cluster ids onto `0..k` in ascending id order.
    fn densify_labels(&self) -> Vec<usize> {
        let mut remap = vec![usize::MAX; self.k()];
        let mut next = 0;
        for c in 0..self.k() {
            if self.sizes[c] > 0 {
                remap[c] = next;
                next += 1;
            }
        }
        self.labels.iter().map(|&label| remap[label]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `n` points per blob at the given 2D centers, with a small
    /// deterministic jitter so distances are distinct.
    fn blobs(centers: &[(f32, f32)], n: usize) -> Matrix<f32> {
        let mut data = Vec::new();
        for (b, &(cx, cy)) in centers.iter().enumerate() {
            for i in 0..n {
                let jitter = (i as f32 * 0.013 + b as f32 * 0.007) % 0.5;
                data.push(cx + jitter);
                data.push(cy - jitter * 0.5);
            }
        }
        Matrix::from_vec(centers.len() * n, 2, data).unwrap()
    }

    fn size_histogram(labels: &[usize]) -> Vec<usize> {
        let k = labels.iter().max().map_or(0, |&m| m + 1);
        let mut sizes = vec![0usize; k];
        for &label in labels {
            sizes[label] += 1;
        }
        sizes
    }

    #[test]
    fn test_bounds_validation() {
        assert!(SizeBounds::new(30, 50, 60).is_ok());
        assert!(SizeBounds::new(50, 30, 60).is_err());
        assert!(SizeBounds::new(0, 5, 10).is_err());
        assert!(SizeBounds::new(5, 20, 10).is_err());
    }

    #[test]
    fn test_remainder_allowance() {
        let bounds = SizeBounds::default();
        assert_eq!(bounds.remainder_allowance(500), 0);
        assert_eq!(bounds.remainder_allowance(513), 1);
    }

    #[test]
    fn test_oversized_cluster_is_shed() {
        // 24 stores, nearly all piled into cluster 0, bounds [4, 8].
        let data = blobs(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)], 8);
        let mut labels = vec![0; 24];
        // Two seeded destinations so total capacity (3 * 8) covers n.
        labels[22] = 1;
        labels[23] = 2;

        let bounds = SizeBounds::new(4, 8, 8).unwrap();
        let outcome = SizeBalancer::new(bounds).balance(&data, &labels).unwrap();
        let sizes = size_histogram(&outcome.labels);
        assert!(sizes.iter().all(|&s| s <= 8), "sizes = {sizes:?}");
        assert!(outcome.converged);
        assert_eq!(outcome.labels.len(), 24);
    }

    #[test]
    fn test_undersized_cluster_filled_from_donor() {
        // 20 stores in two blobs; cluster 1 starts with just 2 members.
        let data = blobs(&[(0.0, 0.0), (10.0, 0.0)], 10);
        let mut labels = vec![0; 20];
        labels[18] = 1;
        labels[19] = 1;

        // Divisible case: no remainder tolerated, so cluster 1 must be
        // filled to 5 or merged.
        let bounds = SizeBounds::new(5, 10, 15).unwrap();
        let outcome = SizeBalancer::new(bounds).balance(&data, &labels).unwrap();
        let sizes = size_histogram(&outcome.labels);
        assert!(
            sizes.iter().all(|&s| s == 0 || (5..=15).contains(&s)),
            "sizes = {sizes:?}"
        );
        assert!(outcome.converged);
    }

    #[test]
    fn test_single_remainder_tolerated() {
        // 23 stores, target 10: 23 % 10 != 0, one undersized allowed.
        let data = blobs(&[(0.0, 0.0)], 23);
        let mut labels = vec![0; 23];
        for row in 10..20 {
            labels[row] = 1;
        }
        for row in 20..23 {
            labels[row] = 2;
        }

        let bounds = SizeBounds::new(8, 10, 12).unwrap();
        let outcome = SizeBalancer::new(bounds).balance(&data, &labels).unwrap();
        let sizes = size_histogram(&outcome.labels);
        let undersized = sizes.iter().filter(|&&s| s > 0 && s < 8).count();
        assert!(undersized <= 1, "sizes = {sizes:?}");
        assert!(outcome.converged, "sizes = {sizes:?}");
    }

    #[test]
    fn test_empty_cluster_dropped_and_labels_dense() {
        let data = blobs(&[(0.0, 0.0), (10.0, 0.0)], 6);
        // Label 2 is never used: a hole in the id space.
        let labels = vec![0, 0, 0, 0, 0, 0, 3, 3, 3, 3, 3, 3];
        let bounds = SizeBounds::new(3, 6, 9).unwrap();
        let outcome = SizeBalancer::new(bounds).balance(&data, &labels).unwrap();

        let k = outcome.labels.iter().max().unwrap() + 1;
        let sizes = size_histogram(&outcome.labels);
        assert_eq!(sizes.len(), k);
        assert!(sizes.iter().all(|&s| s > 0), "dense labels expected");
    }

    #[test]
    fn test_deterministic_run_twice() {
        let data = blobs(&[(0.0, 0.0), (8.0, 1.0), (4.0, 7.0)], 15);
        let labels: Vec<usize> = (0..45).map(|i| i % 3).collect();
        let bounds = SizeBounds::new(10, 15, 20).unwrap();
        let balancer = SizeBalancer::new(bounds);

        let a = balancer.balance(&data, &labels).unwrap();
        let b = balancer.balance(&data, &labels).unwrap();
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.moves, b.moves);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn test_totality_preserved() {
        let data = blobs(&[(0.0, 0.0), (10.0, 10.0)], 12);
        let labels: Vec<usize> = (0..24).map(|i| i % 2).collect();
        let bounds = SizeBounds::new(8, 12, 16).unwrap();
        let outcome = SizeBalancer::new(bounds).balance(&data, &labels).unwrap();
        assert_eq!(outcome.labels.len(), 24);
    }

    #[test]
    fn test_silhouette_tracked() {
        let data = blobs(&[(0.0, 0.0), (10.0, 10.0)], 10);
        let labels: Vec<usize> = (0..20).map(|i| usize::from(i >= 10)).collect();
        let bounds = SizeBounds::new(5, 10, 15).unwrap();
        let outcome = SizeBalancer::new(bounds).balance(&data, &labels).unwrap();
        // Already balanced and well-separated: silhouette survives.
        assert!(outcome.silhouette_before > 0.5);
        assert!(outcome.silhouette_after > 0.5);
    }

    #[test]
    fn test_label_length_mismatch_rejected() {
        let data = blobs(&[(0.0, 0.0)], 4);
        let balancer = SizeBalancer::new(SizeBounds::default());
        assert!(balancer.balance(&data, &[0, 0]).is_err());
    }

    #[test]
    fn test_iteration_cap_reported() {
        // One store per cluster with min 2: unfixable within a single
        // cluster, must stop without converging or crash.
        let data = blobs(&[(0.0, 0.0)], 3);
        let labels = vec![0, 0, 0];
        let bounds = SizeBounds::new(2, 2, 2).unwrap();
        let outcome = SizeBalancer::new(bounds)
            .with_max_iterations(5)
            .balance(&data, &labels)
            .unwrap();
        assert!(!outcome.converged);
        assert!(outcome.iterations <= 5);
    }
}
