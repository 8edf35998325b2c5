//! Clustering quality metrics.
//!
//! Computed once, after all regrouping is finalized; reporting and
//! validation read them, the partitioning stages never do.

use crate::primitives::Matrix;

/// Number of clusters implied by a label vector (max label + 1).
#[must_use]
pub fn n_clusters(labels: &[usize]) -> usize {
    labels.iter().max().map_or(0, |&m| m + 1)
}

/// Within-cluster sum of squared distances to the centroid.
///
/// # Examples
///
/// ```
/// use agrupar::metrics::inertia;
/// use agrupar::primitives::Matrix;
///
/// let data = Matrix::from_vec(2, 1, vec![0.0, 2.0]).unwrap();
/// let centroids = Matrix::from_vec(1, 1, vec![1.0]).unwrap();
/// assert!((inertia(&data, &centroids, &[0, 0]) - 2.0).abs() < 1e-6);
/// ```
#[must_use]
pub fn inertia(data: &Matrix<f32>, centroids: &Matrix<f32>, labels: &[usize]) -> f32 {
    labels
        .iter()
        .enumerate()
        .map(|(i, &label)| data.row_distance_squared(i, centroids, label))
        .sum()
}

/// Mean silhouette coefficient over all samples, in [-1, 1].
///
/// s(i) = (b(i) − a(i)) / max(a(i), b(i)), with a(i) the mean distance to
/// the point's own cluster and b(i) the smallest mean distance to another
/// cluster. Singleton-cluster members score 0. Implemented as a single
/// pass over point pairs so large store counts stay tractable.
#[must_use]
pub fn silhouette_score(data: &Matrix<f32>, labels: &[usize]) -> f32 {
    let n_samples = data.n_rows();
    if n_samples < 2 {
        return 0.0;
    }
    let k = n_clusters(labels);
    if k < 2 {
        return 0.0;
    }

    let mut sizes = vec![0usize; k];
    for &label in labels {
        sizes[label] += 1;
    }

    // dist_sums[i][c] = total distance from point i to cluster c's members.
    let mut dist_sums = vec![0.0_f64; n_samples * k];
    for i in 0..n_samples {
        for j in (i + 1)..n_samples {
            let d = f64::from(data.row_distance_squared(i, data, j).sqrt());
            dist_sums[i * k + labels[j]] += d;
            dist_sums[j * k + labels[i]] += d;
        }
    }

    let mut total = 0.0_f64;
    for (i, &own) in labels.iter().enumerate() {
        if sizes[own] <= 1 {
            continue; // singleton scores 0
        }
        let a = dist_sums[i * k + own] / (sizes[own] - 1) as f64;
        let mut b = f64::INFINITY;
        for c in 0..k {
            if c != own && sizes[c] > 0 {
                b = b.min(dist_sums[i * k + c] / sizes[c] as f64);
            }
        }
        if b.is_finite() {
            let max_ab = a.max(b);
            if max_ab > 0.0 {
                total += (b - a) / max_ab;
            }
        }
    }

    (total / n_samples as f64) as f32
}

/// Davies–Bouldin index: mean over clusters of the worst
/// (scatter_i + scatter_j) / centroid-distance ratio. Lower is better.
#[must_use]
pub fn davies_bouldin_score(data: &Matrix<f32>, labels: &[usize]) -> f32 {
    let k = n_clusters(labels);
    let (centroids, sizes) = centroids_and_sizes(data, labels, k);
    let active: Vec<usize> = (0..k).filter(|&c| sizes[c] > 0).collect();
    if active.len() < 2 {
        return 0.0;
    }

    // Mean distance of members to their centroid.
    let mut scatter = vec![0.0_f64; k];
    for (i, &label) in labels.iter().enumerate() {
        scatter[label] += f64::from(data.row_distance_squared(i, &centroids, label).sqrt());
    }
    for &c in &active {
        scatter[c] /= sizes[c] as f64;
    }

    let mut total = 0.0_f64;
    for &ci in &active {
        let mut worst = 0.0_f64;
        for &cj in &active {
            if ci == cj {
                continue;
            }
            let sep = f64::from(centroids.row_distance_squared(ci, &centroids, cj).sqrt());
            if sep > 0.0 {
                worst = worst.max((scatter[ci] + scatter[cj]) / sep);
            }
        }
        total += worst;
    }
    (total / active.len() as f64) as f32
}

/// Calinski–Harabasz index: between-cluster over within-cluster dispersion.
/// Higher is better.
#[must_use]
pub fn calinski_harabasz_score(data: &Matrix<f32>, labels: &[usize]) -> f32 {
    let n_samples = data.n_rows();
    let k = n_clusters(labels);
    let (centroids, sizes) = centroids_and_sizes(data, labels, k);
    let active = sizes.iter().filter(|&&s| s > 0).count();
    if active < 2 || n_samples <= active {
        return 0.0;
    }

    let all_rows: Vec<usize> = (0..n_samples).collect();
    let grand_mean = data.mean_of_rows(&all_rows);
    let grand = Matrix::from_vec(1, data.n_cols(), grand_mean.as_slice().to_vec())
        .unwrap_or_else(|_| Matrix::zeros(1, data.n_cols()));

    let mut between = 0.0_f64;
    for c in 0..k {
        if sizes[c] > 0 {
            between +=
                sizes[c] as f64 * f64::from(centroids.row_distance_squared(c, &grand, 0));
        }
    }
    let within: f64 = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| f64::from(data.row_distance_squared(i, &centroids, label)))
        .sum();

    if within <= 0.0 {
        return 0.0;
    }
    ((between / (active - 1) as f64) / (within / (n_samples - active) as f64)) as f32
}

/// Per-cluster centroid matrix plus member counts. Empty clusters keep a
/// zero centroid and size 0.
#[must_use]
pub fn centroids_and_sizes(
    data: &Matrix<f32>,
    labels: &[usize],
    k: usize,
) -> (Matrix<f32>, Vec<usize>) {
    let n_features = data.n_cols();
    let mut centroids = Matrix::zeros(k, n_features);
    let mut sizes = vec![0usize; k];

    for (i, &label) in labels.iter().enumerate() {
        sizes[label] += 1;
        for j in 0..n_features {
            centroids.set(label, j, centroids.get(label, j) + data.get(i, j));
        }
    }
    for c in 0..k {
        if sizes[c] > 0 {
            for j in 0..n_features {
                centroids.set(c, j, centroids.get(c, j) / sizes[c] as f32);
            }
        }
    }
    (centroids, sizes)
}
