//! Dimensionality reduction for the sparse store×feature matrix.
//!
//! Principal Component Analysis over the normalized matrix. The requested
//! component count is clamped to `min(requested, n_features, n_stores)` so
//! small datasets reduce instead of erroring out.

use nalgebra::{DMatrix, SymmetricEigen};

use crate::error::{AgruparError, Result};
use crate::primitives::Matrix;
use crate::traits::Transformer;

/// Principal Component Analysis with a component-count clamp.
///
/// # Examples
///
/// ```
/// use agrupar::prelude::*;
/// use agrupar::reduce::Pca;
///
/// let data = Matrix::from_vec(4, 3, vec![
///     1.0, 2.0, 3.0,
///     4.0, 5.0, 6.0,
///     7.0, 8.0, 9.0,
///     10.0, 11.0, 12.0,
/// ]).unwrap();
///
/// // Requesting more components than features is fine: clamped to 3.
/// let mut pca = Pca::new(10);
/// let reduced = pca.fit_transform(&data).unwrap();
/// assert_eq!(reduced.shape(), (4, 3));
/// assert_eq!(pca.effective_components(), Some(3));
/// ```
#[derive(Debug, Clone)]
pub struct Pca {
    /// Requested number of components.
    n_components: usize,
    /// Component count actually used after clamping.
    effective_components: Option<usize>,
    /// Mean of each feature (computed during fit).
    mean: Option<Vec<f32>>,
    /// Principal components (eigenvectors), one per row.
    components: Option<Matrix<f32>>,
    /// Ratio of variance explained by each kept component.
    explained_variance_ratio: Option<Vec<f32>>,
}

impl Pca {
    /// Creates a new PCA reducer.
    #[must_use]
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            effective_components: None,
            mean: None,
            components: None,
            explained_variance_ratio: None,
        }
    }

    /// Component count actually used, once fitted.
    #[must_use]
    pub fn effective_components(&self) -> Option<usize> {
        self.effective_components
    }

    /// Ratio of variance explained by each kept component. Diagnostics only;
    /// the engine never gates on it.
    #[must_use]
    pub fn explained_variance_ratio(&self) -> Option<&[f32]> {
        self.explained_variance_ratio.as_deref()
    }

    /// Total fraction of variance captured by the kept components.
    #[must_use]
    pub fn total_explained_variance(&self) -> Option<f32> {
        self.explained_variance_ratio
            .as_ref()
            .map(|r| r.iter().sum())
    }

    /// Returns true if the reducer has been fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.components.is_some()
    }
}

impl Transformer for Pca {
    fn fit(&mut self, x: &Matrix<f32>) -> Result<()> {
        let (n_samples, n_features) = x.shape();
        if n_samples == 0 || n_features == 0 {
            return Err(AgruparError::InvalidHyperparameter {
                param: "data".to_string(),
                value: format!("{n_samples}x{n_features}"),
                constraint: "non-empty matrix".to_string(),
            });
        }

        let k = self.n_components.min(n_features).min(n_samples);
        if k < self.n_components {
            log::debug!(
                "PCA components clamped from {} to {k} (features={n_features}, stores={n_samples})",
                self.n_components
            );
        }

        // Feature means, then centered data.
        let mut mean = vec![0.0_f32; n_features];
        for i in 0..n_samples {
            for (j, m) in mean.iter_mut().enumerate() {
                *m += x.get(i, j);
            }
        }
        for m in &mut mean {
            *m /= n_samples as f32;
        }

        let mut centered = vec![0.0_f32; n_samples * n_features];
        for i in 0..n_samples {
            for j in 0..n_features {
                centered[i * n_features + j] = x.get(i, j) - mean[j];
            }
        }

        // Covariance: Σ = (Xᵀ X) / (n − 1)
        let denom = if n_samples > 1 { n_samples - 1 } else { 1 } as f32;
        let mut cov = vec![0.0_f32; n_features * n_features];
        for i in 0..n_features {
            for j in i..n_features {
                let mut sum = 0.0;
                for row in 0..n_samples {
                    sum += centered[row * n_features + i] * centered[row * n_features + j];
                }
                let value = sum / denom;
                cov[i * n_features + j] = value;
                cov[j * n_features + i] = value;
            }
        }

        let cov_matrix = DMatrix::from_row_slice(n_features, n_features, &cov);
        let eigen = SymmetricEigen::new(cov_matrix);
        let eigenvalues = eigen.eigenvalues;
        let eigenvectors = eigen.eigenvectors;

        // Sort components by descending eigenvalue.
        let mut indices: Vec<usize> = (0..n_features).collect();
        indices.sort_by(|&a, &b| {
            eigenvalues[b]
                .partial_cmp(&eigenvalues[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut components_data = vec![0.0_f32; k * n_features];
        let mut explained = vec![0.0_f32; k];
        for (i, &idx) in indices.iter().take(k).enumerate() {
            explained[i] = eigenvalues[idx].max(0.0);
            for j in 0..n_features {
                components_data[i * n_features + j] = eigenvectors[(j, idx)];
            }
        }

        let total: f32 = eigenvalues.iter().map(|v| v.max(0.0)).sum();
        let ratio: Vec<f32> = if total > 0.0 {
            explained.iter().map(|&v| v / total).collect()
        } else {
            vec![0.0; k]
        };

        self.effective_components = Some(k);
        self.mean = Some(mean);
        self.components = Some(Matrix::from_vec(k, n_features, components_data)?);
        self.explained_variance_ratio = Some(ratio);
        Ok(())
    }

    fn transform(&self, x: &Matrix<f32>) -> Result<Matrix<f32>> {
        let components = self
            .components
            .as_ref()
            .ok_or_else(|| AgruparError::from("PCA not fitted"))?;
        let mean = self
            .mean
            .as_ref()
            .ok_or_else(|| AgruparError::from("PCA not fitted"))?;

        let (n_samples, n_features) = x.shape();
        if n_features != mean.len() {
            return Err(AgruparError::DimensionMismatch {
                expected: format!("{} features", mean.len()),
                actual: format!("{n_features}"),
            });
        }

        let k = components.n_rows();
        let mut result = vec![0.0_f32; n_samples * k];
        for i in 0..n_samples {
            for c in 0..k {
                let mut value = 0.0;
                for j in 0..n_features {
                    value += (x.get(i, j) - mean[j]) * components.get(c, j);
                }
                result[i * k + c] = value;
            }
        }

        Matrix::from_vec(n_samples, k, result).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix<f32> {
        Matrix::from_vec(
            5,
            3,
            vec![
                1.0, 0.0, 0.1, //
                2.0, 0.1, 0.0, //
                3.0, 0.0, 0.1, //
                4.0, 0.1, 0.0, //
                5.0, 0.0, 0.1,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_fit_transform_shape() {
        let mut pca = Pca::new(2);
        let reduced = pca.fit_transform(&sample()).unwrap();
        assert_eq!(reduced.shape(), (5, 2));
        assert_eq!(pca.effective_components(), Some(2));
    }

    #[test]
    fn test_component_clamp_to_features() {
        let mut pca = Pca::new(50);
        let reduced = pca.fit_transform(&sample()).unwrap();
        assert_eq!(reduced.n_cols(), 3);
        assert_eq!(pca.effective_components(), Some(3));
    }

    #[test]
    fn test_component_clamp_to_samples() {
        let data = Matrix::from_vec(2, 4, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]).unwrap();
        let mut pca = Pca::new(4);
        let reduced = pca.fit_transform(&data).unwrap();
        assert_eq!(reduced.n_cols(), 2);
    }

    #[test]
    fn test_first_component_captures_dominant_axis() {
        let mut pca = Pca::new(3);
        pca.fit(&sample()).unwrap();
        let ratio = pca.explained_variance_ratio().unwrap();
        // Nearly all variance lives along the first feature.
        assert!(ratio[0] > 0.95, "ratio = {ratio:?}");
        assert!(pca.total_explained_variance().unwrap() <= 1.0 + 1e-4);
    }

    #[test]
    fn test_transform_before_fit_errors() {
        let pca = Pca::new(2);
        assert!(pca.transform(&sample()).is_err());
    }

    #[test]
    fn test_transform_wrong_width_errors() {
        let mut pca = Pca::new(2);
        pca.fit(&sample()).unwrap();
        let narrow = Matrix::from_vec(1, 2, vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            pca.transform(&narrow),
            Err(AgruparError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_matrix_rejected() {
        let mut pca = Pca::new(2);
        let empty = Matrix::from_vec(0, 0, vec![]).unwrap();
        assert!(pca.fit(&empty).is_err());
    }
}
