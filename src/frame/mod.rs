//! Store-indexed feature table.
//!
//! A [`StoreFrame`] is the engine's view of one store×feature matrix: an
//! ordered list of store ids, an ordered list of feature names, and the
//! backing numeric matrix. Rows are kept sorted by store id so every
//! distance tie downstream breaks in store-id order.

use std::collections::HashMap;

use crate::error::{AgruparError, Result};
use crate::primitives::{Matrix, Vector};

/// A numeric table keyed by store identifier.
///
/// # Examples
///
/// ```
/// use agrupar::frame::StoreFrame;
/// use agrupar::primitives::Matrix;
///
/// let m = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// let frame = StoreFrame::new(
///     vec!["S002".into(), "S001".into()],
///     vec!["shoes".into(), "coats".into()],
///     m,
/// ).unwrap();
/// // Rows are re-sorted by store id.
/// assert_eq!(frame.store_ids(), &["S001".to_string(), "S002".to_string()]);
/// assert_eq!(frame.values().row_slice(0), &[3.0, 4.0]);
/// ```
#[derive(Debug, Clone)]
pub struct StoreFrame {
    store_ids: Vec<String>,
    feature_names: Vec<String>,
    values: Matrix<f32>,
    positions: HashMap<String, usize>,
}

impl StoreFrame {
    /// Builds a frame, sorting rows by store id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id count doesn't match the matrix rows, the
    /// feature count doesn't match the matrix columns, or an id repeats.
    pub fn new(
        store_ids: Vec<String>,
        feature_names: Vec<String>,
        values: Matrix<f32>,
    ) -> Result<Self> {
        let (rows, cols) = values.shape();
        if store_ids.len() != rows {
            return Err(AgruparError::DimensionMismatch {
                expected: format!("{rows} store ids"),
                actual: format!("{}", store_ids.len()),
            });
        }
        if feature_names.len() != cols {
            return Err(AgruparError::DimensionMismatch {
                expected: format!("{cols} feature names"),
                actual: format!("{}", feature_names.len()),
            });
        }

        let mut order: Vec<usize> = (0..rows).collect();
        order.sort_by(|&a, &b| store_ids[a].cmp(&store_ids[b]));
        let values = values.select_rows(&order);
        let store_ids: Vec<String> = order.iter().map(|&i| store_ids[i].clone()).collect();

        let mut positions = HashMap::with_capacity(rows);
        for (i, id) in store_ids.iter().enumerate() {
            if positions.insert(id.clone(), i).is_some() {
                return Err(AgruparError::StructuralMismatch {
                    message: format!("duplicate store id: {id}"),
                });
            }
        }

        Ok(Self {
            store_ids,
            feature_names,
            values,
            positions,
        })
    }

    /// Returns (stores, features).
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    /// Number of stores (rows).
    #[must_use]
    pub fn n_stores(&self) -> usize {
        self.values.n_rows()
    }

    /// Number of features (columns).
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.values.n_cols()
    }

    /// Store ids in row order (sorted ascending).
    #[must_use]
    pub fn store_ids(&self) -> &[String] {
        &self.store_ids
    }

    /// Feature names in column order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Row index of a store id, if present.
    #[must_use]
    pub fn position(&self, store_id: &str) -> Option<usize> {
        self.positions.get(store_id).copied()
    }

    /// The backing matrix.
    #[must_use]
    pub fn values(&self) -> &Matrix<f32> {
        &self.values
    }

    /// One store's feature row.
    #[must_use]
    pub fn store_row(&self, row_idx: usize) -> Vector<f32> {
        self.values.row(row_idx)
    }

    /// Restricts the frame to the given store ids (ids not present are
    /// ignored). Row order stays sorted by id.
    #[must_use]
    pub fn restrict_to(&self, ids: &[String]) -> Self {
        let mut keep: Vec<usize> = ids.iter().filter_map(|id| self.position(id)).collect();
        keep.sort_unstable();
        keep.dedup();

        let store_ids: Vec<String> = keep.iter().map(|&i| self.store_ids[i].clone()).collect();
        let values = self.values.select_rows(&keep);
        let mut positions = HashMap::with_capacity(store_ids.len());
        for (i, id) in store_ids.iter().enumerate() {
            positions.insert(id.clone(), i);
        }
        Self {
            store_ids,
            feature_names: self.feature_names.clone(),
            values,
            positions,
        }
    }

    /// Per-feature mean over a set of row indices.
    #[must_use]
    pub fn feature_means_over(&self, rows: &[usize]) -> Vector<f32> {
        self.values.mean_of_rows(rows)
    }
}
