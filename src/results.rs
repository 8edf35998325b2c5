//! The clustering results table consumed by downstream merchandising rules.
//!
//! The cluster label is carried under two headers with identical values:
//! the legacy `cluster` name older rule steps still read, and the
//! canonical `cluster_id` name. Both are resolved here, once, as constants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AgruparError, Result};

/// Store-identifier column header.
pub const STORE_ID_COLUMN: &str = "store_id";
/// Legacy cluster-label header kept for downstream compatibility.
pub const LEGACY_CLUSTER_COLUMN: &str = "cluster";
/// Canonical cluster-label header.
pub const CANONICAL_CLUSTER_COLUMN: &str = "cluster_id";

/// One store's final assignment. `cluster` is `None` only in degenerate
/// tables; validation rejects those.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreAssignment {
    /// Store identifier.
    pub store_id: String,
    /// Assigned cluster, if any.
    pub cluster: Option<usize>,
}

/// One row per store, the principal artifact of a clustering run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentTable {
    records: Vec<StoreAssignment>,
    columns: Vec<String>,
}

impl AssignmentTable {
    /// Builds a complete table from parallel id/label slices.
    ///
    /// # Errors
    ///
    /// Returns an error if the slices differ in length.
    pub fn from_labels(store_ids: &[String], labels: &[usize]) -> Result<Self> {
        if store_ids.len() != labels.len() {
            return Err(AgruparError::DimensionMismatch {
                expected: format!("{} labels", store_ids.len()),
                actual: format!("{}", labels.len()),
            });
        }
        let records = store_ids
            .iter()
            .zip(labels)
            .map(|(id, &cluster)| StoreAssignment {
                store_id: id.clone(),
                cluster: Some(cluster),
            })
            .collect();
        Ok(Self {
            records,
            columns: Self::standard_columns(),
        })
    }

    /// Builds a table with explicit records and columns. Intended for
    /// degenerate-input construction in validation tests.
    #[must_use]
    pub fn from_parts(records: Vec<StoreAssignment>, columns: Vec<String>) -> Self {
        Self { records, columns }
    }

    /// The canonical column layout every persisted table carries.
    #[must_use]
    pub fn standard_columns() -> Vec<String> {
        vec![
            STORE_ID_COLUMN.to_string(),
            LEGACY_CLUSTER_COLUMN.to_string(),
            CANONICAL_CLUSTER_COLUMN.to_string(),
        ]
    }

    /// The table's rows.
    #[must_use]
    pub fn records(&self) -> &[StoreAssignment] {
        &self.records
    }

    /// Column headers the persisted table will carry.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// True when the named column is present.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Number of stores.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no stores are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Member count per cluster, ascending by id. Null assignments are not
    /// counted.
    #[must_use]
    pub fn cluster_sizes(&self) -> BTreeMap<usize, usize> {
        let mut sizes = BTreeMap::new();
        for record in &self.records {
            if let Some(cluster) = record.cluster {
                *sizes.entry(cluster).or_insert(0) += 1;
            }
        }
        sizes
    }

    /// Number of distinct clusters.
    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.cluster_sizes().len()
    }

    /// Labels in record order; `None` entries surface as missing.
    #[must_use]
    pub fn labels(&self) -> Vec<Option<usize>> {
        self.records.iter().map(|r| r.cluster).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_labels_total() {
        let ids = vec!["S1".to_string(), "S2".to_string(), "S3".to_string()];
        let table = AssignmentTable::from_labels(&ids, &[0, 1, 0]).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.records().iter().all(|r| r.cluster.is_some()));
    }

    #[test]
    fn test_from_labels_length_mismatch_rejected() {
        let ids = vec!["S1".to_string(), "S2".to_string()];
        let err = AssignmentTable::from_labels(&ids, &[0]).unwrap_err();
        assert!(matches!(err, AgruparError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_both_label_columns_present() {
        let table = AssignmentTable::from_labels(&["S1".to_string()], &[0]).unwrap();
        assert!(table.has_column(LEGACY_CLUSTER_COLUMN));
        assert!(table.has_column(CANONICAL_CLUSTER_COLUMN));
        assert!(table.has_column(STORE_ID_COLUMN));
    }

    #[test]
    fn test_cluster_sizes() {
        let ids: Vec<String> = (0..5).map(|i| format!("S{i}")).collect();
        let table = AssignmentTable::from_labels(&ids, &[0, 0, 1, 1, 1]).unwrap();
        let sizes = table.cluster_sizes();
        assert_eq!(sizes.get(&0), Some(&2));
        assert_eq!(sizes.get(&1), Some(&3));
        assert_eq!(table.n_clusters(), 2);
    }

    #[test]
    fn test_null_cluster_not_counted() {
        let records = vec![
            StoreAssignment {
                store_id: "S1".into(),
                cluster: Some(0),
            },
            StoreAssignment {
                store_id: "S2".into(),
                cluster: None,
            },
        ];
        let table = AssignmentTable::from_parts(records, AssignmentTable::standard_columns());
        assert_eq!(table.cluster_sizes().values().sum::<usize>(), 1);
    }
}
