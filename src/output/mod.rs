//! Result persistence.
//!
//! Every table is written three ways: a timestamped immutable file, a
//! period-labeled stable-name copy, and a generic `latest` symlink (copy
//! where symlinks are unavailable). Downstream rule steps read the stable
//! names; history stays on disk. A JSON manifest registers each output key
//! with its row/column counts.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::profile::{ClusterProfile, QualityReport};
use crate::results::AssignmentTable;

/// Identity and metadata of one persisted table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Logical output key (`cluster_assignments`, `cluster_profiles`, ...).
    pub key: String,
    /// Data rows written.
    pub rows: usize,
    /// Columns written.
    pub columns: usize,
    /// Timestamped immutable file.
    pub path: PathBuf,
    /// Period-labeled stable-name copy.
    pub period_path: PathBuf,
    /// Generic stable-name link/copy.
    pub latest_path: PathBuf,
}

/// Writes clustering outputs in the dual-output layout.
///
/// # Examples
///
/// ```no_run
/// use agrupar::output::OutputWriter;
/// use agrupar::results::AssignmentTable;
///
/// let table = AssignmentTable::from_labels(&["S1".to_string()], &[0]).unwrap();
/// let mut writer = OutputWriter::new("out", "2026Q3");
/// writer.write_assignments(&table).unwrap();
/// writer.write_manifest().unwrap();
/// ```
#[derive(Debug)]
pub struct OutputWriter {
    dir: PathBuf,
    period: String,
    timestamp: String,
    registry: Vec<OutputRecord>,
}

impl OutputWriter {
    /// Creates a writer rooted at `dir` for the given reporting period
    /// label (e.g. `2026Q3`), stamped with the current UTC time.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, period: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            period: period.into(),
            timestamp: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
            registry: Vec::new(),
        }
    }

    /// Overrides the timestamp label (useful for reproducible layouts).
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Outputs registered so far.
    #[must_use]
    pub fn registry(&self) -> &[OutputRecord] {
        &self.registry
    }

    /// Persists the assignment table. The cluster label is written under
    /// both the legacy and canonical headers with identical values.
    ///
    /// # Errors
    ///
    /// Returns an error on any filesystem or CSV failure.
    pub fn write_assignments(&mut self, table: &AssignmentTable) -> Result<OutputRecord> {
        let header: Vec<String> = table.columns().to_vec();
        let rows: Vec<Vec<String>> = table
            .records()
            .iter()
            .map(|r| {
                let label = r
                    .cluster
                    .map(|c| c.to_string())
                    .unwrap_or_default();
                vec![r.store_id.clone(), label.clone(), label]
            })
            .collect();
        self.write_table("cluster_assignments", &header, &rows)
    }

    /// Persists cluster profiles: id, size, the pipe-joined top-feature
    /// list, then one mean column per feature.
    ///
    /// # Errors
    ///
    /// Returns an error on any filesystem or CSV failure.
    pub fn write_profiles(
        &mut self,
        profiles: &[ClusterProfile],
        feature_names: &[String],
    ) -> Result<OutputRecord> {
        let mut header = vec![
            "cluster_id".to_string(),
            "size".to_string(),
            "top_features".to_string(),
        ];
        header.extend(feature_names.iter().map(|n| format!("mean_{n}")));

        let rows: Vec<Vec<String>> = profiles
            .iter()
            .map(|p| {
                let top = p
                    .top_features
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect::<Vec<_>>()
                    .join("|");
                let mut row = vec![p.cluster_id.to_string(), p.size.to_string(), top];
                row.extend(p.feature_means.iter().map(|m| m.to_string()));
                row
            })
            .collect();
        self.write_table("cluster_profiles", &header, &rows)
    }

    /// Persists per-cluster quality metrics.
    ///
    /// # Errors
    ///
    /// Returns an error on any filesystem or CSV failure.
    pub fn write_metrics(&mut self, quality: &QualityReport) -> Result<OutputRecord> {
        let header = vec![
            "cluster_id".to_string(),
            "size".to_string(),
            "cohesion".to_string(),
            "separation".to_string(),
        ];
        let rows: Vec<Vec<String>> = quality
            .clusters
            .iter()
            .map(|c| {
                vec![
                    c.cluster_id.to_string(),
                    c.size.to_string(),
                    c.cohesion.to_string(),
                    c.separation.to_string(),
                ]
            })
            .collect();
        self.write_table("cluster_metrics", &header, &rows)
    }

    /// Writes the manifest of registered outputs, itself dual-named.
    ///
    /// # Errors
    ///
    /// Returns an error on serialization or filesystem failure.
    pub fn write_manifest(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let primary = self.dir.join(format!("manifest_{}.json", self.timestamp));
        let json = serde_json::to_string_pretty(&self.registry)?;
        fs::write(&primary, &json)?;
        let latest = self.dir.join("manifest_latest.json");
        link_or_copy(&primary, &latest)?;
        Ok(primary)
    }

    /// Dual-output CSV write: timestamped file, period copy, latest link.
    fn write_table(
        &mut self,
        key: &str,
        header: &[String],
        rows: &[Vec<String>],
    ) -> Result<OutputRecord> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{key}_{}.csv", self.timestamp));
        let period_path = self.dir.join(format!("{key}_{}.csv", self.period));
        let latest_path = self.dir.join(format!("{key}_latest.csv"));

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(header)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;

        fs::copy(&path, &period_path)?;
        link_or_copy(&path, &latest_path)?;

        let record = OutputRecord {
            key: key.to_string(),
            rows: rows.len(),
            columns: header.len(),
            path,
            period_path,
            latest_path,
        };
        log::info!(
            "wrote {key}: {} row(s) x {} column(s) -> {}",
            record.rows,
            record.columns,
            record.path.display()
        );
        self.registry.push(record.clone());
        Ok(record)
    }
}

/// Points `link` at `target` as a relative symlink, replacing any existing
/// file; falls back to a plain copy where symlinks aren't supported.
fn link_or_copy(target: &Path, link: &Path) -> Result<()> {
    if link.symlink_metadata().is_ok() {
        fs::remove_file(link)?;
    }
    let target_name = target
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| target.to_path_buf());

    #[cfg(unix)]
    {
        if std::os::unix::fs::symlink(&target_name, link).is_ok() {
            return Ok(());
        }
    }
    let _ = target_name;
    fs::copy(target, link)?;
    Ok(())
}
