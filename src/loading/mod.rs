//! Input loading for the clustering engine.
//!
//! Reads the normalized and original store×feature matrices (CSV, one row
//! per store, first column the store id) plus the optional per-store
//! temperature-band table. All column aliasing is resolved here, once, so
//! downstream code sees a single canonical schema.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{AgruparError, Result};
use crate::frame::StoreFrame;
use crate::primitives::Matrix;

/// Accepted store-identifier headers in the temperature table, checked in
/// order. The first match wins.
pub const STORE_ID_ALIASES: [&str; 2] = ["store_id", "store_code"];

/// Header of the temperature-band column.
pub const TEMPERATURE_BAND_COLUMN: &str = "temperature_band";

/// Everything one clustering run consumes.
#[derive(Debug, Clone)]
pub struct LoadedInputs {
    /// Row-scaled matrix used for the clustering math.
    pub normalized: StoreFrame,
    /// Raw matrix used for profiling and reporting.
    pub original: StoreFrame,
    /// Per-store temperature band, when available.
    pub temperature: Option<BTreeMap<String, String>>,
}

impl LoadedInputs {
    /// True when temperature-aware regrouping has data to work with.
    #[must_use]
    pub fn has_temperature(&self) -> bool {
        self.temperature.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// Loads and reconciles the engine's input tables.
///
/// # Examples
///
/// ```no_run
/// use agrupar::loading::MatrixLoader;
///
/// let inputs = MatrixLoader::new("normalized.csv", "original.csv")
///     .with_temperature("temperature.csv")
///     .load()
///     .unwrap();
/// assert_eq!(inputs.normalized.n_stores(), inputs.original.n_stores());
/// ```
#[derive(Debug, Clone)]
pub struct MatrixLoader {
    normalized_path: PathBuf,
    original_path: PathBuf,
    temperature_path: Option<PathBuf>,
}

impl MatrixLoader {
    /// Creates a loader for the two required matrices.
    #[must_use]
    pub fn new(normalized_path: impl Into<PathBuf>, original_path: impl Into<PathBuf>) -> Self {
        Self {
            normalized_path: normalized_path.into(),
            original_path: original_path.into(),
            temperature_path: None,
        }
    }

    /// Requests the optional temperature table. A missing file is not an
    /// error; the engine just skips the regrouping phase.
    #[must_use]
    pub fn with_temperature(mut self, path: impl Into<PathBuf>) -> Self {
        self.temperature_path = Some(path.into());
        self
    }

    /// Loads both matrices and the optional temperature table.
    ///
    /// # Errors
    ///
    /// Returns [`AgruparError::MissingInput`] if either matrix file is
    /// absent, and [`AgruparError::StructuralMismatch`] if the matrices
    /// share no store ids at all. A mere row-count difference is logged and
    /// resolved by intersecting the indices.
    pub fn load(&self) -> Result<LoadedInputs> {
        for path in [&self.normalized_path, &self.original_path] {
            if !path.exists() {
                return Err(AgruparError::MissingInput { path: path.clone() });
            }
        }

        let normalized = read_feature_frame(&self.normalized_path)?;
        let original = read_feature_frame(&self.original_path)?;

        let (normalized, original) = reconcile(normalized, original)?;

        let temperature = match &self.temperature_path {
            Some(path) if path.exists() => Some(read_temperature_table(path)?),
            Some(path) => {
                log::warn!(
                    "temperature table {} not found; temperature-aware regrouping will be skipped",
                    path.display()
                );
                None
            }
            None => None,
        };

        Ok(LoadedInputs {
            normalized,
            original,
            temperature,
        })
    }
}

/// Aligns the two matrices on their shared store ids.
fn reconcile(normalized: StoreFrame, original: StoreFrame) -> Result<(StoreFrame, StoreFrame)> {
    if normalized.feature_names() != original.feature_names() {
        log::warn!(
            "normalized and original matrices have different column sets ({} vs {} features); profiling uses the original's columns",
            normalized.n_features(),
            original.n_features()
        );
    }

    if normalized.store_ids() == original.store_ids() {
        return Ok((normalized, original));
    }

    log::warn!(
        "store index mismatch between matrices ({} vs {} stores); proceeding on the intersection",
        normalized.n_stores(),
        original.n_stores()
    );
    let normalized = normalized.restrict_to(original.store_ids());
    let original = original.restrict_to(normalized.store_ids());
    if normalized.n_stores() == 0 {
        return Err(AgruparError::StructuralMismatch {
            message: "normalized and original matrices share no store ids".to_string(),
        });
    }
    Ok((normalized, original))
}

/// Reads a store×feature CSV: header row, first column the store id
/// (coerced to string), remaining columns numeric features.
fn read_feature_frame(path: &Path) -> Result<StoreFrame> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(AgruparError::Csv(format!(
            "{}: expected a store-id column plus at least one feature column",
            path.display()
        )));
    }
    let feature_names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut store_ids = Vec::new();
    let mut data = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let id = record.get(0).unwrap_or_default().trim();
        if id.is_empty() {
            return Err(AgruparError::Csv(format!(
                "{}: empty store id at data row {}",
                path.display(),
                line + 1
            )));
        }
        store_ids.push(id.to_string());
        for (col, field) in record.iter().skip(1).enumerate() {
            let value: f32 = field.trim().parse().map_err(|_| {
                AgruparError::Csv(format!(
                    "{}: non-numeric value {:?} in column {:?} at data row {}",
                    path.display(),
                    field,
                    feature_names[col],
                    line + 1
                ))
            })?;
            data.push(value);
        }
    }

    let rows = store_ids.len();
    let cols = feature_names.len();
    let values = Matrix::from_vec(rows, cols, data).map_err(AgruparError::from)?;
    StoreFrame::new(store_ids, feature_names, values)
}

/// Reads the temperature table, resolving the store-id header from the
/// accepted aliases.
fn read_temperature_table(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let id_idx = STORE_ID_ALIASES
        .iter()
        .find_map(|alias| headers.iter().position(|h| h == *alias))
        .ok_or_else(|| {
            AgruparError::StructuralMismatch {
                message: format!(
                    "{}: no store-id column; accepted headers are {:?}",
                    path.display(),
                    STORE_ID_ALIASES
                ),
            }
        })?;
    let band_idx = headers
        .iter()
        .position(|h| h == TEMPERATURE_BAND_COLUMN)
        .ok_or_else(|| AgruparError::StructuralMismatch {
            message: format!(
                "{}: missing {TEMPERATURE_BAND_COLUMN:?} column",
                path.display()
            ),
        })?;

    let mut bands = BTreeMap::new();
    for record in reader.records() {
        let record = record?;
        let id = record.get(id_idx).unwrap_or_default().trim();
        let band = record.get(band_idx).unwrap_or_default().trim();
        if !id.is_empty() && !band.is_empty() {
            bands.insert(id.to_string(), band.to_string());
        }
    }
    Ok(bands)
}
