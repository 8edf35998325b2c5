//! Terminal validation of clustering results.
//!
//! Runs once, after every partitioning phase has finished. Each gate is
//! independently fatal with a message that tells an operator exactly which
//! invariant broke; the validator never repairs anything.

use crate::cluster::SizeBounds;
use crate::error::{AgruparError, Result};
use crate::profile::QualityReport;
use crate::results::{
    AssignmentTable, CANONICAL_CLUSTER_COLUMN, LEGACY_CLUSTER_COLUMN, STORE_ID_COLUMN,
};

/// Silhouette below this is treated as catastrophic. Distinct from any
/// aspirational separation target, which is reporting-only.
pub const SILHOUETTE_HARD_FLOOR: f32 = -0.5;

/// Where a validator is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationState {
    /// `validate` has not run yet.
    Unvalidated,
    /// All gates passed.
    Valid,
    /// A gate failed, with its reason.
    Invalid(String),
}

/// Pass/fail gate battery over a finished run.
///
/// # Examples
///
/// ```
/// use agrupar::cluster::SizeBounds;
/// use agrupar::validate::{ResultValidator, ValidationState};
///
/// let validator = ResultValidator::new(SizeBounds::default());
/// assert_eq!(*validator.state(), ValidationState::Unvalidated);
/// ```
#[derive(Debug, Clone)]
pub struct ResultValidator {
    bounds: SizeBounds,
    silhouette_floor: f32,
    undersized_allowance: usize,
    state: ValidationState,
}

impl ResultValidator {
    /// Creates a validator for the given size bounds.
    #[must_use]
    pub fn new(bounds: SizeBounds) -> Self {
        Self {
            bounds,
            silhouette_floor: SILHOUETTE_HARD_FLOOR,
            undersized_allowance: 1,
            state: ValidationState::Unvalidated,
        }
    }

    /// Overrides the silhouette hard floor.
    #[must_use]
    pub fn with_silhouette_floor(mut self, floor: f32) -> Self {
        self.silhouette_floor = floor;
        self
    }

    /// Overrides how many undersized remainder clusters are tolerated.
    /// Defaults to 1; temperature regrouping raises it to one per band,
    /// since each band is partitioned independently and may carry its own
    /// remainder.
    #[must_use]
    pub fn with_undersized_allowance(mut self, allowance: usize) -> Self {
        self.undersized_allowance = allowance;
        self
    }

    /// Current state: `Unvalidated` until [`validate`](Self::validate) runs.
    #[must_use]
    pub fn state(&self) -> &ValidationState {
        &self.state
    }

    /// Runs every gate. The first failure transitions to `Invalid` and
    /// propagates; success transitions to `Valid`.
    ///
    /// # Errors
    ///
    /// Returns [`AgruparError::Validation`] naming the violated gate.
    pub fn validate(&mut self, table: &AssignmentTable, quality: &QualityReport) -> Result<()> {
        match self.run_gates(table, quality) {
            Ok(()) => {
                self.state = ValidationState::Valid;
                Ok(())
            }
            Err(err) => {
                self.state = ValidationState::Invalid(err.to_string());
                Err(err)
            }
        }
    }

    fn run_gates(&self, table: &AssignmentTable, quality: &QualityReport) -> Result<()> {
        if table.is_empty() {
            return Err(AgruparError::validation("no clustering results produced"));
        }

        let missing: Vec<&str> = [
            STORE_ID_COLUMN,
            LEGACY_CLUSTER_COLUMN,
            CANONICAL_CLUSTER_COLUMN,
        ]
        .into_iter()
        .filter(|col| !table.has_column(col))
        .collect();
        if !missing.is_empty() {
            return Err(AgruparError::validation(format!(
                "results table missing required column(s): {missing:?}"
            )));
        }

        let sizes = table.cluster_sizes();
        if sizes.is_empty() {
            return Err(AgruparError::validation("zero clusters present"));
        }

        let oversized: Vec<(usize, usize)> = sizes
            .iter()
            .filter(|&(_, &size)| size > self.bounds.max_size)
            .map(|(&id, &size)| (id, size))
            .collect();
        if !oversized.is_empty() {
            return Err(AgruparError::validation(format!(
                "cluster(s) exceed max_size {}: {oversized:?}",
                self.bounds.max_size
            )));
        }

        let undersized: Vec<(usize, usize)> = sizes
            .iter()
            .filter(|&(_, &size)| size < self.bounds.min_size)
            .map(|(&id, &size)| (id, size))
            .collect();
        // Remainder clusters are a stated business allowance; anything
        // beyond the allowance is a balancing failure.
        if undersized.len() > self.undersized_allowance {
            return Err(AgruparError::validation(format!(
                "{} clusters below min_size {} ({} remainder cluster(s) permitted): {undersized:?}",
                undersized.len(),
                self.bounds.min_size,
                self.undersized_allowance
            )));
        }

        let unassigned = table
            .records()
            .iter()
            .filter(|r| r.cluster.is_none())
            .count();
        if unassigned > 0 {
            return Err(AgruparError::validation(format!(
                "{unassigned} store(s) have no cluster assignment"
            )));
        }

        if quality.silhouette < self.silhouette_floor {
            return Err(AgruparError::validation(format!(
                "silhouette {:.3} below hard floor {:.3}",
                quality.silhouette, self.silhouette_floor
            )));
        }

        Ok(())
    }
}
