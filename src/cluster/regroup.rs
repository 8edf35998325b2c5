//! Temperature-aware regrouping.
//!
//! Re-partitions stores within each temperature band independently, so no
//! final cluster mixes two bands. Stores without a band keep their
//! pre-regroup cluster. Band sub-partitions are independent and run in
//! parallel; the merge assigns globally unique cluster ids in sorted band
//! order, so the result is deterministic regardless of thread scheduling.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::cluster::{KMeans, SizeBalancer, SizeBounds};
use crate::error::Result;
use crate::primitives::Matrix;
use crate::traits::UnsupervisedEstimator;

/// Result of the regrouping phase.
#[derive(Debug, Clone)]
pub struct RegroupOutcome {
    /// Final labels, one per input row.
    pub labels: Vec<usize>,
    /// Band owning each band-generated cluster id.
    pub band_of_cluster: BTreeMap<usize, String>,
    /// False when the phase was a pass-through.
    pub regrouped: bool,
}

/// Re-partitions each temperature band with the same K-means + balancing
/// stack used globally.
///
/// # Examples
///
/// ```
/// use agrupar::cluster::{SizeBounds, TemperatureRegrouper};
/// use agrupar::primitives::Matrix;
///
/// let data = Matrix::from_vec(4, 1, vec![0.0, 0.1, 9.0, 9.1]).unwrap();
/// let bands = vec![None, None, None, None];
/// let regrouper = TemperatureRegrouper::new(SizeBounds::new(1, 2, 3).unwrap(), 42);
/// // No band data: identity pass-through.
/// let outcome = regrouper.regroup(&data, &[0, 0, 1, 1], &bands).unwrap();
/// assert_eq!(outcome.labels, vec![0, 0, 1, 1]);
/// assert!(!outcome.regrouped);
/// ```
#[derive(Debug, Clone)]
pub struct TemperatureRegrouper {
    bounds: SizeBounds,
    seed: u64,
    max_balance_iterations: usize,
}

impl TemperatureRegrouper {
    /// Creates a regrouper with the given size bounds and seed.
    #[must_use]
    pub fn new(bounds: SizeBounds, seed: u64) -> Self {
        Self {
            bounds,
            seed,
            max_balance_iterations: 100,
        }
    }

    /// Sets the per-band balancing iteration cap.
    #[must_use]
    pub fn with_max_balance_iterations(mut self, cap: usize) -> Self {
        self.max_balance_iterations = cap.max(1);
        self
    }

    /// Regroups `data` rows within their bands. `bands[row]` is the band of
    /// that row, or `None` for stores without temperature data, which keep
    /// `labels[row]` unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if a band's sub-partitioning fails.
    pub fn regroup(
        &self,
        data: &Matrix<f32>,
        labels: &[usize],
        bands: &[Option<String>],
    ) -> Result<RegroupOutcome> {
        debug_assert_eq!(data.n_rows(), labels.len());
        debug_assert_eq!(data.n_rows(), bands.len());

        // Band -> member rows, sorted band order for a stable id layout.
        let mut by_band: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (row, band) in bands.iter().enumerate() {
            if let Some(band) = band {
                by_band.entry(band.as_str()).or_default().push(row);
            }
        }

        if by_band.is_empty() {
            return Ok(RegroupOutcome {
                labels: labels.to_vec(),
                band_of_cluster: BTreeMap::new(),
                regrouped: false,
            });
        }

        let skipped = bands.iter().filter(|b| b.is_none()).count();
        if skipped > 0 {
            log::info!(
                "{skipped} store(s) lack a temperature band and keep their balanced cluster"
            );
        }

        // Each band is an independent sub-problem; the sorted Vec keeps the
        // merge order fixed no matter how rayon schedules the work.
        let band_list: Vec<(&str, Vec<usize>)> = by_band.into_iter().collect();
        let band_runs: Vec<(&str, &[usize], Result<Vec<usize>>)> = band_list
            .par_iter()
            .map(|(band, rows)| (*band, rows.as_slice(), self.partition_band(data, rows)))
            .collect();

        // Band-generated ids start above every pre-regroup id so the two
        // id families never collide.
        let mut next_id = labels.iter().max().map_or(0, |&m| m + 1);
        let mut out = labels.to_vec();
        let mut band_of_cluster = BTreeMap::new();

        for (band, rows, sub_labels) in band_runs {
            let sub_labels = sub_labels?;
            let k = sub_labels.iter().max().map_or(0, |&m| m + 1);
            for (&row, &sub) in rows.iter().zip(&sub_labels) {
                out[row] = next_id + sub;
            }
            for c in 0..k {
                band_of_cluster.insert(next_id + c, band.to_string());
            }
            log::debug!("band {band}: {} store(s) into {k} cluster(s)", rows.len());
            next_id += k;
        }

        Ok(RegroupOutcome {
            labels: out,
            band_of_cluster,
            regrouped: true,
        })
    }

    /// K-means + size balancing over one band's rows.
    fn partition_band(&self, data: &Matrix<f32>, rows: &[usize]) -> Result<Vec<usize>> {
        let subset = data.select_rows(rows);
        let n = rows.len();
        let k = n.div_ceil(self.bounds.target_size).max(1);

        let mut kmeans = KMeans::new(k).with_random_state(self.seed);
        kmeans.fit(&subset)?;

        let balancer = SizeBalancer::new(self.bounds)
            .with_max_iterations(self.max_balance_iterations);
        let outcome = balancer.balance(&subset, kmeans.labels())?;
        Ok(outcome.labels)
    }
}
