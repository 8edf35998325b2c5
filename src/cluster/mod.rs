//! Store partitioning: seeded K-means, size balancing, and
//! temperature-aware regrouping.

mod balance;
mod kmeans;
mod regroup;

pub use balance::{BalanceOutcome, SizeBalancer, SizeBounds};
pub use kmeans::KMeans;
pub use regroup::{RegroupOutcome, TemperatureRegrouper};
