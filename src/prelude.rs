//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use agrupar::prelude::*;
//! ```

pub use crate::cluster::{KMeans, SizeBalancer, SizeBounds, TemperatureRegrouper};
pub use crate::engine::{SegmentationConfig, SegmentationEngine, SegmentationOutcome};
pub use crate::error::{AgruparError, Result};
pub use crate::frame::StoreFrame;
pub use crate::loading::{LoadedInputs, MatrixLoader};
pub use crate::metrics::{
    calinski_harabasz_score, davies_bouldin_score, inertia, silhouette_score,
};
pub use crate::output::OutputWriter;
pub use crate::primitives::{Matrix, Vector};
pub use crate::profile::{ClusterProfile, ClusterProfiler, QualityReport};
pub use crate::reduce::Pca;
pub use crate::results::AssignmentTable;
pub use crate::traits::{Transformer, UnsupervisedEstimator};
pub use crate::validate::{ResultValidator, ValidationState};
