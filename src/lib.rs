//! Agrupar: store clustering engine for retail merchandising pipelines.
//!
//! Groups retail stores into statistically coherent, size-bounded clusters
//! from their product-sales mix. The resulting store -> cluster mapping and
//! per-cluster profiles feed downstream merchandising rules (missing
//! category, allocation imbalance, under-stocking, overcapacity, missed
//! sales, performance scoring) that treat each cluster as a reference
//! population.
//!
//! # Pipeline
//!
//! 1. [`loading`]: load the normalized and original store×feature matrices
//!    plus optional per-store temperature bands.
//! 2. [`reduce`]: PCA the normalized matrix into a compact representation.
//! 3. [`cluster`]: seeded K-means partitioning, iterative size balancing
//!    into `[min, max]` with one tolerated remainder cluster, and optional
//!    temperature-band-pure regrouping.
//! 4. [`profile`]: per-cluster mean profiles, top features, and quality
//!    metrics (silhouette, Davies–Bouldin, Calinski–Harabasz).
//! 5. [`validate`]: pass/fail invariant gates; failures always propagate.
//! 6. [`output`]: timestamped + stable-name dual-output persistence.
//!
//! # Quick Start
//!
//! ```
//! use agrupar::prelude::*;
//!
//! // 90 stores in three sales blobs, target cluster size 30.
//! let mut ids = Vec::new();
//! let mut data = Vec::new();
//! for i in 0..90 {
//!     ids.push(format!("S{i:03}"));
//!     let blob = (i / 30) as f32 * 10.0;
//!     data.push(blob + (i % 30) as f32 * 0.01);
//!     data.push(blob);
//! }
//! let matrix = Matrix::from_vec(90, 2, data).unwrap();
//! let frame = StoreFrame::new(ids, vec!["shoes".into(), "coats".into()], matrix).unwrap();
//! let inputs = LoadedInputs { normalized: frame.clone(), original: frame, temperature: None };
//!
//! let config = SegmentationConfig::default()
//!     .with_bounds(SizeBounds::new(20, 30, 40).unwrap())
//!     .with_min_stores(60)
//!     .with_components(2);
//! let outcome = SegmentationEngine::new(config).run(&inputs).unwrap();
//! assert_eq!(outcome.labels.len(), 90);
//! ```
//!
//! # Modules
//!
//! - [`primitives`]: core Vector and Matrix types
//! - [`frame`]: store-id-indexed feature tables
//! - [`loading`]: input loading and schema reconciliation
//! - [`reduce`]: PCA dimensionality reduction
//! - [`cluster`]: K-means, size balancing, temperature regrouping
//! - [`metrics`]: clustering quality metrics
//! - [`profile`]: cluster profiles and quality reports
//! - [`results`]: the store -> cluster assignment table
//! - [`validate`]: terminal invariant validation
//! - [`output`]: dual-output persistence
//! - [`engine`]: end-to-end orchestration

pub mod cluster;
pub mod engine;
pub mod error;
pub mod frame;
pub mod loading;
pub mod metrics;
pub mod output;
pub mod prelude;
pub mod primitives;
pub mod profile;
pub mod reduce;
pub mod results;
pub mod traits;
pub mod validate;
