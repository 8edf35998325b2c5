//! Core numeric primitives (Vector, Matrix).
//!
//! Row-major storage; these back every distance and centroid computation
//! in the clustering engine.

mod matrix;
mod vector;

pub use matrix::Matrix;
pub use vector::Vector;
