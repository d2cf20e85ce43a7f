//! Synthetic dataset generation.
//!
//! Used by `glm simulate` and by the end-to-end tests: the written dataset
//! has the same layout as a real bootcamp dataset, with known coefficients.

pub mod sample;

pub use sample::*;
