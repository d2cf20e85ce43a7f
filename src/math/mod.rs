//! Mathematical utilities: least squares, haemodynamic response, tail probabilities.

pub mod dist;
pub mod hrf;
pub mod ols;

pub use dist::*;
pub use hrf::*;
pub use ols::*;
