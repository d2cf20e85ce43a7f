//! GLM model specification: design matrices and contrasts.
//!
//! Both are built from names (conditions, confounds, regressors) so the
//! fitting code can stay purely numeric.

pub mod contrast;
pub mod design;

pub use contrast::*;
pub use design::*;
