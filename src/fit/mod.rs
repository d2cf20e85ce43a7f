//! Model fitting.
//!
//! Responsibilities:
//!
//! - ordinary least squares per unit, standard errors, t/F statistics (`glm`)
//! - per-run fit with signal scaling and contrasts (`first_level`)
//! - one-sample t-test of contrast effects across runs (`group`)

pub mod first_level;
pub mod glm;
pub mod group;

pub use first_level::*;
pub use glm::*;
pub use group::*;
