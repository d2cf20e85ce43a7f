//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - run identity (`RunEntities`) and per-run inputs (`Event`, `BoldSidecar`)
//! - study configuration (`ModelConfig`, `HrfModel`, `SignalScaling`)

pub mod types;

pub use types::*;
