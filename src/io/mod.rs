//! Input/output helpers.
//!
//! - dataset layout + run discovery (`layout`)
//! - TSV/JSON ingest (`ingest`)
//! - model configuration (`config`)
//! - derivative writer (`export`)

pub mod config;
pub mod export;
pub mod ingest;
pub mod layout;

pub use config::*;
pub use export::*;
pub use ingest::*;
pub use layout::*;
