//! `bootcamp-glm` library crate.
//!
//! The binary (`glm`) is a thin wrapper around this library so the dataset
//! locator, model fitter and result writer are testable without spawning
//! processes.

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
