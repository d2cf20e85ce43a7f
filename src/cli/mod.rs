//! Command-line parsing for the bootcamp GLM.
//!
//! Argument parsing stays separate from the analysis code; every flag is
//! optional so the bare `glm` command runs the conventional analysis.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "glm", version, about = "GLM analysis of a bootcamp dataset")]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit every run, write derivatives, then run the group model.
    Run(RunArgs),
    /// Write a synthetic dataset with known coefficients.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct RunArgs {
    /// Dataset root (default: $GLM_DATASET_ROOT, then the working directory).
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Model configuration (default: <root>/code/model.json if present).
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Replace existing derivative files.
    #[arg(long)]
    pub overwrite: bool,

    /// Skip the second-level model.
    #[arg(long)]
    pub no_group: bool,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Directory to write the dataset into.
    #[arg(long)]
    pub root: PathBuf,

    #[arg(long, default_value_t = 2)]
    pub subjects: usize,

    /// Runs per subject.
    #[arg(long, default_value_t = 2)]
    pub runs: usize,

    /// Volumes per run.
    #[arg(long, default_value_t = 120)]
    pub volumes: usize,

    /// Signal columns (ROIs) per run.
    #[arg(long, default_value_t = 8)]
    pub units: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Standard deviation of the measurement noise.
    #[arg(long, default_value_t = 0.5)]
    pub noise: f64,

    /// Replace files of an existing simulated dataset.
    #[arg(long)]
    pub overwrite: bool,
}
