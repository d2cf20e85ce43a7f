//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - runs the analysis or the simulator
//! - prints the terminal summary

use clap::Parser;

use crate::cli::{Cli, Command, RunArgs, SimulateArgs};
use crate::data::{SimulationConfig, simulate_dataset};
use crate::domain::ModelConfig;
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `glm` binary.
pub fn run() -> Result<(), AppError> {
    // `glm` and `glm --root X` behave like `glm run ...`. Clap requires a
    // subcommand name, so argv is rewritten before parsing.
    let argv = rewrite_args(std::env::args().collect());
    let cli = Cli::parse_from(argv);
    init_logging(cli.verbose);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    // `try_init`: a logger may already be installed.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let output = pipeline::run_analysis(&analysis_options_from_args(&args))?;
    println!("{}", crate::report::format_analysis_summary(&output));
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let sim = SimulationConfig {
        subjects: args.subjects,
        runs: args.runs,
        volumes: args.volumes,
        units: args.units,
        seed: args.seed,
        noise: args.noise,
        overwrite: args.overwrite,
        ..SimulationConfig::default()
    };
    let dataset = simulate_dataset(&args.root, &sim, &ModelConfig::default())?;
    println!("{}", crate::report::format_simulation_summary(&dataset));
    Ok(())
}

pub fn analysis_options_from_args(args: &RunArgs) -> pipeline::AnalysisOptions {
    pipeline::AnalysisOptions {
        root: args.root.clone(),
        model: args.model.clone(),
        overwrite: args.overwrite,
        no_group: args.no_group,
    }
}

/// Flags accepted before the subcommand name.
const GLOBAL_FLAGS: [&str; 2] = ["-v", "--verbose"];

/// Rewrite argv so `glm` defaults to `glm run`.
///
/// Leading global flags are skipped when looking for the subcommand.
///
/// Rules:
/// - `glm`                       -> `glm run`
/// - `glm -v`                    -> `glm -v run`
/// - `glm --root X ...`          -> `glm run --root X ...`
/// - `glm -v simulate ...`       -> unchanged
/// - `glm --help/--version/-h`   -> unchanged (top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let first = argv
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, arg)| !GLOBAL_FLAGS.contains(&arg.as_str()))
        .map(|(idx, arg)| (idx, arg.clone()));
    let Some((idx, arg)) = first else {
        argv.push("run".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg.as_str(), "run" | "simulate");
    if is_subcommand {
        return argv;
    }

    if arg.starts_with('-') {
        argv.insert(idx, "run".to_string());
        return argv;
    }

    argv
}
