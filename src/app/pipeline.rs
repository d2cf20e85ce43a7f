//! The analysis workflow shared by `glm` and `glm run`.
//!
//! locate dataset -> load model -> discover runs -> per run: design, fit,
//! contrasts, write -> group one-sample tests -> write
//!
//! Presentation lives in `report`; this module only computes and persists.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::{ModelConfig, RunEntities};
use crate::error::AppError;
use crate::fit::{ContrastStats, FirstLevelResult, GroupModel, fit_first_level};
use crate::io::{
    DatasetLayout, NumericTable, ResultWriter, RunFiles, load_model_config, read_confounds, read_events,
    read_sidecar, read_signal,
};
use crate::models::{DesignMatrix, build_design_matrix, default_contrasts};

const GROUP_DIR: &str = "group";
const EFFECTS_OF_INTEREST: &str = "EffectsOfInterest";

/// Command-line overrides for a single analysis.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub root: Option<PathBuf>,
    pub model: Option<PathBuf>,
    pub overwrite: bool,
    pub no_group: bool,
}

/// Everything computed and written for one run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub entities: RunEntities,
    pub design: DesignMatrix,
    pub result: FirstLevelResult,
    pub written: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct GroupOutput {
    pub contrast: String,
    pub n_inputs: usize,
    pub stats: ContrastStats,
    pub written: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub layout: DatasetLayout,
    pub config: ModelConfig,
    pub out_dir: PathBuf,
    pub runs: Vec<RunOutput>,
    pub group: Vec<GroupOutput>,
}

/// `<stem>_fit.json`
#[derive(Debug, Serialize)]
struct FitSidecar<'a> {
    tool: &'static str,
    version: &'static str,
    generated_at: String,
    repetition_time: f64,
    n_obs: usize,
    dof: usize,
    regressors: &'a [String],
    units: &'a [String],
    contrasts: Vec<&'a str>,
}

/// Run the full analysis and write every derivative.
pub fn run_analysis(options: &AnalysisOptions) -> Result<AnalysisOutput, AppError> {
    let root = DatasetLayout::resolve_root(options.root.as_deref())?;
    let layout = DatasetLayout::locate(&root)?;

    let mut config = load_model_config(options.model.as_deref(), &layout.model_config_path())?;
    if options.overwrite {
        config.overwrite = true;
    }
    if options.no_group {
        config.second_level = false;
    }

    let run_files = layout.discover_runs(&config.task)?;
    log::info!(
        "found {} run(s) of task '{}' under '{}'",
        run_files.len(),
        config.task,
        layout.raw.display()
    );

    let preproc_dir = layout.pipeline_dir(&config.preproc_pipeline);
    if !preproc_dir.is_dir() {
        if config.space.is_some() {
            return Err(AppError::PathNotFound { path: preproc_dir });
        }
        log::warn!(
            "preprocessing derivative '{}' not found; fitting without confounds",
            preproc_dir.display()
        );
    }

    let writer = ResultWriter::new(layout.pipeline_dir(&config.output_pipeline), config.overwrite);
    writer.ensure_dataset_description(&config.output_pipeline, true)?;

    let mut runs = Vec::with_capacity(run_files.len());
    for files in &run_files {
        log::info!("fitting {}", files.entities);
        runs.push(fit_run(files, &preproc_dir, &config, &writer)?);
    }

    let group = if config.second_level {
        fit_group(&runs, &config, &writer)?
    } else {
        Vec::new()
    };

    Ok(AnalysisOutput {
        out_dir: writer.out_dir().to_path_buf(),
        layout,
        config,
        runs,
        group,
    })
}

fn load_confounds(files: &RunFiles, preproc_dir: &Path, config: &ModelConfig) -> Result<Option<NumericTable>, AppError> {
    if config.confounds.is_empty() || !preproc_dir.is_dir() {
        return Ok(None);
    }
    let path = files.confounds_path(preproc_dir);
    if !path.is_file() {
        log::warn!("{}: no confounds file at '{}'", files.entities, path.display());
        return Ok(None);
    }
    read_confounds(&path).map(Some)
}

fn fit_run(
    files: &RunFiles,
    preproc_dir: &Path,
    config: &ModelConfig,
    writer: &ResultWriter,
) -> Result<RunOutput, AppError> {
    let sidecar = read_sidecar(&files.sidecars)?;
    let events = read_events(&files.events)?;
    let signal = match &config.space {
        Some(space) => read_signal(&files.preproc_bold_path(preproc_dir, space))?,
        None => read_signal(&files.bold)?,
    };
    let confounds = load_confounds(files, preproc_dir, config)?;

    let design = build_design_matrix(&events, &sidecar, signal.n_rows(), confounds.as_ref(), config)?;
    log::debug!("{}: design columns {:?}", files.entities, design.columns);

    let contrasts = if config.contrasts.is_empty() {
        default_contrasts(design.conditions())
    } else {
        config.contrasts.clone()
    };
    let result = fit_first_level(&design, &signal.columns, &signal.data, config.signal_scaling, &contrasts)?;

    let written = write_run(&files.entities, &design, &result, sidecar.repetition_time, writer)?;

    Ok(RunOutput {
        entities: files.entities.clone(),
        design,
        result,
        written,
    })
}

fn write_contrast(writer: &ResultWriter, dir: &Path, prefix: &str, units: &[String], stats: &ContrastStats) -> Result<Vec<PathBuf>, AppError> {
    let maps: [(&str, &[f64]); 4] = [
        ("effect", stats.effect.as_slice()),
        ("variance", stats.variance.as_slice()),
        ("t", stats.t.as_slice()),
        ("p", stats.p.as_slice()),
    ];
    maps.iter()
        .map(|(stat, values)| writer.write_statmap(&dir.join(format!("{prefix}_stat-{stat}_statmap.tsv")), units, values))
        .collect()
}

fn write_run(
    entities: &RunEntities,
    design: &DesignMatrix,
    result: &FirstLevelResult,
    repetition_time: f64,
    writer: &ResultWriter,
) -> Result<Vec<PathBuf>, AppError> {
    let stem = entities.stem();
    let dir = entities.subject_dir();
    let units = result.units.as_slice();
    let fit = &result.fit;
    let mut written = Vec::new();

    written.push(writer.write_matrix(
        &entities.func_dir().join(format!("{stem}_design.tsv")),
        None,
        &design.columns,
        &design.values,
    )?);
    written.push(writer.write_matrix(
        &dir.join(format!("{stem}_stat-beta_statmap.tsv")),
        Some(("unit", units)),
        &fit.regressors,
        &fit.betas.transpose(),
    )?);
    written.push(writer.write_matrix(
        &dir.join(format!("{stem}_stat-t_statmap.tsv")),
        Some(("unit", units)),
        &fit.regressors,
        &fit.t_values().transpose(),
    )?);

    for (contrast, stats) in &result.contrasts {
        let prefix = format!("{stem}_contrast-{}", contrast.name);
        written.extend(write_contrast(writer, &dir, &prefix, units, stats)?);
    }

    if let Some(f) = &result.effects_of_interest {
        let prefix = format!("{stem}_contrast-{EFFECTS_OF_INTEREST}");
        written.push(writer.write_statmap(&dir.join(format!("{prefix}_stat-F_statmap.tsv")), units, &f.f)?);
        written.push(writer.write_statmap(&dir.join(format!("{prefix}_stat-p_statmap.tsv")), units, &f.p)?);
    }

    let sidecar = FitSidecar {
        tool: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        generated_at: chrono::Utc::now().to_rfc3339(),
        repetition_time,
        n_obs: fit.n_obs,
        dof: fit.dof,
        regressors: &fit.regressors,
        units,
        contrasts: result.contrasts.iter().map(|(c, _)| c.expression.as_str()).collect(),
    };
    written.push(writer.write_json(&dir.join(format!("{stem}_fit.json")), &sidecar)?);

    Ok(written)
}

/// One-sample t-test per contrast over every run that evaluated it.
fn fit_group(runs: &[RunOutput], config: &ModelConfig, writer: &ResultWriter) -> Result<Vec<GroupOutput>, AppError> {
    let Some(first) = runs.first() else {
        return Ok(Vec::new());
    };

    // Keyed by contrast name, in first-seen order.
    let mut models: Vec<(String, GroupModel)> = Vec::new();
    for run in runs {
        for (contrast, stats) in &run.result.contrasts {
            let idx = match models.iter().position(|(name, _)| *name == contrast.name) {
                Some(idx) => idx,
                None => {
                    models.push((contrast.name.clone(), GroupModel::new(first.result.units.clone())));
                    models.len() - 1
                }
            };
            models[idx].1.add(run.entities.stem(), &run.result.units, &stats.effect)?;
        }
    }

    let mut out = Vec::with_capacity(models.len());
    for (name, model) in &models {
        if model.n_inputs() < 2 {
            log::warn!(
                "group: contrast {name} has {} input(s); at least 2 runs are needed, skipping",
                model.n_inputs()
            );
            continue;
        }
        log::info!("group: {name} over {} runs", model.n_inputs());
        log::debug!("group: {name} inputs {:?}", model.labels());
        let stats = model.fit()?;
        let prefix = format!("task-{}_contrast-{name}", config.task);
        let written = write_contrast(writer, Path::new(GROUP_DIR), &prefix, model.units(), &stats)?;
        out.push(GroupOutput {
            contrast: name.clone(),
            n_inputs: model.n_inputs(),
            stats,
            written,
        });
    }
    Ok(out)
}
