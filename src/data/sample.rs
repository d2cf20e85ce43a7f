//! Synthetic bootcamp dataset generation.
//!
//! Produces a complete dataset root (raw runs, preprocessing confounds, a
//! model config) whose signal is generated from the same design-matrix code
//! the fitter uses, so the true coefficients are known exactly.

use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{BoldSidecar, Event, ModelConfig, RunEntities};
use crate::error::AppError;
use crate::io::layout::{CODE_DIR, DERIVATIVES_DIR, RAW_DIR};
use crate::io::{NumericTable, ResultWriter, format_value};
use crate::models::{DesignMatrix, INTERCEPT, build_design_matrix};

pub const CONDITIONS: [&str; 3] = ["motor", "music", "visual"];
const MOTION_PARAMS: [&str; 6] = ["rot_x", "rot_y", "rot_z", "trans_x", "trans_y", "trans_z"];
const BLOCK_S: f64 = 12.0;
const FIRST_ONSET_S: f64 = 6.0;
const BASELINE: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub subjects: usize,
    pub runs: usize,
    pub volumes: usize,
    pub units: usize,
    pub repetition_time: f64,
    pub seed: u64,
    /// Standard deviation of the Gaussian measurement noise.
    pub noise: f64,
    pub overwrite: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            subjects: 2,
            runs: 2,
            volumes: 120,
            units: 8,
            repetition_time: 2.0,
            seed: 42,
            noise: 0.5,
            overwrite: false,
        }
    }
}

/// True coefficients of one simulated run.
#[derive(Debug, Clone)]
pub struct RunTruth {
    pub entities: RunEntities,
    pub design: DesignMatrix,
    /// `p × units`, rows in design column order.
    pub betas: DMatrix<f64>,
}

impl RunTruth {
    pub fn beta(&self, column: &str, unit: usize) -> Option<f64> {
        let row = self.design.column_index(column)?;
        Some(self.betas[(row, unit)])
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedDataset {
    pub root: PathBuf,
    pub units: Vec<String>,
    pub runs: Vec<RunTruth>,
}

/// Write a synthetic dataset under `root`.
pub fn simulate_dataset(
    root: &Path,
    sim: &SimulationConfig,
    model: &ModelConfig,
) -> Result<SimulatedDataset, AppError> {
    validate(sim)?;
    model.validate()?;

    let mut rng = StdRng::seed_from_u64(sim.seed);
    let noise = Normal::new(0.0, sim.noise)
        .map_err(|e| AppError::invalid(format!("Noise distribution error: {e}")))?;
    let unit_normal =
        Normal::new(0.0, 1.0).map_err(|e| AppError::invalid(format!("Noise distribution error: {e}")))?;

    let raw = ResultWriter::new(root.join(RAW_DIR), sim.overwrite);
    let preproc = ResultWriter::new(root.join(DERIVATIVES_DIR).join(&model.preproc_pipeline), sim.overwrite);
    raw.ensure_dataset_description("bootcamp", false)?;
    preproc.ensure_dataset_description(&model.preproc_pipeline, true)?;
    write_model_config(root, model)?;

    let units: Vec<String> = (1..=sim.units).map(|i| format!("roi-{i:02}")).collect();

    // Each unit has a stable response profile per condition; runs vary around it.
    let profiles: Vec<Vec<f64>> = CONDITIONS
        .iter()
        .map(|_| (0..sim.units).map(|_| 2.0 * unit_normal.sample(&mut rng)).collect())
        .collect();

    let mut runs = Vec::new();
    for subject in 1..=sim.subjects {
        for run in 1..=sim.runs {
            let entities = RunEntities {
                subject: format!("{subject:02}"),
                session: None,
                task: model.task.clone(),
                run: Some(run.to_string()),
            };
            let truth = simulate_run(&entities, sim, model, &units, &profiles, &raw, &preproc, &mut rng, &noise)?;
            runs.push(truth);
        }
    }

    log::info!(
        "simulated {} runs ({} units, {} volumes) under '{}'",
        runs.len(),
        sim.units,
        sim.volumes,
        root.display()
    );

    Ok(SimulatedDataset {
        root: root.to_path_buf(),
        units,
        runs,
    })
}

fn validate(sim: &SimulationConfig) -> Result<(), AppError> {
    if sim.subjects == 0 || sim.runs == 0 || sim.units == 0 {
        return Err(AppError::invalid("Simulation needs at least one subject, run and unit."));
    }
    if !(sim.repetition_time.is_finite() && sim.repetition_time > 0.0) {
        return Err(AppError::invalid("Simulation repetition time must be > 0."));
    }
    let scan_length = sim.volumes as f64 * sim.repetition_time;
    if scan_length < FIRST_ONSET_S + 3.0 * (BLOCK_S + 10.0) {
        return Err(AppError::invalid(format!(
            "Simulation scan of {scan_length:.0}s is too short for one block per condition."
        )));
    }
    if !(sim.noise.is_finite() && sim.noise >= 0.0) {
        return Err(AppError::invalid("Simulation noise must be finite and >= 0."));
    }
    Ok(())
}

fn write_model_config(root: &Path, model: &ModelConfig) -> Result<(), AppError> {
    let code = ResultWriter::new(root.join(CODE_DIR), false);
    if code.out_dir().join("model.json").exists() {
        return Ok(());
    }
    code.write_json(Path::new("model.json"), model).map(|_| ())
}

/// Block onsets: randomized condition order, 12 s blocks, 6–10 s rest.
fn block_events(scan_length: f64, rng: &mut StdRng) -> Vec<Event> {
    let mut events = Vec::new();
    let mut onset = FIRST_ONSET_S;
    let mut order: Vec<&str> = Vec::new();

    while onset + BLOCK_S + 4.0 <= scan_length {
        if order.is_empty() {
            order = CONDITIONS.to_vec();
            order.shuffle(rng);
        }
        let trial_type = order.pop().unwrap_or(CONDITIONS[0]);
        events.push(Event {
            onset,
            duration: BLOCK_S,
            trial_type: trial_type.to_string(),
        });
        onset += BLOCK_S + rng.gen_range(6.0..=10.0);
    }
    events
}

fn motion_confounds(volumes: usize, rng: &mut StdRng, step: &Normal<f64>) -> NumericTable {
    let mut columns: Vec<String> = MOTION_PARAMS.iter().map(|s| s.to_string()).collect();
    columns.push("trans_x_derivative1".to_string());
    columns.push("csf".to_string());

    let mut data = DMatrix::zeros(volumes, columns.len());
    for j in 0..MOTION_PARAMS.len() {
        let mut value = 0.0;
        for i in 0..volumes {
            value += 0.02 * step.sample(rng);
            data[(i, j)] = value;
        }
    }
    let trans_x = MOTION_PARAMS.len() - 3;
    let derivative = MOTION_PARAMS.len();
    for i in 1..volumes {
        data[(i, derivative)] = data[(i, trans_x)] - data[(i - 1, trans_x)];
    }
    for i in 0..volumes {
        data[(i, derivative + 1)] = step.sample(rng);
    }

    NumericTable { columns, data }
}

#[allow(clippy::too_many_arguments)]
fn simulate_run(
    entities: &RunEntities,
    sim: &SimulationConfig,
    model: &ModelConfig,
    units: &[String],
    profiles: &[Vec<f64>],
    raw: &ResultWriter,
    preproc: &ResultWriter,
    rng: &mut StdRng,
    noise: &Normal<f64>,
) -> Result<RunTruth, AppError> {
    let unit_normal =
        Normal::new(0.0, 1.0).map_err(|e| AppError::invalid(format!("Noise distribution error: {e}")))?;
    let tr = sim.repetition_time;
    let sidecar = BoldSidecar {
        repetition_time: tr,
        start_time: Some(tr / 2.0),
    };
    let scan_length = sim.volumes as f64 * tr;

    // Events are stored in acquisition time; the design shifts them by StartTime.
    let events = block_events(scan_length, rng);
    let confounds = motion_confounds(sim.volumes, rng, &unit_normal);
    let design = build_design_matrix(&events, &sidecar, sim.volumes, Some(&confounds), model)?;

    let betas = DMatrix::from_fn(design.n_regressors(), units.len(), |row, unit| {
        let column = design.columns[row].as_str();
        if let Some(c) = CONDITIONS.iter().position(|name| *name == column) {
            profiles[c][unit] + 0.1 * unit_normal.sample(rng)
        } else if column == INTERCEPT {
            BASELINE + 5.0 * unit_normal.sample(rng)
        } else {
            unit_normal.sample(rng)
        }
    });

    let mut signal = &design.values * &betas;
    signal.apply(|v| *v += noise.sample(rng));

    let stem = entities.stem();
    let func = entities.func_dir();

    raw.write_matrix(&func.join(format!("{stem}_bold.tsv")), None, units, &signal)?;
    raw.write_json(&func.join(format!("{stem}_bold.json")), &sidecar)?;

    let header: Vec<String> = ["onset", "duration", "trial_type"].iter().map(|s| s.to_string()).collect();
    let records: Vec<Vec<String>> = events
        .iter()
        .map(|e| vec![format_value(e.onset), format_value(e.duration), e.trial_type.clone()])
        .collect();
    raw.write_records(&func.join(format!("{stem}_events.tsv")), &header, &records)?;

    // fMRIPrep leaves the first derivative sample undefined.
    let mut on_disk = confounds.data.clone();
    if let Some(idx) = confounds.column_index("trans_x_derivative1") {
        on_disk[(0, idx)] = f64::NAN;
    }
    preproc.write_matrix(
        &func.join(format!("{stem}_desc-confounds_timeseries.tsv")),
        None,
        &confounds.columns,
        &on_disk,
    )?;

    log::debug!("simulated {stem}: {} events, {} regressors", events.len(), design.n_regressors());

    Ok(RunTruth {
        entities: entities.clone(),
        design,
        betas,
    })
}
