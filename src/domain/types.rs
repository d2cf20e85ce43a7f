//! Shared domain types.
//!
//! These types are intentionally lightweight and serializable so they can be
//! read from the dataset, carried through the fit, and written back out as
//! derivative sidecars.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// BIDS entities identifying a single run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunEntities {
    pub subject: String,
    pub session: Option<String>,
    pub task: String,
    pub run: Option<String>,
}

impl RunEntities {
    /// Parse entities from a BIDS filename such as
    /// `sub-01_ses-1_task-mixed_run-1_bold.tsv`.
    ///
    /// Returns the entities and the trailing suffix (`bold`).
    pub fn parse_filename(name: &str) -> Result<(Self, String), AppError> {
        let stem = name.split('.').next().unwrap_or(name);
        let mut parts: Vec<&str> = stem.split('_').collect();
        let suffix = parts
            .pop()
            .filter(|s| !s.contains('-'))
            .ok_or_else(|| AppError::invalid(format!("BIDS filename '{name}' has no suffix")))?;

        let mut subject = None;
        let mut session = None;
        let mut task = None;
        let mut run = None;
        for part in parts {
            let Some((key, value)) = part.split_once('-') else {
                return Err(AppError::invalid(format!(
                    "BIDS filename '{name}' has a malformed entity '{part}'"
                )));
            };
            match key {
                "sub" => subject = Some(value.to_string()),
                "ses" => session = Some(value.to_string()),
                "task" => task = Some(value.to_string()),
                "run" => run = Some(value.to_string()),
                // Other entities (acq, space, desc, ...) do not identify a run here.
                _ => {}
            }
        }

        let subject =
            subject.ok_or_else(|| AppError::invalid(format!("BIDS filename '{name}' has no `sub` entity")))?;
        let task = task.ok_or_else(|| AppError::invalid(format!("BIDS filename '{name}' has no `task` entity")))?;

        Ok((
            Self {
                subject,
                session,
                task,
                run,
            },
            suffix.to_string(),
        ))
    }

    /// `sub-<s>[_ses-<x>]_task-<t>[_run-<r>]`
    pub fn stem(&self) -> String {
        let mut out = format!("sub-{}", self.subject);
        if let Some(ses) = &self.session {
            out.push_str(&format!("_ses-{ses}"));
        }
        out.push_str(&format!("_task-{}", self.task));
        if let Some(run) = &self.run {
            out.push_str(&format!("_run-{run}"));
        }
        out
    }

    /// `sub-<s>[/ses-<x>]`
    pub fn subject_dir(&self) -> std::path::PathBuf {
        let mut dir = std::path::PathBuf::from(format!("sub-{}", self.subject));
        if let Some(ses) = &self.session {
            dir.push(format!("ses-{ses}"));
        }
        dir
    }

    /// Directory holding functional files for this run: `sub-<s>[/ses-<x>]/func`.
    pub fn func_dir(&self) -> std::path::PathBuf {
        self.subject_dir().join("func")
    }
}

impl std::fmt::Display for RunEntities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stem())
    }
}

/// One row of an `_events.tsv` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Seconds from the start of the acquisition.
    pub onset: f64,
    /// Seconds; zero for impulse events.
    pub duration: f64,
    pub trial_type: String,
}

/// The subset of a BOLD JSON sidecar the model needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoldSidecar {
    #[serde(rename = "RepetitionTime")]
    pub repetition_time: f64,
    /// Present when slice-timing correction shifted the effective sample time.
    #[serde(rename = "StartTime", default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
}

/// Haemodynamic response used to convolve condition boxcars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HrfModel {
    /// SPM canonical difference-of-gammas.
    Spm,
    /// No convolution; raw boxcars.
    None,
}

/// How the observed signal is scaled before fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalScaling {
    /// Percent signal change around each unit's mean.
    Percent,
    None,
}

/// Study-specific model configuration (`code/model.json`).
///
/// Every field has a default so an empty object (or no file at all) yields
/// the bootcamp analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub task: String,
    /// When set, the signal is read from the preprocessed derivative in this
    /// space instead of the raw BOLD table.
    pub space: Option<String>,
    pub preproc_pipeline: String,
    pub output_pipeline: String,
    /// Glob patterns selecting confound columns (`?` one char, `*` any run).
    pub confounds: Vec<String>,
    /// Contrast expressions; empty means every condition and every pairwise difference.
    pub contrasts: Vec<String>,
    pub hrf: HrfModel,
    pub oversampling: usize,
    pub signal_scaling: SignalScaling,
    pub second_level: bool,
    pub overwrite: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            task: "mixed".to_string(),
            space: None,
            preproc_pipeline: "fmriprep-24.0.0".to_string(),
            output_pipeline: "glm".to_string(),
            confounds: vec!["rot_?".to_string(), "trans_?".to_string()],
            contrasts: Vec::new(),
            hrf: HrfModel::Spm,
            oversampling: 50,
            signal_scaling: SignalScaling::Percent,
            second_level: true,
            overwrite: false,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.task.trim().is_empty() {
            return Err(AppError::invalid("Model config: `task` must not be empty."));
        }
        if self.oversampling == 0 {
            return Err(AppError::invalid("Model config: `oversampling` must be > 0."));
        }
        if self.output_pipeline.trim().is_empty() {
            return Err(AppError::invalid("Model config: `output_pipeline` must not be empty."));
        }
        Ok(())
    }
}
