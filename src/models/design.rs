//! Design matrix construction for a single run.
//!
//! Column order is fixed:
//!
//! 1. one HRF-convolved regressor per condition (`trial_type`, sorted)
//! 2. confound regressors selected by glob pattern, in confounds-file order
//! 3. `intercept`

use std::collections::{BTreeSet, HashSet};

use nalgebra::DMatrix;
use regex::Regex;

use crate::domain::{BoldSidecar, Event, ModelConfig};
use crate::error::AppError;
use crate::io::NumericTable;
use crate::math::condition_regressor;

pub const INTERCEPT: &str = "intercept";

/// Observations × predictors, with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    pub columns: Vec<String>,
    pub values: DMatrix<f64>,
    /// The first `n_conditions` columns are condition regressors.
    n_conditions: usize,
}

impl DesignMatrix {
    /// Wrap a matrix with column names. Names must be unique and match the width.
    pub fn new(columns: Vec<String>, values: DMatrix<f64>) -> Result<Self, AppError> {
        Self::with_conditions(columns, values, 0)
    }

    pub fn with_conditions(columns: Vec<String>, values: DMatrix<f64>, n_conditions: usize) -> Result<Self, AppError> {
        if columns.len() != values.ncols() {
            return Err(AppError::invalid(format!(
                "Design matrix has {} columns but {} names.",
                values.ncols(),
                columns.len()
            )));
        }
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(AppError::invalid(format!("Duplicate design column `{name}`.")));
            }
        }
        let n_conditions = n_conditions.min(columns.len());
        Ok(Self {
            columns,
            values,
            n_conditions,
        })
    }

    pub fn n_obs(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_regressors(&self) -> usize {
        self.values.ncols()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn conditions(&self) -> &[String] {
        &self.columns[..self.n_conditions]
    }
}

/// Build the design matrix of one run.
///
/// `n_frames` is the number of volumes; frame `i` is sampled at `i · TR`.
pub fn build_design_matrix(
    events: &[Event],
    sidecar: &BoldSidecar,
    n_frames: usize,
    confounds: Option<&NumericTable>,
    config: &ModelConfig,
) -> Result<DesignMatrix, AppError> {
    if n_frames == 0 {
        return Err(AppError::invalid("Cannot build a design matrix for zero volumes."));
    }
    let tr = sidecar.repetition_time;
    let scan_length = n_frames as f64 * tr;

    // Slice-timing correction moves the effective sample time, so event
    // onsets move by the same amount before convolution.
    let shift = sidecar.start_time.unwrap_or(0.0);
    let mut kept: Vec<Event> = Vec::with_capacity(events.len());
    for event in events {
        let onset = event.onset - shift;
        if onset >= scan_length {
            log::warn!(
                "dropping `{}` event at {:.2}s: starts after the scan ends ({scan_length:.2}s)",
                event.trial_type,
                onset
            );
            continue;
        }
        kept.push(Event {
            onset,
            ..event.clone()
        });
    }

    let conditions: BTreeSet<&str> = kept.iter().map(|e| e.trial_type.as_str()).collect();
    if conditions.is_empty() {
        log::warn!("no events fall inside the scan; the model has no condition regressors");
    }

    let mut columns: Vec<String> = Vec::new();
    let mut regressors: Vec<Vec<f64>> = Vec::new();

    for condition in &conditions {
        let timing: Vec<(f64, f64)> = kept
            .iter()
            .filter(|e| e.trial_type == *condition)
            .map(|e| (e.onset, e.duration))
            .collect();
        columns.push((*condition).to_string());
        regressors.push(condition_regressor(&timing, n_frames, tr, config.oversampling, config.hrf));
    }
    let n_conditions = columns.len();

    if let Some(table) = confounds {
        if table.n_rows() != n_frames {
            return Err(AppError::invalid(format!(
                "Confounds have {} rows but the run has {n_frames} volumes.",
                table.n_rows()
            )));
        }
        let patterns = compile_patterns(&config.confounds)?;
        for (idx, name) in table.columns.iter().enumerate() {
            if patterns.iter().any(|re| re.is_match(name)) {
                columns.push(name.clone());
                regressors.push(table.data.column(idx).iter().copied().collect());
            }
        }
    }

    columns.push(INTERCEPT.to_string());
    regressors.push(vec![1.0; n_frames]);

    let values = DMatrix::from_fn(n_frames, regressors.len(), |i, j| regressors[j][i]);
    DesignMatrix::with_conditions(columns, values, n_conditions)
}

/// Translate glob patterns (`?` one character, `*` any run) to anchored regexes.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, AppError> {
    patterns
        .iter()
        .map(|pattern| {
            let mut re = String::from("^");
            for ch in pattern.chars() {
                match ch {
                    '?' => re.push('.'),
                    '*' => re.push_str(".*"),
                    other => re.push_str(&regex::escape(&other.to_string())),
                }
            }
            re.push('$');
            Regex::new(&re).map_err(|e| AppError::invalid(format!("Invalid confound pattern '{pattern}': {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HrfModel;

    fn boxcar_config() -> ModelConfig {
        ModelConfig {
            hrf: HrfModel::None,
            oversampling: 2,
            ..ModelConfig::default()
        }
    }

    fn event(onset: f64, duration: f64, trial_type: &str) -> Event {
        Event {
            onset,
            duration,
            trial_type: trial_type.to_string(),
        }
    }

    fn sidecar(tr: f64) -> BoldSidecar {
        BoldSidecar {
            repetition_time: tr,
            start_time: None,
        }
    }

    #[test]
    fn conditions_then_confounds_then_intercept() {
        let events = [event(0.0, 2.0, "visual"), event(4.0, 2.0, "motor")];
        let confounds = NumericTable {
            columns: vec![
                "csf".to_string(),
                "rot_x".to_string(),
                "rot_x_derivative1".to_string(),
                "trans_y".to_string(),
            ],
            data: DMatrix::from_fn(4, 4, |i, j| (i * 4 + j) as f64),
        };

        let design = build_design_matrix(&events, &sidecar(2.0), 4, Some(&confounds), &boxcar_config()).unwrap();
        assert_eq!(design.columns, vec!["motor", "visual", "rot_x", "trans_y", "intercept"]);
        assert_eq!(design.conditions(), &["motor".to_string(), "visual".to_string()]);
        assert_eq!(design.n_obs(), 4);

        // motor block covers frame 2, visual covers frame 0.
        assert_eq!(design.values.column(0).iter().copied().collect::<Vec<_>>(), vec![0.0, 0.0, 1.0, 0.0]);
        assert_eq!(design.values.column(1).iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(design.values[(3, 2)], 13.0);
        assert!(design.values.column(4).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn start_time_shifts_onsets_earlier() {
        let events = [event(4.0, 2.0, "motor")];
        let shifted = BoldSidecar {
            repetition_time: 2.0,
            start_time: Some(2.0),
        };
        let design = build_design_matrix(&events, &shifted, 4, None, &boxcar_config()).unwrap();
        assert_eq!(design.values.column(0).iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn events_after_scan_end_are_dropped() {
        let events = [event(0.0, 2.0, "motor"), event(100.0, 2.0, "music")];
        let design = build_design_matrix(&events, &sidecar(2.0), 4, None, &boxcar_config()).unwrap();
        assert_eq!(design.columns, vec!["motor", "intercept"]);
    }

    #[test]
    fn confound_row_mismatch_is_rejected() {
        let confounds = NumericTable {
            columns: vec!["rot_x".to_string()],
            data: DMatrix::zeros(3, 1),
        };
        let err = build_design_matrix(&[], &sidecar(2.0), 4, Some(&confounds), &boxcar_config()).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn glob_patterns_are_anchored() {
        let patterns = compile_patterns(&["rot_?".to_string(), "a_comp_cor_*".to_string()]).unwrap();
        let matches = |name: &str| patterns.iter().any(|re| re.is_match(name));
        assert!(matches("rot_z"));
        assert!(!matches("rot_z_power2"));
        assert!(matches("a_comp_cor_00"));
        assert!(!matches("t_comp_cor_00"));
    }

    #[test]
    fn condition_count_is_capped_at_width() {
        let design =
            DesignMatrix::with_conditions(vec!["motor".to_string(), INTERCEPT.to_string()], DMatrix::zeros(3, 2), 5)
                .unwrap();
        assert_eq!(design.conditions(), &["motor".to_string(), INTERCEPT.to_string()]);
        let none = DesignMatrix::new(vec![INTERCEPT.to_string()], DMatrix::zeros(3, 1)).unwrap();
        assert!(none.conditions().is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = DesignMatrix::new(vec!["a".to_string(), "a".to_string()], DMatrix::zeros(3, 2)).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }
}
