//! Second-level (group) model.
//!
//! First-level contrast effects are stacked across runs and tested against
//! zero with an intercept-only GLM per unit (a one-sample t-test).

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;
use crate::fit::glm::{ContrastStats, fit_glm};
use crate::models::{DesignMatrix, INTERCEPT};

/// Accumulates first-level effects of one contrast.
#[derive(Debug, Clone)]
pub struct GroupModel {
    units: Vec<String>,
    labels: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl GroupModel {
    pub fn new(units: Vec<String>) -> Self {
        Self {
            units,
            labels: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    /// Input labels in the order they were added.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn n_inputs(&self) -> usize {
        self.rows.len()
    }

    /// Add one run's effect map. Units must match by name and order.
    pub fn add(&mut self, label: impl Into<String>, units: &[String], effect: &[f64]) -> Result<(), AppError> {
        let label = label.into();
        if units != self.units.as_slice() {
            return Err(AppError::invalid(format!(
                "Run {label} has units that differ from the first run; group analysis needs identical units."
            )));
        }
        if effect.len() != self.units.len() {
            return Err(AppError::invalid(format!(
                "Run {label}: {} effect values for {} units.",
                effect.len(),
                self.units.len()
            )));
        }
        self.labels.push(label);
        self.rows.push(effect.to_vec());
        Ok(())
    }

    /// One-sample t-test per unit.
    ///
    /// Needs at least two inputs so the residual variance has a degree of freedom.
    pub fn fit(&self) -> Result<ContrastStats, AppError> {
        let k = self.rows.len();
        let m = self.units.len();
        let design = DesignMatrix::new(vec![INTERCEPT.to_string()], DMatrix::from_element(k, 1, 1.0))?;
        let y = DMatrix::from_fn(k, m, |i, j| self.rows[i][j]);
        let fit = fit_glm(&design, &y)?;
        fit.contrast(&DVector::from_element(1, 1.0))
    }
}
