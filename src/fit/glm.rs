//! Ordinary least squares GLM with per-unit statistics.
//!
//! Given a design `X` (`n × p`) and responses `Y` (`n × m`, one column per
//! unit) we compute, for every unit:
//!
//! - `β = (XᵗX)⁻¹XᵗY`
//! - residuals `Y − Xβ` and `σ² = RSS / (n − p)`
//! - standard errors `sqrt(σ² · diag((XᵗX)⁻¹))` and t statistics
//!
//! Contrasts and F tests reuse the same `(XᵗX)⁻¹` and `σ²`.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;
use crate::math::{f_upper_tail, solve_least_squares, t_upper_tail};
use crate::models::DesignMatrix;

/// Result of fitting one design against every unit.
#[derive(Debug, Clone)]
pub struct GlmFit {
    pub regressors: Vec<String>,
    /// `p × m`
    pub betas: DMatrix<f64>,
    /// `n × m`
    pub residuals: DMatrix<f64>,
    /// Residual variance per unit.
    pub sigma2: DVector<f64>,
    /// `p × p`
    pub xtx_inv: DMatrix<f64>,
    pub n_obs: usize,
    pub dof: usize,
}

/// Per-unit statistics of a single contrast vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ContrastStats {
    pub effect: Vec<f64>,
    pub variance: Vec<f64>,
    pub t: Vec<f64>,
    /// One-sided upper-tail p-values of `t`.
    pub p: Vec<f64>,
}

/// Per-unit statistics of a multi-row F test.
#[derive(Debug, Clone, PartialEq)]
pub struct FTestStats {
    pub f: Vec<f64>,
    pub p: Vec<f64>,
    pub df_num: usize,
    pub df_den: usize,
}

/// Fit the GLM for every column of `y`.
///
/// Fails with `InsufficientObservations` when `n ≤ p` and with
/// `SingularDesignMatrix` when the design is rank deficient.
pub fn fit_glm(design: &DesignMatrix, y: &DMatrix<f64>) -> Result<GlmFit, AppError> {
    let n = design.n_obs();
    let p = design.n_regressors();
    if n <= p {
        return Err(AppError::InsufficientObservations { n_obs: n, n_params: p });
    }

    let ls = solve_least_squares(&design.values, y)?;
    let residuals = y - &design.values * &ls.betas;
    let dof = n - p;
    let sigma2 = DVector::from_iterator(
        residuals.ncols(),
        residuals.column_iter().map(|r| r.norm_squared() / dof as f64),
    );

    Ok(GlmFit {
        regressors: design.columns.clone(),
        betas: ls.betas,
        residuals,
        sigma2,
        xtx_inv: ls.xtx_inv,
        n_obs: n,
        dof,
    })
}

/// Convenience wrapper for a single response vector.
pub fn fit_glm_vector(design: &DesignMatrix, y: &DVector<f64>) -> Result<GlmFit, AppError> {
    let y = DMatrix::from_column_slice(y.len(), 1, y.as_slice());
    fit_glm(design, &y)
}

impl GlmFit {
    pub fn n_units(&self) -> usize {
        self.betas.ncols()
    }

    /// `p × m` standard errors.
    pub fn standard_errors(&self) -> DMatrix<f64> {
        let p = self.betas.nrows();
        DMatrix::from_fn(p, self.n_units(), |i, j| (self.sigma2[j] * self.xtx_inv[(i, i)]).sqrt())
    }

    /// `p × m` t statistics of each coefficient.
    pub fn t_values(&self) -> DMatrix<f64> {
        let se = self.standard_errors();
        self.betas.zip_map(&se, |b, s| b / s)
    }

    /// Evaluate a contrast vector `c`: `cᵗβ`, `σ² cᵗ(XᵗX)⁻¹c`, t, p.
    pub fn contrast(&self, weights: &DVector<f64>) -> Result<ContrastStats, AppError> {
        if weights.len() != self.betas.nrows() {
            return Err(AppError::invalid(format!(
                "Contrast has {} weights for {} regressors.",
                weights.len(),
                self.betas.nrows()
            )));
        }

        let unscaled = (weights.transpose() * &self.xtx_inv * weights)[(0, 0)];
        let effect: Vec<f64> = (weights.transpose() * &self.betas).iter().copied().collect();
        let variance: Vec<f64> = self.sigma2.iter().map(|s2| s2 * unscaled).collect();
        let t: Vec<f64> = effect
            .iter()
            .zip(&variance)
            .map(|(e, v)| e / v.sqrt())
            .collect();
        let p = t
            .iter()
            .map(|t| t_upper_tail(*t, self.dof as f64))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ContrastStats { effect, variance, t, p })
    }

    /// F test of `C β = 0` for a `q × p` contrast matrix.
    pub fn f_test(&self, c: &DMatrix<f64>) -> Result<FTestStats, AppError> {
        let q = c.nrows();
        if q == 0 || c.ncols() != self.betas.nrows() {
            return Err(AppError::invalid(format!(
                "F contrast must be q × {} with q > 0, got {} × {}.",
                self.betas.nrows(),
                q,
                c.ncols()
            )));
        }

        let middle = (c * &self.xtx_inv * c.transpose())
            .try_inverse()
            .ok_or_else(|| AppError::invalid("F contrast rows are linearly dependent."))?;
        let cb = c * &self.betas;

        let f: Vec<f64> = cb
            .column_iter()
            .zip(self.sigma2.iter())
            .map(|(col, s2)| {
                let quad = (col.transpose() * &middle * col)[(0, 0)];
                quad / (q as f64 * s2)
            })
            .collect();
        let p = f
            .iter()
            .map(|f| f_upper_tail(*f, q as f64, self.dof as f64))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FTestStats {
            f,
            p,
            df_num: q,
            df_den: self.dof,
        })
    }
}
