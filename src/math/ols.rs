//! Ordinary least squares solver.
//!
//! We solve
//!
//! ```text
//! minimize ‖Y - Xβ‖²
//! ```
//!
//! for every column of `Y` at once (one column per unit of observation).
//!
//! Implementation choices:
//! - SVD of `X` gives both the solution (`β = V Σ⁻¹ Uᵗ Y`) and the unscaled
//!   covariance `(XᵗX)⁻¹ = V Σ⁻² Vᵗ` without forming `XᵗX` explicitly.
//! - The numerical rank counts singular values above
//!   `max(max(n, p) · ε, RCOND) · σ_max`. Anything below full column rank is rejected
//!   rather than silently regularized, because the downstream t statistics
//!   would be meaningless.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;

/// Relative floor for the rank tolerance; exactly collinear columns land far below it.
const RCOND: f64 = 1e-10;

/// Solution of a multi-response least squares problem.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    /// `p × m` coefficients, one column per response.
    pub betas: DMatrix<f64>,
    /// `p × p` unscaled covariance `(XᵗX)⁻¹`.
    pub xtx_inv: DMatrix<f64>,
    pub rank: usize,
}

/// Solve `X β = Y` in the least-squares sense.
///
/// Fails with `SingularDesignMatrix` when `X` does not have full column rank.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<LeastSquares, AppError> {
    let (n, p) = x.shape();
    if p == 0 {
        return Err(AppError::invalid("Design matrix has no columns."));
    }
    if y.nrows() != n {
        return Err(AppError::invalid(format!(
            "Design matrix has {n} rows but the response has {} rows.",
            y.nrows()
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(AppError::invalid("Design matrix contains non-finite values."));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(AppError::invalid("Response data contains non-finite values."));
    }

    let svd = x.clone().svd(true, true);
    let sigma_max = svd.singular_values.max();
    let tol = (n.max(p) as f64 * f64::EPSILON).max(RCOND) * sigma_max;
    let rank = svd.singular_values.iter().filter(|&&s| s > tol).count();
    if rank < p {
        return Err(AppError::SingularDesignMatrix { rank, columns: p });
    }

    let (Some(u), Some(v_t)) = (svd.u.as_ref(), svd.v_t.as_ref()) else {
        return Err(AppError::invalid("SVD did not produce singular vectors."));
    };

    let inv_s: DVector<f64> = svd.singular_values.map(|s| 1.0 / s);
    let inv_s2: DVector<f64> = inv_s.map(|s| s * s);

    let v = v_t.transpose();
    let betas = &v * DMatrix::from_diagonal(&inv_s) * (u.transpose() * y);

    let xtx_inv = &v * DMatrix::from_diagonal(&inv_s2) * v_t;

    Ok(LeastSquares { betas, xtx_inv, rank })
}
