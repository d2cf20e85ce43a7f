//! First-level (per-run) model: signal scaling, fit, contrasts.

use nalgebra::DMatrix;

use crate::domain::SignalScaling;
use crate::error::AppError;
use crate::fit::glm::{ContrastStats, FTestStats, GlmFit, fit_glm};
use crate::models::{Contrast, DesignMatrix, parse_contrast};

/// Everything computed for one run.
#[derive(Debug, Clone)]
pub struct FirstLevelResult {
    pub units: Vec<String>,
    pub fit: GlmFit,
    pub contrasts: Vec<(Contrast, ContrastStats)>,
    /// F test over all condition regressors; `None` when the run has no conditions.
    pub effects_of_interest: Option<FTestStats>,
}

/// Rescale every unit (column) of `data`.
///
/// `Percent` maps each unit to `100 · (y / mean − 1)`; a unit whose mean is
/// zero cannot be expressed as a percentage and is only centered.
pub fn scale_signal(data: &DMatrix<f64>, scaling: SignalScaling) -> DMatrix<f64> {
    match scaling {
        SignalScaling::None => data.clone(),
        SignalScaling::Percent => {
            let mut out = data.clone();
            for (j, mut column) in out.column_iter_mut().enumerate() {
                let mean = column.mean();
                if mean.abs() > f64::EPSILON {
                    column.apply(|v| *v = 100.0 * (*v / mean - 1.0));
                } else {
                    log::warn!("unit {j} has zero mean; centering instead of percent scaling");
                    column.apply(|v| *v -= mean);
                }
            }
            out
        }
    }
}

/// Fit one run and evaluate the requested contrast expressions.
pub fn fit_first_level(
    design: &DesignMatrix,
    units: &[String],
    signal: &DMatrix<f64>,
    scaling: SignalScaling,
    contrasts: &[String],
) -> Result<FirstLevelResult, AppError> {
    if signal.ncols() != units.len() {
        return Err(AppError::invalid(format!(
            "Signal has {} columns for {} units.",
            signal.ncols(),
            units.len()
        )));
    }
    if signal.nrows() != design.n_obs() {
        return Err(AppError::invalid(format!(
            "Signal has {} volumes but the design matrix has {} rows.",
            signal.nrows(),
            design.n_obs()
        )));
    }

    let y = scale_signal(signal, scaling);
    let fit = fit_glm(design, &y)?;

    let mut evaluated = Vec::with_capacity(contrasts.len());
    for expression in contrasts {
        let contrast = parse_contrast(expression, &design.columns)?;
        let stats = fit.contrast(&contrast.weights)?;
        evaluated.push((contrast, stats));
    }

    let n_conditions = design.conditions().len();
    let effects_of_interest = if n_conditions > 0 {
        let c = DMatrix::from_fn(n_conditions, design.n_regressors(), |i, j| if i == j { 1.0 } else { 0.0 });
        Some(fit.f_test(&c)?)
    } else {
        None
    };

    Ok(FirstLevelResult {
        units: units.to_vec(),
        fit,
        contrasts: evaluated,
        effects_of_interest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_scaling_centers_on_zero() {
        let data = DMatrix::from_row_slice(3, 2, &[90.0, 0.0, 100.0, 1.0, 110.0, -1.0]);
        let scaled = scale_signal(&data, SignalScaling::Percent);
        assert!((scaled[(0, 0)] + 10.0).abs() < 1e-12);
        assert!(scaled[(1, 0)].abs() < 1e-12);
        assert!((scaled[(2, 0)] - 10.0).abs() < 1e-12);
        // Zero-mean unit is left centered.
        assert_eq!(scaled[(1, 1)], 1.0);
    }

    #[test]
    fn fits_conditions_and_contrasts() {
        let n = 40;
        let values = DMatrix::from_fn(n, 3, |i, j| match j {
            0 => if (i / 5) % 2 == 0 { 1.0 } else { 0.0 },
            1 => if (i / 4) % 3 == 0 { 1.0 } else { 0.0 },
            _ => 1.0,
        });
        let design = DesignMatrix::with_conditions(
            vec!["motor".into(), "music".into(), "intercept".into()],
            values.clone(),
            2,
        )
        .unwrap();
        let truth = nalgebra::DVector::from_row_slice(&[3.0, 1.0, 100.0]);
        let y = &values * truth;
        let noise = |i: usize| 0.01 * ((i * 7 % 5) as f64 - 2.0);
        let signal = DMatrix::from_fn(n, 1, |i, _| y[i] + noise(i));

        let result = fit_first_level(
            &design,
            &["roi-1".to_string()],
            &signal,
            SignalScaling::None,
            &["motor - music".to_string()],
        )
        .unwrap();

        let (contrast, stats) = &result.contrasts[0];
        assert_eq!(contrast.name, "MotorVsMusic");
        assert!((stats.effect[0] - 2.0).abs() < 0.05, "effect {}", stats.effect[0]);
        let f = result.effects_of_interest.as_ref().unwrap();
        assert_eq!(f.df_num, 2);
    }

    #[test]
    fn volume_mismatch_is_rejected() {
        let design = DesignMatrix::new(vec!["intercept".into()], DMatrix::from_element(5, 1, 1.0)).unwrap();
        let signal = DMatrix::from_element(4, 1, 1.0);
        let err = fit_first_level(&design, &["u".to_string()], &signal, SignalScaling::None, &[]).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
