//! Tail probabilities for the test statistics we report.

use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

use crate::error::AppError;

/// One-sided upper-tail p-value `P(T > t)` for Student's t with `dof` degrees of freedom.
pub fn t_upper_tail(t: f64, dof: f64) -> Result<f64, AppError> {
    if t.is_nan() {
        return Ok(f64::NAN);
    }
    if t.is_infinite() {
        return Ok(if t > 0.0 { 0.0 } else { 1.0 });
    }
    let dist = StudentsT::new(0.0, 1.0, dof)
        .map_err(|e| AppError::invalid(format!("Student t with {dof} degrees of freedom: {e}")))?;
    Ok(dist.sf(t))
}

/// Upper-tail p-value `P(F > f)` for an F(`d1`, `d2`) distribution.
pub fn f_upper_tail(f: f64, d1: f64, d2: f64) -> Result<f64, AppError> {
    if f.is_nan() {
        return Ok(f64::NAN);
    }
    if f.is_infinite() {
        return Ok(0.0);
    }
    let dist = FisherSnedecor::new(d1, d2)
        .map_err(|e| AppError::invalid(format!("F({d1}, {d2}) distribution: {e}")))?;
    Ok(dist.sf(f.max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_tail_is_half_at_zero() {
        let p = t_upper_tail(0.0, 10.0).unwrap();
        assert!((p - 0.5).abs() < 1e-12);
    }

    #[test]
    fn t_tail_known_quantile() {
        // t_{0.975, 10} = 2.228139
        let p = t_upper_tail(2.228139, 10.0).unwrap();
        assert!((p - 0.025).abs() < 1e-5, "p = {p}");
    }

    #[test]
    fn f_with_one_numerator_dof_is_two_sided_t() {
        let t: f64 = 1.7;
        let pf = f_upper_tail(t * t, 1.0, 20.0).unwrap();
        let pt = 2.0 * t_upper_tail(t, 20.0).unwrap();
        assert!((pf - pt).abs() < 1e-8, "{pf} vs {pt}");
    }

    #[test]
    fn invalid_dof_is_an_error() {
        assert!(t_upper_tail(1.0, 0.0).is_err());
    }
}
