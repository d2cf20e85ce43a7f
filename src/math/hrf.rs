//! Haemodynamic response and event-regressor construction.
//!
//! The SPM canonical HRF is a difference of two gamma densities:
//!
//! - `h(t) = g(t; 6, 1) - g(t; 16, 1) / 6`
//!
//! sampled on a grid of `TR / oversampling` seconds over 32 s, shifted by one
//! grid step, and normalized to unit sum so a sustained block converges to an
//! amplitude of one.
//!
//! Regressors are built on the same oversampled grid (boxcar per event,
//! convolved with the HRF) and then read back at the frame times `i · TR`.

use statrs::function::gamma::ln_gamma;

use crate::domain::HrfModel;

const HRF_LENGTH_S: f64 = 32.0;
const PEAK_DELAY: f64 = 6.0;
const UNDERSHOOT_DELAY: f64 = 16.0;
const UNDERSHOOT_RATIO: f64 = 0.167;

/// Gamma density with unit scale.
fn gamma_pdf(x: f64, shape: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    ((shape - 1.0) * x.ln() - x - ln_gamma(shape)).exp()
}

/// SPM canonical HRF sampled every `tr / oversampling` seconds.
pub fn spm_hrf(tr: f64, oversampling: usize) -> Vec<f64> {
    let dt = tr / oversampling.max(1) as f64;
    let n = ((HRF_LENGTH_S / dt).round() as usize).max(1);

    let mut hrf: Vec<f64> = (0..n)
        .map(|k| {
            let t = k as f64 * dt - dt;
            gamma_pdf(t, PEAK_DELAY) - UNDERSHOOT_RATIO * gamma_pdf(t, UNDERSHOOT_DELAY)
        })
        .collect();

    let total: f64 = hrf.iter().sum();
    if total.abs() > f64::EPSILON {
        for v in &mut hrf {
            *v /= total;
        }
    }
    hrf
}

/// Build one condition regressor sampled at `n_frames` frame times.
///
/// `events` are `(onset, duration)` pairs in seconds. Onsets before zero are
/// clipped to the start of the acquisition; zero-duration events become a
/// single-sample impulse on the oversampled grid.
pub fn condition_regressor(
    events: &[(f64, f64)],
    n_frames: usize,
    tr: f64,
    oversampling: usize,
    hrf: HrfModel,
) -> Vec<f64> {
    let oversampling = oversampling.max(1);
    let dt = tr / oversampling as f64;
    let n_hr = n_frames * oversampling;

    let mut boxcar = vec![0.0; n_hr];
    for &(onset, duration) in events {
        let start = (onset / dt).round();
        let mut end = ((onset + duration.max(0.0)) / dt).round();
        if end <= start {
            end = start + 1.0;
        }
        if end <= 0.0 {
            continue;
        }
        let start = start.max(0.0) as usize;
        let end = (end as usize).min(n_hr);
        for v in boxcar.iter_mut().take(end).skip(start) {
            *v += 1.0;
        }
    }

    let signal = match hrf {
        HrfModel::None => boxcar,
        HrfModel::Spm => convolve(&boxcar, &spm_hrf(tr, oversampling)),
    };

    (0..n_frames).map(|i| signal[i * oversampling]).collect()
}

/// Causal convolution truncated to the length of `signal`.
fn convolve(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; signal.len()];
    for (i, &s) in signal.iter().enumerate() {
        if s == 0.0 {
            continue;
        }
        for (k, &h) in kernel.iter().enumerate() {
            let Some(slot) = out.get_mut(i + k) else { break };
            *slot += s * h;
        }
    }
    out
}
