//! Reporting utilities: per-contrast summaries and formatted terminal output.

use crate::fit::ContrastStats;

mod format;

pub use format::*;

/// Significance level used when counting units in the summaries.
pub const ALPHA: f64 = 0.05;

/// Condensed view of one contrast across units.
#[derive(Debug, Clone, PartialEq)]
pub struct ContrastSummary {
    pub name: String,
    pub mean_effect: f64,
    /// Unit with the largest t, if any t is finite.
    pub peak: Option<(String, f64)>,
    /// Units with one-sided `p < ALPHA`.
    pub n_significant: usize,
    pub n_units: usize,
}

pub fn summarize_contrast(name: &str, units: &[String], stats: &ContrastStats) -> ContrastSummary {
    let finite: Vec<f64> = stats.effect.iter().copied().filter(|v| v.is_finite()).collect();
    let mean_effect = if finite.is_empty() {
        f64::NAN
    } else {
        finite.iter().sum::<f64>() / finite.len() as f64
    };

    let peak = units
        .iter()
        .zip(&stats.t)
        .filter(|(_, t)| t.is_finite())
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(unit, t)| (unit.clone(), *t));

    ContrastSummary {
        name: name.to_string(),
        mean_effect,
        peak,
        n_significant: stats.p.iter().filter(|p| **p < ALPHA).count(),
        n_units: units.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_picks_peak_and_counts_significant_units() {
        let units = vec!["roi-01".to_string(), "roi-02".to_string(), "roi-03".to_string()];
        let stats = ContrastStats {
            effect: vec![1.0, 3.0, f64::NAN],
            variance: vec![0.1, 0.1, f64::NAN],
            t: vec![3.2, 9.5, f64::NAN],
            p: vec![0.004, 1e-6, f64::NAN],
        };
        let summary = summarize_contrast("Motor", &units, &stats);
        assert_eq!(summary.peak, Some(("roi-02".to_string(), 9.5)));
        assert_eq!(summary.n_significant, 2);
        assert_eq!(summary.n_units, 3);
        assert!((summary.mean_effect - 2.0).abs() < 1e-12);
    }

    #[test]
    fn all_nan_has_no_peak() {
        let units = vec!["u".to_string()];
        let stats = ContrastStats {
            effect: vec![f64::NAN],
            variance: vec![f64::NAN],
            t: vec![f64::NAN],
            p: vec![f64::NAN],
        };
        let summary = summarize_contrast("X", &units, &stats);
        assert!(summary.peak.is_none());
        assert!(summary.mean_effect.is_nan());
        assert_eq!(summary.n_significant, 0);
    }
}
