//! Formatted terminal output for `glm run` and `glm simulate`.

use crate::app::pipeline::{AnalysisOutput, GroupOutput, RunOutput};
use crate::data::SimulatedDataset;
use crate::report::{ALPHA, ContrastSummary, summarize_contrast};

/// Full analysis summary: dataset, model, one table per run, group table.
pub fn format_analysis_summary(output: &AnalysisOutput) -> String {
    let mut out = String::new();

    out.push_str("=== glm - first/second level GLM ===\n");
    out.push_str(&format!("Root:   {}\n", output.layout.root.display()));
    out.push_str(&format!("Task:   {}\n", output.config.task));
    out.push_str(&format!(
        "Model:  hrf={:?} oversampling={} scaling={:?} confounds={:?}\n",
        output.config.hrf, output.config.oversampling, output.config.signal_scaling, output.config.confounds
    ));
    out.push_str(&format!("Output: {}\n", output.out_dir.display()));

    for run in &output.runs {
        out.push('\n');
        out.push_str(&format_run(run));
    }

    if let Some(first) = output.runs.first() {
        if !output.group.is_empty() {
            out.push('\n');
            out.push_str(&format_group(&output.group, &first.result.units));
        }
    }

    let files: usize = output.runs.iter().map(|r| r.written.len()).sum::<usize>()
        + output.group.iter().map(|g| g.written.len()).sum::<usize>();
    out.push_str(&format!("\nWrote {files} file(s).\n"));

    out
}

fn format_run(run: &RunOutput) -> String {
    let fit = &run.result.fit;
    let mut out = String::new();
    out.push_str(&format!(
        "{}: n={} p={} dof={} units={}\n",
        run.entities,
        fit.n_obs,
        fit.regressors.len(),
        fit.dof,
        fit.n_units()
    ));
    if let Some(f) = &run.result.effects_of_interest {
        let n_sig = f.p.iter().filter(|p| **p < ALPHA).count();
        out.push_str(&format!(
            "  effects of interest F({}, {}): {}/{} units p<{ALPHA}\n",
            f.df_num,
            f.df_den,
            n_sig,
            f.p.len()
        ));
    }
    let rows: Vec<ContrastSummary> = run
        .result
        .contrasts
        .iter()
        .map(|(contrast, stats)| summarize_contrast(&contrast.name, &run.result.units, stats))
        .collect();
    out.push_str(&format_table(&rows, None));
    out
}

/// Group table; each contrast reports how many runs entered its test.
fn format_group(group: &[GroupOutput], units: &[String]) -> String {
    let rows: Vec<ContrastSummary> = group
        .iter()
        .map(|g| summarize_contrast(&g.contrast, units, &g.stats))
        .collect();
    let inputs: Vec<usize> = group.iter().map(|g| g.n_inputs).collect();
    let mut out = String::from("Group (one-sample t):\n");
    out.push_str(&format_table(&rows, Some(inputs.as_slice())));
    out
}

pub fn format_simulation_summary(dataset: &SimulatedDataset) -> String {
    let mut out = String::new();
    out.push_str(&format!("Simulated dataset at {}\n", dataset.root.display()));
    out.push_str(&format!("Units: {}\n", dataset.units.join(", ")));
    for run in &dataset.runs {
        out.push_str(&format!("  {} ({} regressors)\n", run.entities, run.design.n_regressors()));
    }
    out
}

/// Contrast table; `inputs` adds a leading per-row `runs` column.
fn format_table(rows: &[ContrastSummary], inputs: Option<&[usize]>) -> String {
    let runs_col = |value: &str| match inputs {
        Some(_) => format!("{value:>5} "),
        None => String::new(),
    };

    let mut out = String::new();
    out.push_str(
        format!(
            "  {}{:<28} {:>12} {:>12} {:>10} {:>8}\n",
            runs_col("runs"),
            "contrast",
            "mean effect",
            "peak unit",
            "peak t",
            "p<alpha"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "  {}{:-<28} {:-<12} {:-<12} {:-<10} {:-<8}\n",
            runs_col("-----"),
            "",
            "",
            "",
            "",
            ""
        )
        .trim_end(),
    );
    out.push('\n');

    for (i, r) in rows.iter().enumerate() {
        let (peak_unit, peak_t) = match &r.peak {
            Some((unit, t)) => (truncate(unit, 12), format!("{t:.2}")),
            None => ("-".to_string(), "-".to_string()),
        };
        let n_runs = inputs
            .and_then(|n| n.get(i))
            .map(|n| n.to_string())
            .unwrap_or_default();
        out.push_str(
            format!(
                "  {}{:<28} {:>12.3} {:>12} {:>10} {:>8}\n",
                runs_col(&n_runs),
                truncate(&r.name, 28),
                r.mean_effect,
                peak_unit,
                peak_t,
                format!("{}/{}", r.n_significant, r.n_units),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
