//! Dataset layout: locating `sourcedata/raw` and `sourcedata/derivatives`
//! and discovering the runs to model.
//!
//! The layout is a fixed convention:
//!
//! ```text
//! <root>/
//!   code/model.json
//!   sourcedata/raw/sub-<s>/[ses-<x>/]func/<stem>_bold.tsv|_bold.json|_events.tsv
//!   sourcedata/derivatives/<pipeline>/...
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::RunEntities;
use crate::error::AppError;

pub const RAW_DIR: &str = "sourcedata/raw";
pub const DERIVATIVES_DIR: &str = "sourcedata/derivatives";
pub const CODE_DIR: &str = "code";
pub const ROOT_ENV_VAR: &str = "GLM_DATASET_ROOT";

/// Resolved absolute paths of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    pub root: PathBuf,
    pub raw: PathBuf,
    pub derivatives: PathBuf,
}

/// Input files of a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFiles {
    pub entities: RunEntities,
    pub bold: PathBuf,
    /// Applicable `_bold.json` files, least specific first.
    pub sidecars: Vec<PathBuf>,
    pub events: PathBuf,
}

impl RunFiles {
    /// `<preproc>/sub-<s>/[ses-<x>/]func/<stem>_desc-confounds_timeseries.tsv`
    pub fn confounds_path(&self, preproc_dir: &Path) -> PathBuf {
        preproc_dir
            .join(self.entities.func_dir())
            .join(format!("{}_desc-confounds_timeseries.tsv", self.entities.stem()))
    }

    /// `<preproc>/sub-<s>/[ses-<x>/]func/<stem>_space-<space>_desc-preproc_bold.tsv`
    pub fn preproc_bold_path(&self, preproc_dir: &Path, space: &str) -> PathBuf {
        preproc_dir
            .join(self.entities.func_dir())
            .join(format!("{}_space-{space}_desc-preproc_bold.tsv", self.entities.stem()))
    }
}

impl DatasetLayout {
    /// Resolve raw and derivative subtrees under `root`.
    ///
    /// Fails with `PathNotFound` when either directory is missing.
    pub fn locate(root: &Path) -> Result<Self, AppError> {
        let root = canonical_dir(root)?;
        let raw = canonical_dir(&root.join(RAW_DIR))?;
        let derivatives = canonical_dir(&root.join(DERIVATIVES_DIR))?;
        Ok(Self { root, raw, derivatives })
    }

    /// Pick the dataset root: explicit flag, then `GLM_DATASET_ROOT`
    /// (`.env` is honored), then the working directory.
    ///
    /// Running from inside `code/` resolves to its parent.
    pub fn resolve_root(explicit: Option<&Path>) -> Result<PathBuf, AppError> {
        if let Some(path) = explicit {
            return Ok(strip_code_dir(path.to_path_buf()));
        }

        dotenvy::dotenv().ok();
        if let Ok(value) = std::env::var(ROOT_ENV_VAR) {
            if !value.trim().is_empty() {
                return Ok(strip_code_dir(PathBuf::from(value.trim())));
            }
        }

        let cwd = std::env::current_dir().map_err(|e| AppError::io(".", e))?;
        Ok(strip_code_dir(cwd))
    }

    pub fn pipeline_dir(&self, pipeline: &str) -> PathBuf {
        self.derivatives.join(pipeline)
    }

    /// Default location of the model configuration.
    pub fn model_config_path(&self) -> PathBuf {
        self.root.join(CODE_DIR).join("model.json")
    }

    /// List every raw BOLD run of `task`, sorted by subject/session/run.
    pub fn discover_runs(&self, task: &str) -> Result<Vec<RunFiles>, AppError> {
        let mut runs = Vec::new();

        for subject_dir in list_dirs(&self.raw, "sub-")? {
            let func = subject_dir.join("func");
            if func.is_dir() {
                collect_bold_files(&self.raw, &func, task, &mut runs)?;
            }
            for session_dir in list_dirs(&subject_dir, "ses-")? {
                let func = session_dir.join("func");
                if func.is_dir() {
                    collect_bold_files(&self.raw, &func, task, &mut runs)?;
                }
            }
        }

        if runs.is_empty() {
            return Err(AppError::invalid(format!(
                "No `_bold.tsv` runs found for task '{task}' under '{}'.",
                self.raw.display()
            )));
        }

        runs.sort_by(|a, b| a.entities.cmp(&b.entities));
        Ok(runs)
    }
}

fn canonical_dir(path: &Path) -> Result<PathBuf, AppError> {
    let resolved = fs::canonicalize(path).map_err(|_| AppError::PathNotFound {
        path: path.to_path_buf(),
    })?;
    if !resolved.is_dir() {
        return Err(AppError::PathNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(resolved)
}

fn strip_code_dir(path: PathBuf) -> PathBuf {
    if path.file_name().is_some_and(|name| name == CODE_DIR) {
        if let Some(parent) = path.parent() {
            return parent.to_path_buf();
        }
    }
    path
}

fn list_dirs(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, AppError> {
    let entries = fs::read_dir(dir).map_err(|e| AppError::io(dir, e))?;
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AppError::io(dir, e))?;
        let path = entry.path();
        let matches = entry.file_name().to_str().is_some_and(|name| name.starts_with(prefix));
        if matches && path.is_dir() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Metadata file name built from whichever entities are kept.
fn entity_name(entities: &RunEntities, subject: bool, session: bool, run: bool, suffix: &str) -> String {
    let mut parts = Vec::new();
    if subject {
        parts.push(format!("sub-{}", entities.subject));
    }
    if let (true, Some(ses)) = (session, &entities.session) {
        parts.push(format!("ses-{ses}"));
    }
    parts.push(format!("task-{}", entities.task));
    if let (true, Some(r)) = (run, &entities.run) {
        parts.push(format!("run-{r}"));
    }
    format!("{}_{suffix}", parts.join("_"))
}

/// Inheritance candidates for a run's `suffix` file, least specific first.
///
/// Levels go from the raw root down to the run's `func/` directory. A level
/// outside the subject directory cannot name the subject, and only levels
/// inside a session may name the session. Within a level, names with fewer
/// entities come first.
fn inherited_candidates(raw: &Path, func_dir: &Path, entities: &RunEntities, suffix: &str) -> Vec<PathBuf> {
    let subject_dir = raw.join(format!("sub-{}", entities.subject));
    let mut levels: Vec<(PathBuf, bool, bool)> = vec![(raw.to_path_buf(), false, false), (subject_dir.clone(), true, false)];
    if let Some(ses) = &entities.session {
        levels.push((subject_dir.join(format!("ses-{ses}")), true, true));
    }
    levels.push((func_dir.to_path_buf(), true, entities.session.is_some()));

    let mut out: Vec<PathBuf> = Vec::new();
    for (dir, subject, in_session) in levels {
        let sessions: &[bool] = if in_session && entities.session.is_some() { &[false, true] } else { &[false] };
        let runs: &[bool] = if entities.run.is_some() { &[false, true] } else { &[false] };
        let mut names: Vec<(usize, String)> = Vec::new();
        for &session in sessions {
            for &run in runs {
                names.push((session as usize + run as usize, entity_name(entities, subject, session, run, suffix)));
            }
        }
        names.sort_by_key(|(n, _)| *n);
        for (_, name) in names {
            let path = dir.join(name);
            if !out.contains(&path) {
                out.push(path);
            }
        }
    }
    out
}

fn collect_bold_files(raw: &Path, func_dir: &Path, task: &str, out: &mut Vec<RunFiles>) -> Result<(), AppError> {
    let entries = fs::read_dir(func_dir).map_err(|e| AppError::io(func_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| AppError::io(func_dir, e))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !name.ends_with("_bold.tsv") {
            continue;
        }

        let (entities, _) = RunEntities::parse_filename(&name)?;
        if entities.task != task {
            continue;
        }

        let stem = entities.stem();
        let sidecars: Vec<PathBuf> = inherited_candidates(raw, func_dir, &entities, "bold.json")
            .into_iter()
            .filter(|p| p.is_file())
            .collect();
        if sidecars.is_empty() {
            return Err(AppError::PathNotFound {
                path: func_dir.join(format!("{stem}_bold.json")),
            });
        }
        let events = inherited_candidates(raw, func_dir, &entities, "events.tsv")
            .into_iter()
            .rev()
            .find(|p| p.is_file())
            .ok_or_else(|| AppError::PathNotFound {
                path: func_dir.join(format!("{stem}_events.tsv")),
            })?;

        out.push(RunFiles {
            entities,
            bold: entry.path(),
            sidecars,
            events,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn skeleton() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(RAW_DIR)).unwrap();
        fs::create_dir_all(dir.path().join(DERIVATIVES_DIR)).unwrap();
        dir
    }

    #[test]
    fn locate_resolves_absolute_subtrees() {
        let dir = skeleton();
        let layout = DatasetLayout::locate(dir.path()).unwrap();
        assert!(layout.raw.is_absolute());
        assert!(layout.raw.ends_with("sourcedata/raw"));
        assert!(layout.derivatives.ends_with("sourcedata/derivatives"));
    }

    #[test]
    fn missing_raw_is_path_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(DERIVATIVES_DIR)).unwrap();
        match DatasetLayout::locate(dir.path()) {
            Err(AppError::PathNotFound { path }) => assert!(path.ends_with("sourcedata/raw")),
            other => panic!("expected PathNotFound, got {other:?}"),
        }
    }

    #[test]
    fn missing_derivatives_is_path_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(RAW_DIR)).unwrap();
        assert!(matches!(
            DatasetLayout::locate(dir.path()),
            Err(AppError::PathNotFound { .. })
        ));
    }

    #[test]
    fn code_dir_resolves_to_parent() {
        let root = strip_code_dir(PathBuf::from("/data/bootcamp/code"));
        assert_eq!(root, PathBuf::from("/data/bootcamp"));
        let unchanged = strip_code_dir(PathBuf::from("/data/bootcamp"));
        assert_eq!(unchanged, PathBuf::from("/data/bootcamp"));
    }

    #[test]
    fn discovers_runs_across_sessions_in_order() {
        let dir = skeleton();
        let raw = dir.path().join(RAW_DIR);
        for stem in [
            "sub-02/func/sub-02_task-mixed_run-1",
            "sub-01/ses-b/func/sub-01_ses-b_task-mixed_run-1",
            "sub-01/ses-a/func/sub-01_ses-a_task-mixed_run-2",
            "sub-01/ses-a/func/sub-01_ses-a_task-rest_run-1",
        ] {
            for suffix in ["_bold.tsv", "_bold.json", "_events.tsv"] {
                touch(&raw.join(format!("{stem}{suffix}")));
            }
        }

        let layout = DatasetLayout::locate(dir.path()).unwrap();
        let runs = layout.discover_runs("mixed").unwrap();
        let stems: Vec<String> = runs.iter().map(|r| r.entities.stem()).collect();
        assert_eq!(
            stems,
            vec![
                "sub-01_ses-a_task-mixed_run-2",
                "sub-01_ses-b_task-mixed_run-1",
                "sub-02_task-mixed_run-1",
            ]
        );
    }

    #[test]
    fn run_without_events_is_path_not_found() {
        let dir = skeleton();
        let func = dir.path().join(RAW_DIR).join("sub-01/func");
        touch(&func.join("sub-01_task-mixed_bold.tsv"));
        touch(&func.join("sub-01_task-mixed_bold.json"));

        let layout = DatasetLayout::locate(dir.path()).unwrap();
        match layout.discover_runs("mixed") {
            Err(AppError::PathNotFound { path }) => {
                assert!(path.ends_with("sub-01_task-mixed_events.tsv"));
            }
            other => panic!("expected PathNotFound, got {other:?}"),
        }
    }

    #[test]
    fn sidecars_are_inherited_from_higher_levels() {
        let dir = skeleton();
        let raw = dir.path().join(RAW_DIR);
        touch(&raw.join("task-mixed_bold.json"));
        touch(&raw.join("task-mixed_events.tsv"));
        touch(&raw.join("sub-01/sub-01_task-mixed_bold.json"));
        let func = raw.join("sub-01/ses-a/func");
        touch(&func.join("sub-01_ses-a_task-mixed_run-1_bold.tsv"));
        touch(&func.join("sub-01_ses-a_task-mixed_run-1_bold.json"));
        touch(&raw.join("sub-02/func/sub-02_task-mixed_bold.tsv"));

        let layout = DatasetLayout::locate(dir.path()).unwrap();
        let runs = layout.discover_runs("mixed").unwrap();
        assert_eq!(runs.len(), 2);

        let names = |run: &RunFiles| -> Vec<String> {
            run.sidecars
                .iter()
                .map(|p| p.strip_prefix(&layout.raw).unwrap().display().to_string())
                .collect()
        };
        assert_eq!(
            names(&runs[0]),
            vec![
                "task-mixed_bold.json",
                "sub-01/sub-01_task-mixed_bold.json",
                "sub-01/ses-a/func/sub-01_ses-a_task-mixed_run-1_bold.json",
            ]
        );
        assert_eq!(names(&runs[1]), vec!["task-mixed_bold.json"]);
        assert!(runs[1].events.ends_with("sourcedata/raw/task-mixed_events.tsv"));
    }

    #[test]
    fn nearest_events_file_wins() {
        let dir = skeleton();
        let raw = dir.path().join(RAW_DIR);
        let func = raw.join("sub-01/func");
        touch(&raw.join("task-mixed_bold.json"));
        touch(&raw.join("task-mixed_events.tsv"));
        touch(&func.join("sub-01_task-mixed_bold.tsv"));
        touch(&func.join("sub-01_task-mixed_events.tsv"));

        let layout = DatasetLayout::locate(dir.path()).unwrap();
        let runs = layout.discover_runs("mixed").unwrap();
        assert!(runs[0].events.ends_with("sub-01/func/sub-01_task-mixed_events.tsv"));
    }

    #[test]
    fn derivative_paths_follow_entities() {
        let (entities, _) = RunEntities::parse_filename("sub-01_task-mixed_run-1_bold.tsv").unwrap();
        let run = RunFiles {
            entities,
            bold: PathBuf::new(),
            sidecars: Vec::new(),
            events: PathBuf::new(),
        };
        let preproc = Path::new("/d/fmriprep");
        assert_eq!(
            run.confounds_path(preproc),
            PathBuf::from("/d/fmriprep/sub-01/func/sub-01_task-mixed_run-1_desc-confounds_timeseries.tsv")
        );
        assert_eq!(
            run.preproc_bold_path(preproc, "MNI152NLin2009cAsym"),
            PathBuf::from(
                "/d/fmriprep/sub-01/func/sub-01_task-mixed_run-1_space-MNI152NLin2009cAsym_desc-preproc_bold.tsv"
            )
        );
    }
}
