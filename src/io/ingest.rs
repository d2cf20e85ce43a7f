//! TSV / JSON ingest for a single run.
//!
//! This module turns the raw and derivative files of a run into typed,
//! validated in-memory values:
//!
//! - `_bold.tsv` / `_desc-preproc_bold.tsv` → `NumericTable` (volumes × units)
//! - `_bold.json` → `BoldSidecar`
//! - `_events.tsv` → `Vec<Event>`
//! - `_desc-confounds_timeseries.tsv` → `NumericTable` (volumes × confounds)
//!
//! No modeling happens here.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use nalgebra::DMatrix;

use crate::domain::{BoldSidecar, Event};
use crate::error::AppError;

/// A header plus a dense `rows × columns` block of numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericTable {
    pub columns: Vec<String>,
    pub data: DMatrix<f64>,
}

impl NumericTable {
    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// How `n/a` cells are treated when reading numeric tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingValues {
    Reject,
    /// Confound tables carry `n/a` in the first row of derivative columns.
    Zero,
}

fn tsv_reader(path: &Path) -> Result<csv::Reader<File>, AppError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::PathNotFound {
            path: path.to_path_buf(),
        },
        _ => AppError::io(path, e),
    })?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn read_headers(reader: &mut csv::Reader<File>, path: &Path) -> Result<Vec<String>, AppError> {
    let headers = reader
        .headers()
        .map_err(|e| AppError::invalid(format!("Failed to read TSV header of '{}': {e}", path.display())))?;
    // Strip a UTF-8 BOM some tools prepend to the first header.
    Ok(headers
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect())
}

fn is_missing(cell: &str) -> bool {
    cell.is_empty() || cell.eq_ignore_ascii_case("n/a") || cell.eq_ignore_ascii_case("nan")
}

/// Read a fully numeric TSV table.
pub fn read_numeric_table(path: &Path, missing: MissingValues) -> Result<NumericTable, AppError> {
    let mut reader = tsv_reader(path)?;
    let columns = read_headers(&mut reader, path)?;
    if columns.is_empty() || columns.iter().all(String::is_empty) {
        return Err(AppError::invalid(format!("TSV '{}' has no columns.", path.display())));
    }

    let mut values = Vec::new();
    let mut n_rows = 0usize;
    for (idx, result) in reader.records().enumerate() {
        // +2: header is line 1 and lines are 1-based.
        let line = idx + 2;
        let record =
            result.map_err(|e| AppError::invalid(format!("'{}' line {line}: {e}", path.display())))?;
        if record.len() != columns.len() {
            return Err(AppError::invalid(format!(
                "'{}' line {line}: expected {} cells, found {}.",
                path.display(),
                columns.len(),
                record.len()
            )));
        }
        for (col, cell) in record.iter().enumerate() {
            let value = if is_missing(cell) {
                match missing {
                    MissingValues::Zero => 0.0,
                    MissingValues::Reject => {
                        return Err(AppError::invalid(format!(
                            "'{}' line {line}: missing value in column `{}`.",
                            path.display(),
                            columns[col]
                        )));
                    }
                }
            } else {
                parse_f64(cell).ok_or_else(|| {
                    AppError::invalid(format!(
                        "'{}' line {line}: invalid number '{cell}' in column `{}`.",
                        path.display(),
                        columns[col]
                    ))
                })?
            };
            values.push(value);
        }
        n_rows += 1;
    }

    if n_rows == 0 {
        return Err(AppError::invalid(format!("TSV '{}' has no data rows.", path.display())));
    }

    let data = DMatrix::from_row_slice(n_rows, columns.len(), &values);
    Ok(NumericTable { columns, data })
}

/// Read the observed signal of a run (rows = volumes, columns = units).
pub fn read_signal(path: &Path) -> Result<NumericTable, AppError> {
    read_numeric_table(path, MissingValues::Reject)
}

/// Read an fMRIPrep-style confounds table.
pub fn read_confounds(path: &Path) -> Result<NumericTable, AppError> {
    read_numeric_table(path, MissingValues::Zero)
}

fn read_json_object(path: &Path) -> Result<serde_json::Map<String, serde_json::Value>, AppError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::PathNotFound {
            path: path.to_path_buf(),
        },
        _ => AppError::io(path, e),
    })?;
    match serde_json::from_reader(file) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::invalid(format!("Sidecar '{}' is not a JSON object.", path.display()))),
        Err(e) => Err(AppError::invalid(format!("Invalid sidecar JSON '{}': {e}", path.display()))),
    }
}

/// Read the BOLD JSON sidecars of a run and merge them.
///
/// `paths` go from least to most specific; later files override keys of
/// earlier ones.
pub fn read_sidecar(paths: &[PathBuf]) -> Result<BoldSidecar, AppError> {
    let Some(nearest) = paths.last() else {
        return Err(AppError::invalid("No BOLD sidecar to read."));
    };
    let mut merged = serde_json::Map::new();
    for path in paths {
        merged.extend(read_json_object(path)?);
    }
    let sidecar: BoldSidecar = serde_json::from_value(serde_json::Value::Object(merged))
        .map_err(|e| AppError::invalid(format!("Invalid sidecar '{}': {e}", nearest.display())))?;

    if !(sidecar.repetition_time.is_finite() && sidecar.repetition_time > 0.0) {
        return Err(AppError::invalid(format!(
            "Sidecar '{}': RepetitionTime must be > 0, got {}.",
            nearest.display(),
            sidecar.repetition_time
        )));
    }
    if sidecar.start_time.is_some_and(|t| !t.is_finite()) {
        return Err(AppError::invalid(format!("Sidecar '{}': StartTime is not finite.", nearest.display())));
    }
    Ok(sidecar)
}

/// Read an `_events.tsv` table.
///
/// `onset` and `trial_type` are required per row; a missing (`n/a`) duration
/// is treated as an impulse.
pub fn read_events(path: &Path) -> Result<Vec<Event>, AppError> {
    let mut reader = tsv_reader(path)?;
    let headers = read_headers(&mut reader, path)?;
    let header_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.to_ascii_lowercase(), idx))
        .collect();

    for required in ["onset", "duration", "trial_type"] {
        if !header_map.contains_key(required) {
            return Err(AppError::invalid(format!(
                "Events '{}' is missing required column `{required}`.",
                path.display()
            )));
        }
    }

    let mut events = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record =
            result.map_err(|e| AppError::invalid(format!("'{}' line {line}: {e}", path.display())))?;
        let event = parse_event(&record, &header_map)
            .map_err(|msg| AppError::invalid(format!("'{}' line {line}: {msg}", path.display())))?;
        events.push(event);
    }
    Ok(events)
}

fn parse_event(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<Event, String> {
    let onset = get_required(record, header_map, "onset")?;
    let onset = parse_f64(onset).ok_or_else(|| format!("Invalid onset '{onset}'."))?;

    let duration = match get_optional(record, header_map, "duration") {
        Some(d) => parse_f64(d).ok_or_else(|| format!("Invalid duration '{d}'."))?,
        None => 0.0,
    };
    if duration < 0.0 {
        return Err(format!("Negative duration {duration}."));
    }

    let trial_type = get_required(record, header_map, "trial_type")?.to_string();

    Ok(Event {
        onset,
        duration,
        trial_type,
    })
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    get_optional(record, header_map, name).ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !is_missing(s))
}

fn parse_f64(s: &str) -> Option<f64> {
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn reads_signal_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bold.tsv", "roi-a\troi-b\n1.0\t2.0\n3.0\t4.5\n5\t6\n");
        let table = read_signal(&path).unwrap();
        assert_eq!(table.columns, vec!["roi-a", "roi-b"]);
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.data[(1, 1)], 4.5);
        assert_eq!(table.column_index("roi-b"), Some(1));
    }

    #[test]
    fn signal_rejects_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bold.tsv", "roi-a\n1.0\nn/a\n");
        let err = read_signal(&path).unwrap_err();
        assert!(err.to_string().contains("line 3"), "{err}");
    }

    #[test]
    fn confounds_treat_na_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "conf.tsv", "trans_x\ttrans_x_derivative1\n0.1\tn/a\n0.2\t0.1\n");
        let table = read_confounds(&path).unwrap();
        assert_eq!(table.data[(0, 1)], 0.0);
        assert_eq!(table.data[(1, 1)], 0.1);
    }

    #[test]
    fn reads_events_with_missing_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "events.tsv",
            "onset\tduration\ttrial_type\n0\t12\tmotor\n15.5\tn/a\tmusic\n",
        );
        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].trial_type, "motor");
        assert_eq!(events[1].onset, 15.5);
        assert_eq!(events[1].duration, 0.0);
    }

    #[test]
    fn events_require_trial_type_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "events.tsv", "onset\tduration\n0\t12\n");
        assert!(matches!(read_events(&path), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn reads_sidecar_with_optional_start_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bold.json", r#"{"RepetitionTime": 2.0, "TaskName": "mixed"}"#);
        let sidecar = read_sidecar(&[path]).unwrap();
        assert_eq!(sidecar.repetition_time, 2.0);
        assert_eq!(sidecar.start_time, None);

        let path = write(dir.path(), "bad.json", r#"{"RepetitionTime": 0.0}"#);
        assert!(read_sidecar(&[path]).is_err());
    }

    #[test]
    fn nearer_sidecars_override_inherited_keys() {
        let dir = tempfile::tempdir().unwrap();
        let top = write(dir.path(), "task-mixed_bold.json", r#"{"RepetitionTime": 2.0, "StartTime": 1.0}"#);
        let run = write(dir.path(), "sub-01_task-mixed_bold.json", r#"{"StartTime": 0.5}"#);
        let sidecar = read_sidecar(&[top.clone(), run]).unwrap();
        assert_eq!(sidecar.repetition_time, 2.0);
        assert_eq!(sidecar.start_time, Some(0.5));

        let only_start = write(dir.path(), "partial.json", r#"{"StartTime": 0.5}"#);
        assert!(matches!(read_sidecar(&[only_start]), Err(AppError::InvalidInput(_))));
        assert!(read_sidecar(&[]).is_err());
        let array = write(dir.path(), "array.json", "[1, 2]");
        assert!(matches!(read_sidecar(&[top, array]), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn missing_file_is_path_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_signal(&dir.path().join("nope.tsv")),
            Err(AppError::PathNotFound { .. })
        ));
    }
}
