//! Dataset writer.
//!
//! Every output lands under one directory, usually a derivative pipeline
//! (`sourcedata/derivatives/<pipeline>`). Existing files are only replaced
//! when overwriting was requested; otherwise the write fails with
//! `PathConflict` before anything is touched.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use serde::Serialize;

use crate::error::AppError;

/// BIDS `dataset_description.json`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DatasetDescription {
    name: String,
    #[serde(rename = "BIDSVersion")]
    bids_version: &'static str,
    dataset_type: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    generated_by: Vec<GeneratedBy>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct GeneratedBy {
    name: &'static str,
    version: &'static str,
}

#[derive(Debug, Clone)]
pub struct ResultWriter {
    out_dir: PathBuf,
    overwrite: bool,
}

impl ResultWriter {
    pub fn new(out_dir: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            out_dir: out_dir.into(),
            overwrite,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Write `dataset_description.json` at the output root unless one exists.
    ///
    /// Derivative datasets also record which tool generated them.
    pub fn ensure_dataset_description(&self, name: &str, derivative: bool) -> Result<(), AppError> {
        let path = self.out_dir.join("dataset_description.json");
        if path.exists() {
            return Ok(());
        }
        let description = DatasetDescription {
            name: name.to_string(),
            bids_version: "1.9.0",
            dataset_type: if derivative { "derivative" } else { "raw" },
            generated_by: if derivative {
                vec![GeneratedBy {
                    name: env!("CARGO_PKG_NAME"),
                    version: env!("CARGO_PKG_VERSION"),
                }]
            } else {
                Vec::new()
            },
        };
        self.write_json(Path::new("dataset_description.json"), &description)
            .map(|_| ())
    }

    /// Resolve `rel` under the output directory, refuse conflicts, create parents.
    fn prepare(&self, rel: &Path) -> Result<PathBuf, AppError> {
        let path = self.out_dir.join(rel);
        if path.exists() && !self.overwrite {
            return Err(AppError::PathConflict { path });
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| write_error(parent, e))?;
        }
        Ok(path)
    }

    fn create(&self, rel: &Path) -> Result<(PathBuf, File), AppError> {
        let path = self.prepare(rel)?;
        let file = File::create(&path).map_err(|e| write_error(&path, e))?;
        Ok((path, file))
    }

    /// Write a numeric matrix as TSV.
    ///
    /// With `row_labels = Some((header, labels))` the first column carries one
    /// label per matrix row.
    pub fn write_matrix(
        &self,
        rel: &Path,
        row_labels: Option<(&str, &[String])>,
        columns: &[String],
        data: &DMatrix<f64>,
    ) -> Result<PathBuf, AppError> {
        if columns.len() != data.ncols() {
            return Err(AppError::invalid(format!(
                "Cannot write '{}': {} column names for {} columns.",
                rel.display(),
                columns.len(),
                data.ncols()
            )));
        }
        if let Some((_, labels)) = row_labels {
            if labels.len() != data.nrows() {
                return Err(AppError::invalid(format!(
                    "Cannot write '{}': {} row labels for {} rows.",
                    rel.display(),
                    labels.len(),
                    data.nrows()
                )));
            }
        }

        let mut header: Vec<String> = Vec::with_capacity(columns.len() + 1);
        if let Some((label_header, _)) = row_labels {
            header.push(label_header.to_string());
        }
        header.extend(columns.iter().cloned());

        let records: Vec<Vec<String>> = data
            .row_iter()
            .enumerate()
            .map(|(i, row)| {
                let mut record: Vec<String> = Vec::with_capacity(header.len());
                if let Some((_, labels)) = row_labels {
                    record.push(labels[i].clone());
                }
                record.extend(row.iter().map(|v| format_value(*v)));
                record
            })
            .collect();

        self.write_records(rel, &header, &records)
    }

    /// Write string records under a header as TSV.
    pub fn write_records(&self, rel: &Path, header: &[String], records: &[Vec<String>]) -> Result<PathBuf, AppError> {
        if let Some(bad) = records.iter().find(|r| r.len() != header.len()) {
            return Err(AppError::invalid(format!(
                "Cannot write '{}': record has {} cells for {} columns.",
                rel.display(),
                bad.len(),
                header.len()
            )));
        }

        let (path, file) = self.create(rel)?;
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(file);
        writer.write_record(header).map_err(|e| csv_error(&path, e))?;
        for record in records {
            writer.write_record(record).map_err(|e| csv_error(&path, e))?;
        }
        writer.flush().map_err(|e| write_error(&path, e))?;

        log::debug!("wrote {}", path.display());
        Ok(path)
    }

    /// Write one value per unit as a two-column (`unit`, `value`) statmap.
    pub fn write_statmap(&self, rel: &Path, units: &[String], values: &[f64]) -> Result<PathBuf, AppError> {
        let data = DMatrix::from_column_slice(values.len(), 1, values);
        self.write_matrix(rel, Some(("unit", units)), &["value".to_string()], &data)
    }

    pub fn write_json<T: Serialize>(&self, rel: &Path, value: &T) -> Result<PathBuf, AppError> {
        let (path, file) = self.create(rel)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value).map_err(|e| json_error(&path, e))?;
        writer.flush().map_err(|e| write_error(&path, e))?;
        log::debug!("wrote {}", path.display());
        Ok(path)
    }
}

pub fn format_value(v: f64) -> String {
    if v.is_nan() { "n/a".to_string() } else { v.to_string() }
}

fn write_error(path: &Path, e: std::io::Error) -> AppError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => AppError::WritePermission {
            path: path.to_path_buf(),
            source: e,
        },
        _ => AppError::io(path, e),
    }
}

fn json_error(path: &Path, e: serde_json::Error) -> AppError {
    if e.is_io() {
        write_error(path, std::io::Error::from(e))
    } else {
        AppError::invalid(format!("Failed to write JSON '{}': {e}", path.display()))
    }
}

fn csv_error(path: &Path, e: csv::Error) -> AppError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => write_error(path, io),
        other => AppError::invalid(format!("Failed to write TSV '{}': {other:?}", path.display())),
    }
}
