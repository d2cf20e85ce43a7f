//! Model configuration loading.
//!
//! The design-matrix composition (which confounds, which contrasts) is a
//! study decision, so it lives in `code/model.json` next to the dataset rather
//! than in the binary. A missing default file means "use the defaults".

use std::fs::File;
use std::path::Path;

use crate::domain::ModelConfig;
use crate::error::AppError;

/// Load the model configuration.
///
/// - `explicit`: a path given on the command line; it must exist.
/// - `default_path`: consulted only when no explicit path was given.
pub fn load_model_config(explicit: Option<&Path>, default_path: &Path) -> Result<ModelConfig, AppError> {
    let config = match explicit {
        Some(path) => read_config(path)?,
        None if default_path.is_file() => read_config(default_path)?,
        None => {
            log::info!(
                "no model config at '{}'; using defaults",
                default_path.display()
            );
            ModelConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<ModelConfig, AppError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::PathNotFound {
            path: path.to_path_buf(),
        },
        _ => AppError::io(path, e),
    })?;
    let config: ModelConfig = serde_json::from_reader(file)
        .map_err(|e| AppError::invalid(format!("Invalid model config '{}': {e}", path.display())))?;
    log::info!("loaded model config from '{}'", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignalScaling;

    #[test]
    fn missing_default_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_model_config(None, &dir.path().join("model.json")).unwrap();
        assert_eq!(cfg, ModelConfig::default());
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_model_config(Some(&dir.path().join("custom.json")), &dir.path().join("model.json"));
        assert!(matches!(err, Err(AppError::PathNotFound { .. })));
    }

    #[test]
    fn partial_file_overrides_selected_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, r#"{"signal_scaling": "none", "contrasts": ["motor - music"]}"#).unwrap();
        let cfg = load_model_config(None, &path).unwrap();
        assert_eq!(cfg.signal_scaling, SignalScaling::None);
        assert_eq!(cfg.contrasts, vec!["motor - music"]);
        assert_eq!(cfg.task, "mixed");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, r#"{"oversampling": 0}"#).unwrap();
        assert!(matches!(load_model_config(None, &path), Err(AppError::InvalidInput(_))));
    }
}
