//! Application error type.
//!
//! Every failure is fatal for a one-shot analysis, so there is a single error
//! enum. Each variant maps to a process exit code:
//!
//! - `2` dataset layout or input problems
//! - `4` ill-posed regressions
//! - `5` output write failures

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Path not found: '{}'", path.display())]
    PathNotFound { path: PathBuf },

    #[error("Singular design matrix: rank {rank} < {columns} columns (predictors are linearly dependent)")]
    SingularDesignMatrix { rank: usize, columns: usize },

    #[error("Too few observations: {n_obs} rows for {n_params} regressors")]
    InsufficientObservations { n_obs: usize, n_params: usize },

    #[error("Permission denied writing '{}': {source}", path.display())]
    WritePermission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to overwrite existing file '{}' (pass --overwrite to replace it)", path.display())]
    PathConflict { path: PathBuf },

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    InvalidInput(String),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::PathNotFound { .. } | AppError::InvalidInput(_) => 2,
            AppError::SingularDesignMatrix { .. } | AppError::InsufficientObservations { .. } => 4,
            AppError::WritePermission { .. } | AppError::PathConflict { .. } | AppError::Io { .. } => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_non_zero_and_grouped() {
        let missing = AppError::PathNotFound {
            path: PathBuf::from("sourcedata/raw"),
        };
        let singular = AppError::SingularDesignMatrix { rank: 2, columns: 3 };
        let conflict = AppError::PathConflict {
            path: PathBuf::from("out.tsv"),
        };
        assert_eq!(missing.exit_code(), 2);
        assert_eq!(singular.exit_code(), 4);
        assert_eq!(conflict.exit_code(), 5);
        assert!(missing.to_string().contains("sourcedata/raw"));
    }
}
