//! Typed failures raised by the labeling core.
//!
//! Fatal conditions (missing directories, unresolvable reference files,
//! column/schema mismatches, configuration defects) surface as [`LabelError`]
//! variants carrying the path, dataset type, or column names needed for a
//! precise diagnostic. Row-level problems are recovered locally and reported
//! through [`crate::events`] instead, except under strict mode where a
//! malformed row becomes [`LabelError::MalformedRow`].

use std::{fmt, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LabelError>;

/// Which input a schema check was run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Target,
    Reference,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Target => write!(f, "target"),
            Side::Reference => write!(f, "reference"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("Directory {path:?} does not exist or is not a directory")]
    Directory { path: PathBuf },

    #[error("No reference label file matches target '{target}'")]
    NotFound { target: String },

    #[error("Reference file {path:?} is missing column(s): {}", columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    #[error("The {side} dataset {path:?} is missing required column(s): {}", columns.join(", "))]
    SchemaMismatch {
        side: Side,
        path: PathBuf,
        columns: Vec<String>,
    },

    #[error("Invalid configuration for dataset '{dataset}': key '{key}' {reason}")]
    ConfigSchema {
        dataset: String,
        key: String,
        reason: String,
    },

    #[error("Dataset type '{dataset}' is not configured in {path:?}")]
    DatasetNotConfigured { dataset: String, path: PathBuf },

    #[error("Malformed row at line {line} in {path:?}: {reason}")]
    MalformedRow {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("Failed to decode {path:?} as {encoding}")]
    Decode {
        path: PathBuf,
        encoding: &'static str,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to parse configuration {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LabelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LabelError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        LabelError::Csv {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config_schema(
        dataset: &str,
        key: &str,
        reason: impl Into<String>,
    ) -> Self {
        LabelError::ConfigSchema {
            dataset: dataset.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Failures that only concern one target file; batch runs log these and
    /// continue with the next target.
    pub fn is_per_target(&self) -> bool {
        matches!(
            self,
            LabelError::NotFound { .. }
                | LabelError::MissingColumns { .. }
                | LabelError::SchemaMismatch { .. }
                | LabelError::MalformedRow { .. }
                | LabelError::Decode { .. }
                | LabelError::Csv { .. }
        )
    }
}
