use std::path::PathBuf;
use thiserror::Error;

/// Startup failure reading the locations file. Fatal, never retried.
#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("Failed to open dataset {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read dataset: {0}")]
    Csv(#[from] csv::Error),

    #[error("Required column '{0}' not found in dataset")]
    MissingColumn(&'static str),

    #[error("Row {row}: invalid {column} value '{value}'")]
    InvalidValue {
        row: u64,
        column: &'static str,
        value: String,
    },
}

/// A ratio or centroid was requested over zero records.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("No records available to compute the {view}")]
pub struct EmptyInputError {
    pub view: &'static str,
}

/// Presentation failed for a prepared view.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("failed to format {section}")]
    Format {
        section: &'static str,
        #[source]
        source: std::fmt::Error,
    },

    #[error("failed to encode {section}: {source}")]
    Encode {
        section: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl DisplayError {
    pub fn format(section: &'static str) -> impl FnOnce(std::fmt::Error) -> Self {
        move |source| DisplayError::Format { section, source }
    }

    pub fn encode(section: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| DisplayError::Encode { section, source }
    }
}
