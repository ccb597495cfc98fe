use thiserror::Error;

use crate::constants::ObjId;

/// Largest number of identifiers rendered in an error message.
/// The error value itself always keeps the full list.
const MAX_DISPLAYED_IDS: usize = 20;

fn fmt_ids(ids: &[ObjId]) -> String {
    if ids.is_empty() {
        return String::new();
    }
    let shown = ids
        .iter()
        .take(MAX_DISPLAYED_IDS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if ids.len() > MAX_DISPLAYED_IDS {
        format!(" [{shown}, ... ({} ids in total)]", ids.len())
    } else {
        format!(" [{shown}]")
    }
}

#[derive(Error, Debug)]
pub enum SurveyJoinError {
    #[error("Malformed input in {path}: {reason}.{}", fmt_ids(.obj_ids))]
    MalformedInput {
        path: String,
        reason: String,
        obj_ids: Vec<ObjId>,
    },

    #[error(
        "ObjID mismatch between {left} and {right}: {} only in {left}{}, {} only in {right}{}",
        .only_left.len(),
        fmt_ids(.only_left),
        .only_right.len(),
        fmt_ids(.only_right)
    )]
    IdentityMismatch {
        left: String,
        right: String,
        only_left: Vec<ObjId>,
        only_right: Vec<ObjId>,
    },

    #[error(
        "Insufficient memory while reading ephemerides for rows [{start_row}, {}): {hint}",
        .start_row + .chunk_size
    )]
    ResourceExhaustion {
        start_row: usize,
        chunk_size: usize,
        hint: String,
    },

    #[error("Join integrity violated: {0}")]
    JoinIntegrity(String),

    #[error("Unable to write output to {path}: {reason}")]
    SinkWrite { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("Parquet error: {0}")]
    ParquetError(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow_schema::ArrowError),

    #[error("JSON configuration error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SurveyJoinError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SurveyJoinError::MalformedInput {
            path: path.into(),
            reason: reason.into(),
            obj_ids: Vec::new(),
        }
    }

    pub(crate) fn sink(path: impl Into<String>, reason: impl ToString) -> Self {
        SurveyJoinError::SinkWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Identifiers attached to the error, if any.
    pub fn obj_ids(&self) -> Vec<&str> {
        use SurveyJoinError::*;
        match self {
            MalformedInput { obj_ids, .. } => obj_ids.iter().map(String::as_str).collect(),
            IdentityMismatch {
                only_left,
                only_right,
                ..
            } => only_left
                .iter()
                .chain(only_right.iter())
                .map(String::as_str)
                .collect(),
            _ => Vec::new(),
        }
    }
}
