use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the recovery, normalization, and storage core.
///
/// Each variant is local to the interaction that produced it; callers surface
/// the diagnostic and keep going.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("model output could not be parsed as JSON after all repair strategies")]
    UnparsableOutput { raw: String },

    #[error("unsupported extraction shape: {0}")]
    UnsupportedShape(String),

    #[error("column mismatch in row {row}: expected {expected} columns, found {found}")]
    ColumnMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("failed to load {}: {reason}", path.display())]
    LoadError { path: PathBuf, reason: String },
}

impl CoreError {
    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::LoadError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
