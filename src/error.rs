use std::path::PathBuf;

use thiserror::Error;

/// Everything that can end one artifact's trip through the pipeline.
#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("input not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("malformed input {}: {message}", path.display())]
    MalformedInput { path: PathBuf, message: String },

    #[error("schema conflict: {0}")]
    SchemaConflict(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("capture tool `{tool}` not found")]
    CaptureToolMissing { tool: String },

    #[error("capture tool exited with {status}: {stderr}")]
    CaptureToolFailed { status: String, stderr: String },

    #[error("output {} is also produced from {}", output.display(), other.display())]
    OutputClash { output: PathBuf, other: PathBuf },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, FlattenError>;

impl FlattenError {
    /// Short, stable name used when reporting per-artifact outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            FlattenError::InputNotFound { .. } => "input_not_found",
            FlattenError::MalformedInput { .. } => "malformed_input",
            FlattenError::SchemaConflict(_) => "schema_conflict",
            FlattenError::Serialization(_) => "serialization",
            FlattenError::CaptureToolMissing { .. } => "capture_tool_missing",
            FlattenError::CaptureToolFailed { .. } => "capture_tool_failed",
            FlattenError::OutputClash { .. } => "output_clash",
            FlattenError::Io { .. } => "io",
        }
    }

    /// Maps an open/read failure, turning `NotFound` into [`FlattenError::InputNotFound`].
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            FlattenError::InputNotFound { path }
        } else {
            FlattenError::Io { path, source }
        }
    }
}

impl From<arrow2::error::Error> for FlattenError {
    fn from(err: arrow2::error::Error) -> Self {
        FlattenError::Serialization(err.to_string())
    }
}
