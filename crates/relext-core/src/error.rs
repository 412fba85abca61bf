use thiserror::Error;

/// Errors that can occur in the relext data pipeline and model.
#[derive(Debug, Error)]
pub enum RelextError {
    /// Missing or inconsistent settings: dimensions, paths, hyperparameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A corpus or embedding record could not be read.
    #[error("malformed record in {source_name} at line {line}: {reason}")]
    DataFormat {
        /// File (or other source) the record came from.
        source_name: String,
        /// 1-based line number, 0 when the record has no line.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// The numeric framework failed while running the model.
    #[error("model invocation failed: {0}")]
    ModelInvocation(String),

    /// Saving or restoring trained parameters failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelextError {
    pub(crate) fn data_format(
        source_name: impl Into<String>,
        line: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::DataFormat {
            source_name: source_name.into(),
            line,
            reason: reason.into(),
        }
    }
}

impl From<candle_core::Error> for RelextError {
    fn from(err: candle_core::Error) -> Self {
        Self::ModelInvocation(err.to_string())
    }
}

/// Result type alias for relext operations.
pub type Result<T> = std::result::Result<T, RelextError>;
