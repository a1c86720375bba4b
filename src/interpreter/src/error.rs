use thiserror::Error;

/// Errors of the interpreter backend.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing a model directory failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Training data or a persisted model is not valid JSON.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Training data is well-formed JSON but unusable.
    #[error("Invalid training data: {0}")]
    InvalidData(String),

    /// A model version with the same name was already published.
    #[error("Model directory {0:?} already exists")]
    AlreadyExists(std::path::PathBuf),

    /// A persisted model was written by an incompatible version.
    #[error("Unsupported model version {0}")]
    UnsupportedVersion(u32),
}

/// Result type alias for interpreter operations.
pub type Result<T> = std::result::Result<T, Error>;
