//! Request-scoped errors and their stable kinds.

use serde::Serialize;
use thiserror::Error;

/// Boxed cause coming from a model backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced to callers of the router.
#[derive(Debug, Error)]
pub enum Error {
    /// The agent is neither loaded nor present on durable storage.
    #[error("No agent found with name '{0}'.")]
    NotFound(String),

    /// Training request without a usable agent name, or an agent/model that
    /// cannot be constructed.
    #[error("{message}")]
    InvalidModel {
        /// Human readable explanation.
        message: String,
        /// Underlying cause.
        #[source]
        source: Option<BoxError>,
    },

    /// A training job for the agent is still running.
    #[error("The agent '{0}' is already being trained!")]
    AlreadyTraining(String),

    /// The request body could not be understood.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The service was configured inconsistently.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while touching durable storage or temporary files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stable error signal, one per retry policy a client needs to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown agent.
    NotFound,
    /// Bad agent name or broken model.
    InvalidModel,
    /// Busy, poll the status and retry later.
    AlreadyTraining,
    /// Malformed request.
    BadRequest,
    /// Anything on the service side.
    Internal,
}

impl Error {
    /// An [`Error::InvalidModel`] without a cause.
    pub fn invalid_model(message: impl Into<String>) -> Self {
        Error::InvalidModel {
            message: message.into(),
            source: None,
        }
    }

    /// An [`Error::InvalidModel`] wrapping its cause; the cause is appended to the message.
    pub fn invalid_model_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        let source = source.into();
        Error::InvalidModel {
            message: format!("{} Error: {}", message.into(), source),
            source: Some(source),
        }
    }

    /// The stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidModel { .. } => ErrorKind::InvalidModel,
            Error::AlreadyTraining(_) => ErrorKind::AlreadyTraining,
            Error::BadRequest(_) => ErrorKind::BadRequest,
            Error::Config(_) | Error::Io(_) | Error::Json(_) => ErrorKind::Internal,
        }
    }
}

impl From<emulators::Error> for Error {
    fn from(e: emulators::Error) -> Self {
        match e {
            emulators::Error::UnknownMode(_) => Error::Config(e.to_string()),
            emulators::Error::MissingField(_) => Error::BadRequest(e.to_string()),
        }
    }
}

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::NotFound("greeter".to_string()).to_string(),
            "No agent found with name 'greeter'."
        );
        assert_eq!(
            Error::AlreadyTraining("greeter".to_string()).to_string(),
            "The agent 'greeter' is already being trained!"
        );
    }

    #[test]
    fn test_invalid_model_keeps_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = Error::invalid_model_with("No agent found with name 'x'.", cause);
        assert_eq!(err.kind(), ErrorKind::InvalidModel);
        assert!(err.to_string().ends_with("Error: disk on fire"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_kinds_are_distinct() {
        let kinds = [
            Error::NotFound(String::new()).kind(),
            Error::invalid_model("").kind(),
            Error::AlreadyTraining(String::new()).kind(),
            Error::BadRequest(String::new()).kind(),
            Error::Config(String::new()).kind(),
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_emulator_errors() {
        let err: Error = emulators::Error::MissingField("text").into();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        let err: Error = emulators::Error::UnknownMode("x".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
