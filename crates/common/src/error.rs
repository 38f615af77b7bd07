//! Common error types for cuckoo-dxl.

use thiserror::Error;

/// Common error type for report projection and event publishing.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A required setting is missing or has the wrong type.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The bus client cannot reach the fabric.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A report value has no JSON representation.
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Compression error: {0}")]
    Compression(#[source] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias using common Error.
pub type Result<T> = std::result::Result<T, Error>;

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}

/// The single error surfaced by a publish run, whichever step failed.
///
/// Callers must not assume either topic received a message when this is
/// returned.
#[derive(Error, Debug)]
#[error("Failed to send analysis report as an event: {source}")]
pub struct PublishError {
    #[source]
    pub source: Error,
}

impl PublishError {
    pub fn new(source: Error) -> Self {
        Self { source }
    }

    /// The underlying cause.
    pub fn cause(&self) -> &Error {
        &self.source
    }
}

impl From<Error> for PublishError {
    fn from(source: Error) -> Self {
        Self::new(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_publish_error_keeps_cause() {
        let err = PublishError::from(Error::Connection("broker unreachable".to_string()));
        assert!(matches!(err.cause(), Error::Connection(_)));
        assert!(err.to_string().contains("broker unreachable"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
