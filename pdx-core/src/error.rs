//! Error types for PDX serialization.

use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Failure reported by the type service collaborator.
///
/// The registry never wraps or retries these; they reach the caller exactly as
/// the connection layer produced them.
#[derive(Debug, Error)]
#[error("type service failure: {message}")]
pub struct CollaboratorError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl CollaboratorError {
    /// Creates a collaborator error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a collaborator error carrying the underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The main error type for PDX operations.
#[derive(Debug, Error)]
pub enum PdxError {
    /// The caller broke the writer/reader protocol, or the wire carried an
    /// unrecognized type tag.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// An argument was rejected at the call boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A buffer could not grow to the requested size.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The type service failed while assigning or fetching an id.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// Malformed or truncated input.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PdxError {
    /// Returns `true` for resource exhaustion, as opposed to logic errors.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, PdxError::OutOfMemory(_))
    }

    /// Returns `true` if the error came from the type service.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, PdxError::Collaborator(_))
    }
}

/// A specialized `Result` type for PDX operations.
pub type Result<T> = std::result::Result<T, PdxError>;
