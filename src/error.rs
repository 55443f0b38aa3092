//! Error taxonomy shared by every layer of the bridge.
//!
//! Each variant maps onto a stable error code that is part of the external tool-result contract.
//! Codes must keep their meaning across releases; add new kinds instead of repurposing old ones.

use serde::Serialize;
use thiserror::Error;

use crate::memory::MemoryServiceError;

/// Classification of a failed tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Session identity or settings were unusable.
    ConfigurationError,
    /// Tool arguments were malformed, or the memory service rejected the payload.
    ValidationError,
    /// The requested tool is not part of the bridge's capability set.
    UnknownToolError,
    /// A bounded wait was exceeded.
    TimeoutError,
    /// Network or service failure; the effect may or may not have happened.
    TransientError,
}

impl ErrorKind {
    /// Stable machine-readable code reported to MCP clients.
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::UnknownToolError => "UNKNOWN_TOOL",
            Self::TimeoutError => "TIMEOUT",
            Self::TransientError => "TRANSIENT_ERROR",
        }
    }

    /// Human-facing name of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigurationError => "ConfigurationError",
            Self::ValidationError => "ValidationError",
            Self::UnknownToolError => "UnknownToolError",
            Self::TimeoutError => "TimeoutError",
            Self::TransientError => "TransientError",
        }
    }

    /// Whether a caller may reasonably retry after this kind of failure.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TimeoutError | Self::TransientError)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the bridge while handling a session or a single tool call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// Session identity or runtime settings are invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Tool arguments failed validation or the service rejected the payload.
    #[error("validation error: {0}")]
    Validation(String),
    /// Tool name not recognized by the dispatcher.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// The call did not complete within its bounded wait.
    #[error("timed out: {0}")]
    Timeout(String),
    /// The memory service could not be reached or failed to answer.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl BridgeError {
    /// Classify the error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::ConfigurationError,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::UnknownTool(_) => ErrorKind::UnknownToolError,
            Self::Timeout(_) => ErrorKind::TimeoutError,
            Self::Transient(_) => ErrorKind::TransientError,
        }
    }

    /// Detail message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Configuration(message)
            | Self::Validation(message)
            | Self::UnknownTool(message)
            | Self::Timeout(message)
            | Self::Transient(message) => message,
        }
    }

    /// Shorthand for [`ErrorKind::is_retryable`].
    pub const fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<MemoryServiceError> for BridgeError {
    fn from(error: MemoryServiceError) -> Self {
        match &error {
            MemoryServiceError::InvalidUrl(_) => Self::Configuration(error.to_string()),
            MemoryServiceError::Timeout { .. } => Self::Timeout(error.to_string()),
            MemoryServiceError::Rejected { .. } => Self::Validation(error.to_string()),
            MemoryServiceError::Unavailable { .. }
            | MemoryServiceError::ServerError { .. }
            | MemoryServiceError::Malformed { .. }
            | MemoryServiceError::Closed => Self::Transient(error.to_string()),
        }
    }
}
