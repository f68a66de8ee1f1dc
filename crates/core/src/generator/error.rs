//! Error types for the generator module.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by generation collaborators.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// Transport failure talking to the generation service.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The service answered with something we could not use.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request did not finish in time.
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// The collaborator refused the input.
    #[error("Generation rejected: {reason}")]
    Rejected { reason: String },
}

impl GeneratorError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn invalid_response(reason: impl Into<String>) -> Self {
        Self::InvalidResponse(reason.into())
    }

    /// Whether retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidResponse(_) | Self::Rejected { .. } => false,
        }
    }
}
