//! Error types for the engram engine

use thiserror::Error;

/// Main error type for engine operations.
///
/// `Validation` and `Configuration` are client faults and are raised before
/// any store call is made. `Store` wraps a backing-store failure.
/// `Authorization` marks a post-fetch tenant mismatch; the engine never
/// surfaces it with detail and answers as `NotFound` instead.
#[derive(Error, Debug)]
pub enum EngramError {
    /// Malformed or missing required field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown tier or missing required binding
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Vector generation failed or produced a malformed vector
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A backing-store call failed
    #[error("Store error: {0}")]
    Store(String),

    /// Point lookup found nothing (distinct from an empty query result)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Tenant scope mismatch detected after fetch
    #[error("Authorization error: {0}")]
    Authorization(String),
}

impl EngramError {
    /// Stable error category code, suitable for wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            EngramError::Validation(_) => "VALIDATION_ERROR",
            EngramError::Configuration(_) => "CONFIGURATION_ERROR",
            EngramError::Embedding(_) => "EMBEDDING_ERROR",
            EngramError::Store(_) => "STORE_ERROR",
            EngramError::NotFound(_) => "NOT_FOUND",
            EngramError::Authorization(_) => "AUTHORIZATION_ERROR",
        }
    }

    /// Translate for the caller-facing surface: an authorization failure
    /// answers as not-found so the response never confirms a foreign
    /// record exists. Everything else passes through unchanged.
    pub fn conceal(self, id: &str) -> EngramError {
        match self {
            EngramError::Authorization(_) => {
                EngramError::NotFound(format!("memory {id} not found"))
            }
            other => other,
        }
    }

    /// Whether this error is the caller's fault rather than the engine's.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            EngramError::Validation(_)
                | EngramError::Configuration(_)
                | EngramError::NotFound(_)
                | EngramError::Authorization(_)
        )
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngramError>;
