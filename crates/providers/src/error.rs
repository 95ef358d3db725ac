//! Errors from the provider adapter layer.

use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-success status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The provider answered 2xx but reported an error in the payload.
    #[error("Provider error {code}: {message}")]
    Remote { code: String, message: String },

    /// The submission is missing something the provider needs.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },

    /// The remote job finished without the expected artifact.
    #[error("Missing result: {0}")]
    MissingResult(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ProviderError {
    /// Errors worth retrying on the next poll.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Request(_) => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
