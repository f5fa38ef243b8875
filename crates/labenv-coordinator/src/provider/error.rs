//! Provider error taxonomy
//!
//! Every adapter maps its SDK errors into these categories so allocation and
//! teardown can decide between retrying, treating a call as idempotent
//! success, and recording a failure, without knowing which cloud they talk to.

use thiserror::Error;

/// Provider error categories for retry and teardown logic
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Target does not exist (benign in teardown, "no names" in allocation)
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Throttling, timeouts, dependency still releasing (retryable with backoff)
    #[error("Transient provider error{}: {message}", code_suffix(.code))]
    Transient {
        code: Option<String>,
        message: String,
    },

    /// Permissions, invalid parameters (never retried)
    #[error("Provider rejected the call{}: {message}", code_suffix(.code))]
    Fatal {
        code: Option<String>,
        message: String,
    },
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_ref().map(|c| format!(" ({c})")).unwrap_or_default()
}

impl ProviderError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        ProviderError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        ProviderError::Transient {
            code: None,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        ProviderError::Fatal {
            code: None,
            message: message.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }
}
