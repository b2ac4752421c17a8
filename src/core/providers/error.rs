//! Adapter error taxonomy
//!
//! Errors at the adapter boundary carry their own retriable classification
//! so the dispatch engine never inspects provider-specific detail.

use std::time::Duration;
use thiserror::Error;

/// Errors a provider adapter can surface.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Connection-level failure before any HTTP status was received
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not complete within the per-deployment timeout
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// The provider rejected the credential
    #[error("authentication rejected (status {status}): {message}")]
    Auth {
        /// HTTP status code
        status: u16,
        /// Provider error body
        message: String,
    },

    /// Any other provider-reported error
    #[error("provider error (status {status}): {message}")]
    Provider {
        /// HTTP status code
        status: u16,
        /// Provider error body
        message: String,
        /// Whether another deployment may succeed where this one failed
        retriable: bool,
    },
}

impl AdapterError {
    /// Classify an HTTP error status the way the dispatch engine needs:
    /// 408/429 and 5xx are retriable against another deployment,
    /// 401/403 are auth rejections, everything else 4xx is fatal.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => AdapterError::Auth { status, message },
            408 | 429 => AdapterError::Provider {
                status,
                message,
                retriable: true,
            },
            s if s >= 500 => AdapterError::Provider {
                status,
                message,
                retriable: true,
            },
            _ => AdapterError::Provider {
                status,
                message,
                retriable: false,
            },
        }
    }

    /// Whether fallback to another deployment may succeed.
    ///
    /// Auth rejections are not retriable: the request reached the provider
    /// and was refused for reasons a different deployment cannot fix once
    /// the credential was freshly acquired.
    pub fn is_retriable(&self) -> bool {
        match self {
            AdapterError::Transport(_) | AdapterError::Timeout(_) => true,
            AdapterError::Auth { .. } => false,
            AdapterError::Provider { retriable, .. } => *retriable,
        }
    }
}
