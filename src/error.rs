//! Typed error taxonomy for the tracking service.
//! Every service operation returns `TrackerResult` so the HTTP layer and the
//! client transport can map outcomes without re-deriving business meaning.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    /// Malformed or missing identifiers. Always a client bug, never retried.
    #[error("{0}")]
    Validation(String),

    /// Project/company mismatch. Not retried.
    #[error("{0}")]
    Authorization(String),

    /// Double check-in, resume-without-pause, checkout-while-paused,
    /// checkout-after-checkout, concurrent CAS loss. Requires a state
    /// refresh before the caller tries again.
    #[error("{0}")]
    Conflict(String),

    /// No open session for the requested operation.
    #[error("{0}")]
    NotFound(String),

    /// Transport failure between client and server. The only variant the
    /// sync scheduler retries.
    #[error("network error: {0}")]
    Network(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TrackerError {
    pub fn status_code(&self) -> u16 {
        match self {
            TrackerError::Validation(_) | TrackerError::Conflict(_) => 400,
            TrackerError::Authorization(_) => 403,
            TrackerError::NotFound(_) => 404,
            TrackerError::Network(_) => 502,
            TrackerError::Internal(_) => 500,
        }
    }

    /// Rebuild the typed variant from an HTTP status + message, used by the
    /// client transport when decoding response envelopes.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => TrackerError::Validation(message),
            403 => TrackerError::Authorization(message),
            404 => TrackerError::NotFound(message),
            _ => TrackerError::Internal(anyhow::anyhow!(message)),
        }
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
