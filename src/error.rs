//! Error types for the transport and the job lifecycle.

/// A remote call that did not produce a usable success response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The service answered with a non-2xx status.
    #[error("server returned {status}: {detail}")]
    Status {
        status: reqwest::StatusCode,
        detail: String,
    },

    /// The request could not be sent or the body could not be read/decoded.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The local file could not be read before sending.
    #[error("cannot read file: {0}")]
    File(#[from] std::io::Error),
}

/// Why a tracked job ended in the `Error` state.
#[derive(Debug, thiserror::Error)]
pub enum JobFailure {
    #[error("upload failed: {0}")]
    Submit(TransportError),

    #[error("status query failed: {0}")]
    Poll(TransportError),

    /// The service itself reported `failed`; the message is shown as-is.
    #[error("{0}")]
    Remote(String),
}

/// Message used when the service reports `failed` without an explanation.
pub const REMOTE_FAILURE_FALLBACK: &str = "processing failed";

impl JobFailure {
    pub(crate) fn remote(message: Option<String>) -> Self {
        JobFailure::Remote(
            message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| REMOTE_FAILURE_FALLBACK.to_string()),
        )
    }
}
