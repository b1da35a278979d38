//! Error types for upstream SignStation calls

/// Errors from talking to the SignStation API.
///
/// A non-success HTTP status is not an error at this layer: it comes back as
/// an `UpstreamReply` so the caller can forward the provider's payload.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("upstream timed out: {0}")]
    Timeout(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Classify a reqwest failure, keeping timeouts distinct so idempotent
    /// calls can be retried.
    pub fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(format!("{context}: {err}"))
        } else {
            Error::Http(format!("{context}: {err}"))
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

/// Result alias for upstream operations.
pub type Result<T> = std::result::Result<T, Error>;
