//! Provider abstraction for the signing boundary
//!
//! Defines the `SigningProvider` trait that decouples the signing workflow from
//! how remote calls are transported. `ProxyProvider` routes every call through
//! the same-origin proxy service, which injects server-held credentials; tests
//! substitute in-memory providers.
//!
//! Providers only transport. Interpreting a response (missing token, missing
//! document id, URL not yet available) is the workflow's job, so every method
//! returns the raw status and JSON body.

pub mod proxy;

pub use proxy::ProxyProvider;

use signstation::{SignSubmission, UpstreamReply};
use std::future::Future;
use std::pin::Pin;

/// Status and JSON body returned by a provider call.
pub type ProviderResponse = UpstreamReply;

/// Transport-level failures. The outcome of the remote operation is unknown
/// when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<signstation::Error> for ProviderError {
    fn from(err: signstation::Error) -> Self {
        match err {
            signstation::Error::Http(msg) => ProviderError::Transport(msg),
            signstation::Error::Timeout(msg) => ProviderError::Timeout(msg),
            signstation::Error::InvalidRequest(msg) => ProviderError::InvalidRequest(msg),
        }
    }
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Boxed future returned by provider methods.
pub type ProviderFuture<'a> = Pin<Box<dyn Future<Output = Result<ProviderResponse>> + Send + 'a>>;

/// The three remote operations the signing workflow depends on.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn SigningProvider>`).
pub trait SigningProvider: Send + Sync {
    /// Identifier for logging (e.g. "proxy")
    fn id(&self) -> &str;

    /// Credential exchange. Credentials are held by whoever sits behind the
    /// provider; the caller supplies none.
    fn request_token(&self) -> ProviderFuture<'_>;

    /// Submit a document for signing. Not idempotent: a repeated call may
    /// create a second signed document.
    fn submit_document<'a>(
        &'a self,
        token: &'a str,
        submission: &'a SignSubmission,
    ) -> ProviderFuture<'a>;

    /// Ask for the download URL of a signed document.
    fn request_download_url<'a>(&'a self, token: &'a str, document_id: &'a str)
    -> ProviderFuture<'a>;
}
