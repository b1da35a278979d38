//! Download URL resolver
//!
//! Signing completes asynchronously on the provider side. Until the signed
//! file exists, the download lookup answers with a "not yet" status or an
//! empty payload; those are treated as pending and polled under a
//! [`PollPolicy`]. Anything else is definitive.

use std::sync::Arc;

use provider::{ProviderResponse, SigningProvider};
use signstation::{DownloadPayload, download_url_from_body};
use tracing::{info, instrument, warn};

use crate::auth::AuthClient;
use crate::error::ResolveError;
use crate::poll::{Attempt, PollError, PollPolicy, poll_until};

/// Statuses the provider uses while a signed document is still being produced.
pub fn is_pending_status(status: u16) -> bool {
    matches!(status, 404 | 409 | 423 | 425)
}

/// Whether a non-success reply means "not signed yet".
///
/// A 404 counts only when it carries a JSON object. An empty or non-JSON 404
/// comes from a route that does not exist (wrong base URL), not from the
/// signing API.
fn is_pending(response: &ProviderResponse) -> bool {
    if response.status == 404 {
        return response.body.is_object() && response.body.get("rawResponse").is_none();
    }
    is_pending_status(response.status)
}

pub struct DownloadResolver {
    auth: Arc<AuthClient>,
    provider: Arc<dyn SigningProvider>,
    policy: PollPolicy,
}

impl DownloadResolver {
    pub fn new(auth: Arc<AuthClient>, provider: Arc<dyn SigningProvider>, policy: PollPolicy) -> Self {
        Self {
            auth,
            provider,
            policy,
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Resolve a time-limited download URL for `document_id`.
    #[instrument(skip(self), fields(max_attempts = self.policy.max_attempts))]
    pub async fn resolve_download_url(&self, document_id: &str) -> Result<String, ResolveError> {
        let result = poll_until(&self.policy, "resolve_download_url", |attempt| {
            self.attempt(document_id, attempt)
        })
        .await;

        match result {
            Ok(url) => {
                info!(document_id, "download URL resolved");
                Ok(url)
            }
            Err(PollError::Failed(err)) => Err(err),
            Err(PollError::Exhausted { attempts }) => {
                warn!(document_id, attempts, "signed document never became available");
                Err(ResolveError::NotReady { attempts })
            }
        }
    }

    async fn attempt(&self, document_id: &str, attempt: u32) -> Result<Attempt<String>, ResolveError> {
        let token = self.auth.authenticate().await?;

        let response = self
            .provider
            .request_download_url(&token, document_id)
            .await
            .map_err(|e| {
                warn!(attempt, error = %e, "download call failed");
                ResolveError::Transport(e.to_string())
            })?;

        if response.status == 401 {
            self.auth.cache().invalidate().await;
        }
        classify(&response, attempt)
    }
}

fn classify(response: &ProviderResponse, attempt: u32) -> Result<Attempt<String>, ResolveError> {
    if !response.is_success() {
        if is_pending(response) {
            return Ok(Attempt::Pending);
        }
        warn!(attempt, status = response.status, "download lookup rejected");
        return Err(ResolveError::Rejected {
            status: response.status,
            details: response.body.to_string(),
        });
    }

    match download_url_from_body(&response.body) {
        DownloadPayload::Url(url) => Ok(Attempt::Ready(url)),
        DownloadPayload::Missing => Ok(Attempt::Pending),
        DownloadPayload::NotAString => {
            let data = response.body.get("data").cloned().unwrap_or_default();
            warn!(attempt, "download payload is not a string");
            Err(ResolveError::InvalidPayload(data.to_string()))
        }
    }
}
