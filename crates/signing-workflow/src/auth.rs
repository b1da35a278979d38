//! Auth client: cached bearer tokens from the signing provider
//!
//! Fast path returns the cached token without any network call. On a miss the
//! client takes the cache's refresh guard, re-checks, and issues exactly one
//! credential exchange. Failures are surfaced, never retried here.

use std::sync::Arc;
use std::time::Duration;

use provider::SigningProvider;
use signstation::{DEFAULT_TOKEN_LIFETIME_SECS, token_from_body};
use tracing::{debug, info, instrument, warn};

use crate::cache::TokenCache;
use crate::error::AuthError;
use crate::telemetry;

/// Obtains tokens through a provider, backed by an injected cache.
pub struct AuthClient {
    provider: Arc<dyn SigningProvider>,
    cache: Arc<TokenCache>,
}

impl AuthClient {
    pub fn new(provider: Arc<dyn SigningProvider>, cache: Arc<TokenCache>) -> Self {
        Self { provider, cache }
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Return a usable token, fetching one if the cache has none.
    #[instrument(skip_all, fields(provider = self.provider.id()))]
    pub async fn authenticate(&self) -> Result<String, AuthError> {
        if let Some(token) = self.cache.get().await {
            debug!("using cached token");
            return Ok(token);
        }

        let _guard = self.cache.refresh_guard().await;
        if let Some(token) = self.cache.get().await {
            debug!("token refreshed by a concurrent caller");
            return Ok(token);
        }

        let response = self.provider.request_token().await.map_err(|e| {
            warn!(error = %e, "token request failed");
            AuthError::Transport(e.to_string())
        })?;

        if !response.is_success() {
            warn!(status = response.status, "token request rejected");
            return Err(AuthError::Rejected {
                status: response.status,
                details: response.body.to_string(),
            });
        }

        let grant = token_from_body(&response.body).ok_or_else(|| {
            warn!("auth reply has no data.accessToken");
            AuthError::MissingToken
        })?;

        let lifetime_secs = grant.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        self.cache
            .store(grant.access_token.clone(), Duration::from_secs(lifetime_secs))
            .await;
        telemetry::record_token_refresh();
        info!(lifetime_secs, "fetched and cached new token");

        Ok(grant.access_token)
    }
}
