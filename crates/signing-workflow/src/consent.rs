//! Consent registration client
//!
//! Registers a consent for a principal with the consent API and returns the
//! URL where the principal completes it. The consent API's bearer token comes
//! from a separate token endpoint and is cached for a fixed 50 minutes.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use signstation::UpstreamReply;
use tracing::{debug, info, instrument, warn};

use crate::cache::TokenCache;
use crate::error::ConsentError;

/// Fixed cache lifetime for consent API tokens.
pub const CONSENT_TOKEN_LIFETIME: Duration = Duration::from_secs(50 * 60);

/// Endpoints and consent profile used for registration.
#[derive(Debug, Clone)]
pub struct ConsentSettings {
    pub token_url: String,
    pub register_url: String,
    pub profile_id: String,
    pub profile_version: u32,
    /// Minutes the public consent URL stays valid
    pub public_url_expiry: u32,
    /// Minutes the consent session stays valid
    pub session_expiry: u32,
    pub timeout: Duration,
}

impl Default for ConsentSettings {
    fn default() -> Self {
        Self {
            token_url: "https://consent-token-fetch.netlify.app/.netlify/functions/getToken".into(),
            register_url:
                "https://sandbox-gateway.leegality.com/consent-runner/api/v1/consents/client/register"
                    .into(),
            profile_id: "976aad88-d8ac-4749-af09-dbe1bd000375".into(),
            profile_version: 1,
            public_url_expiry: 60,
            session_expiry: 60,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Person giving consent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody<'a> {
    consent_profile_id: &'a str,
    consent_profile_version: u32,
    principal: PrincipalBody<'a>,
    public_url_expiry: u32,
    session_expiry: u32,
}

#[derive(Serialize)]
struct PrincipalBody<'a> {
    id: String,
    email: &'a str,
    name: &'a str,
    phone: &'a str,
}

pub struct ConsentCollector {
    client: reqwest::Client,
    settings: ConsentSettings,
    cache: TokenCache,
}

impl ConsentCollector {
    pub fn new(client: reqwest::Client, settings: ConsentSettings) -> Self {
        Self {
            client,
            settings,
            cache: TokenCache::with_margin(Duration::ZERO),
        }
    }

    /// Warm the token cache. Failures are logged, never returned.
    pub async fn prefetch(&self) {
        if let Err(e) = self.token().await {
            warn!(error = %e, "consent token prefetch failed, will retry on demand");
        }
    }

    /// Register a consent for `principal` and return its collection URL.
    #[instrument(skip_all, fields(email = %principal.email))]
    pub async fn collect(&self, principal: &Principal) -> Result<String, ConsentError> {
        let token = self.token().await?;

        let body = RegisterBody {
            consent_profile_id: &self.settings.profile_id,
            consent_profile_version: self.settings.profile_version,
            principal: PrincipalBody {
                id: format!("{}-{}", principal.email, chrono::Utc::now().timestamp_millis()),
                email: &principal.email,
                name: &principal.name,
                phone: &principal.phone,
            },
            public_url_expiry: self.settings.public_url_expiry,
            session_expiry: self.settings.session_expiry,
        };

        let response = self
            .client
            .post(&self.settings.register_url)
            .timeout(self.settings.timeout)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "consent registration call failed");
                ConsentError::Transport(e.to_string())
            })?;
        let reply = UpstreamReply::from_response(response, "consent register")
            .await
            .map_err(|e| ConsentError::Transport(e.to_string()))?;

        if !reply.is_success() {
            warn!(status = reply.status, "consent registration rejected");
            return Err(ConsentError::Registration {
                status: reply.status,
                details: reply.body.to_string(),
            });
        }

        let url = reply
            .body
            .get("data")
            .and_then(|d| d.get("consentCollectUrl"))
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .ok_or(ConsentError::MissingUrl)?;

        info!("consent registered");
        Ok(url.to_string())
    }

    async fn token(&self) -> Result<String, ConsentError> {
        if let Some(token) = self.cache.get().await {
            debug!("using cached consent token");
            return Ok(token);
        }

        let _guard = self.cache.refresh_guard().await;
        if let Some(token) = self.cache.get().await {
            return Ok(token);
        }

        let response = self
            .client
            .get(&self.settings.token_url)
            .timeout(self.settings.timeout)
            .send()
            .await
            .map_err(|e| ConsentError::TokenFetch(e.to_string()))?;
        let reply = UpstreamReply::from_response(response, "consent token")
            .await
            .map_err(|e| ConsentError::TokenFetch(e.to_string()))?;

        let token = reply
            .body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                warn!(status = reply.status, "consent token endpoint returned no access_token");
                ConsentError::MissingToken
            })?
            .to_string();

        self.cache.store(token.clone(), CONSENT_TOKEN_LIFETIME).await;
        debug!("consent token fetched and cached");
        Ok(token)
    }
}
