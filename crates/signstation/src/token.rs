//! Client-credential token exchange
//!
//! The proxy holds the client id/secret; callers of the proxy never see them.
//! The reply is returned as-is so the proxy can forward the provider's
//! `{data: {accessToken, tokenType, expiresIn}}` envelope.

use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::{TOKEN_PATH, endpoint};
use crate::error::{Error, Result};
use crate::reply::UpstreamReply;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialExchange<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

/// Exchange client credentials for a bearer token.
///
/// Transport failures are errors; a non-success status is returned in the
/// reply for the caller to classify.
pub async fn request_token(
    client: &reqwest::Client,
    base_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<UpstreamReply> {
    let response = client
        .post(endpoint(base_url, TOKEN_PATH))
        .json(&CredentialExchange {
            client_id,
            client_secret,
        })
        .send()
        .await
        .map_err(|e| Error::from_reqwest("token request failed", e))?;

    let reply = UpstreamReply::from_response(response, "reading token reply").await?;
    if reply.is_success() {
        debug!(status = reply.status, "token endpoint answered");
    } else {
        warn!(status = reply.status, "token endpoint rejected credentials");
    }
    Ok(reply)
}
