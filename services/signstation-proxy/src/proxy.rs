//! Signing endpoint handlers
//!
//! Each endpoint injects the server-held credentials the browser must never
//! see and forwards to SignStation:
//! - `/auth` exchanges the client id and secret for a bearer token
//! - `/sign` turns a JSON or multipart submission into the upstream multipart
//!   form, adding department and certificate ids
//! - `/download` looks up the signed document's download URL
//!
//! Successful upstream bodies are returned verbatim. Timeouts on `/auth` and
//! `/download` get 2 retries with a 100ms fixed delay. `/sign` is not
//! idempotent upstream and is never retried.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde_json::Value;
use signstation::{SignForm, SignSubmission, SignatureCoordinate, UpstreamReply};
use tracing::{error, info, instrument, warn};

use crate::config::CredentialsConfig;
use crate::error::ProxyError;
use crate::metrics;

/// Largest request body accepted on the signing endpoints.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(100);

const MISSING_CLIENT_CREDENTIALS: &str = "SignStation credentials are missing.";
const MISSING_SIGNING_IDENTITY: &str = "SignStation department/certificate IDs are missing.";

/// Shared state for the signing handlers
#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    pub upstream_url: String,
    pub credentials: Arc<CredentialsConfig>,
    pub requests_total: Arc<AtomicU64>,
    pub in_flight: Arc<AtomicU64>,
}

/// Status recorded for a request whose handler was dropped before it
/// produced a response (client went away mid-request).
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Per-request bookkeeping: id, timing, counters.
///
/// Holds one `in_flight` slot from `begin` until drop, so a handler future
/// cancelled mid-await still releases it.
struct RequestContext {
    endpoint: &'static str,
    request_id: String,
    started: Instant,
    state: ProxyState,
    completed: bool,
}

impl RequestContext {
    fn begin(state: &ProxyState, endpoint: &'static str) -> Self {
        state.in_flight.fetch_add(1, Ordering::Relaxed);
        Self {
            endpoint,
            request_id: format!("req_{}", uuid::Uuid::new_v4().as_simple()),
            started: Instant::now(),
            state: state.clone(),
            completed: false,
        }
    }

    fn finish(mut self, result: Result<Response, ProxyError>) -> Response {
        let mut response = match result {
            Ok(response) => response,
            Err(err) => {
                if let Some(error_type) = err.upstream_error_type() {
                    metrics::record_upstream_error(self.endpoint, error_type);
                }
                if err.status().is_server_error() {
                    error!(endpoint = self.endpoint, request_id = %self.request_id, error = %err, "request failed");
                } else {
                    warn!(endpoint = self.endpoint, request_id = %self.request_id, error = %err, "request rejected");
                }
                err.into_response()
            }
        };

        self.record(response.status().as_u16());
        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }

    fn record(&mut self, status: u16) {
        self.completed = true;
        metrics::record_request(self.endpoint, status, self.started.elapsed().as_secs_f64());
        self.state.requests_total.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        if !self.completed {
            warn!(endpoint = self.endpoint, request_id = %self.request_id, "request cancelled before completion");
            self.record(CLIENT_CLOSED_REQUEST);
        }
        self.state.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

fn forward(reply: UpstreamReply) -> Response {
    (StatusCode::OK, Json(reply.body)).into_response()
}

/// Bearer token from the Authorization header, with or without the scheme.
fn bearer_token(headers: &HeaderMap) -> Result<String, ProxyError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim();
    if token.is_empty() {
        return Err(ProxyError::MissingAuthorization);
    }
    Ok(token.to_string())
}

/// Retry an idempotent upstream call on timeout.
async fn retry_on_timeout<F, Fut>(endpoint: &'static str, mut call: F) -> signstation::Result<UpstreamReply>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = signstation::Result<UpstreamReply>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Err(e) if e.is_timeout() && attempt < MAX_ATTEMPTS => {
                warn!(endpoint, attempt, error = %e, "upstream timeout, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
                attempt += 1;
            }
            Err(e) if e.is_timeout() => {
                error!(endpoint, attempts = attempt, "upstream timeout after all retries");
                return Err(e);
            }
            other => return other,
        }
    }
}

pub async fn auth(State(state): State<ProxyState>) -> Response {
    let ctx = RequestContext::begin(&state, "auth");
    let result = handle_auth(&state, &ctx.request_id).await;
    ctx.finish(result)
}

pub async fn sign(State(state): State<ProxyState>, request: Request) -> Response {
    let ctx = RequestContext::begin(&state, "sign");
    let result = handle_sign(&state, request, &ctx.request_id).await;
    ctx.finish(result)
}

pub async fn download(State(state): State<ProxyState>, headers: HeaderMap, body: Bytes) -> Response {
    let ctx = RequestContext::begin(&state, "download");
    let result = handle_download(&state, &headers, &body, &ctx.request_id).await;
    ctx.finish(result)
}

#[instrument(skip_all, fields(request_id = %request_id))]
async fn handle_auth(state: &ProxyState, request_id: &str) -> Result<Response, ProxyError> {
    let creds = &state.credentials;
    let (Some(client_id), Some(client_secret)) = (&creds.client_id, &creds.client_secret) else {
        return Err(ProxyError::MissingCredentials(MISSING_CLIENT_CREDENTIALS));
    };

    let reply = retry_on_timeout("auth", || {
        signstation::request_token(
            &state.client,
            &state.upstream_url,
            client_id,
            client_secret.expose(),
        )
    })
    .await?;

    if !reply.is_success() {
        return Err(ProxyError::Upstream {
            status: reply.status,
            message: "SignStation auth failed",
            details: reply.body,
        });
    }
    if signstation::token_from_body(&reply.body).is_none() {
        return Err(ProxyError::NoAccessToken(reply.body));
    }

    info!("issued SignStation token");
    Ok(forward(reply))
}

/// Normalized sign submission, whichever encoding it arrived in.
struct SignPayload {
    document: Bytes,
    document_name: String,
    signer_name: String,
    coordinates: Vec<SignatureCoordinate>,
}

fn missing_sign_fields() -> ProxyError {
    ProxyError::InvalidRequest(
        "Missing required fields: documentBase64, documentName, signatureCoordinates".into(),
    )
}

fn parse_json_submission(body: &[u8]) -> Result<SignPayload, ProxyError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid JSON body: {e}")))?;

    let has_document = ["documentBase64", "pdfBase64"]
        .iter()
        .any(|k| value.get(k).and_then(Value::as_str).is_some_and(|s| !s.is_empty()));
    let has_name = value
        .get("documentName")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());
    let has_coordinates = value.get("signatureCoordinates").is_some_and(Value::is_array);
    if !(has_document && has_name && has_coordinates) {
        return Err(missing_sign_fields());
    }

    let submission: SignSubmission = serde_json::from_value(value)
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid sign request: {e}")))?;
    let document = STANDARD
        .decode(submission.document_base64.trim())
        .map_err(|e| ProxyError::InvalidRequest(format!("documentBase64 is not valid base64: {e}")))?;

    Ok(SignPayload {
        document: Bytes::from(document),
        document_name: submission.document_name,
        signer_name: submission.signer_name,
        coordinates: submission.signature_coordinates,
    })
}

async fn parse_multipart_submission(mut multipart: Multipart) -> Result<SignPayload, ProxyError> {
    let mut document = None;
    let mut document_name = None;
    let mut signer_name = String::new();
    let mut coordinates = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let invalid = |e: axum::extract::multipart::MultipartError| {
            ProxyError::InvalidRequest(format!("Invalid multipart field {name}: {e}"))
        };
        match name.as_str() {
            "document" => document = Some(field.bytes().await.map_err(invalid)?),
            "documentName" => document_name = Some(field.text().await.map_err(invalid)?),
            "signerName" => signer_name = field.text().await.map_err(invalid)?,
            "signatureCoordinates" => {
                let text = field.text().await.map_err(invalid)?;
                let parsed: Vec<SignatureCoordinate> = serde_json::from_str(&text).map_err(|e| {
                    ProxyError::InvalidRequest(format!("signatureCoordinates is not valid JSON: {e}"))
                })?;
                coordinates = Some(parsed);
            }
            _ => {}
        }
    }

    match (document, document_name, coordinates) {
        (Some(document), Some(document_name), Some(coordinates))
            if !document.is_empty() && !document_name.is_empty() =>
        {
            Ok(SignPayload {
                document,
                document_name,
                signer_name,
                coordinates,
            })
        }
        _ => Err(missing_sign_fields()),
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

#[instrument(skip_all, fields(request_id = %request_id))]
async fn handle_sign(state: &ProxyState, request: Request, request_id: &str) -> Result<Response, ProxyError> {
    let token = bearer_token(request.headers())?;

    let payload = if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ProxyError::InvalidRequest(e.body_text()))?;
        parse_multipart_submission(multipart).await?
    } else {
        let body = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| ProxyError::InvalidRequest(format!("invalid request body: {e}")))?;
        parse_json_submission(&body)?
    };

    let creds = &state.credentials;
    let (Some(department_id), Some(certificate_id)) = (&creds.department_id, &creds.certificate_id)
    else {
        return Err(ProxyError::MissingCredentials(MISSING_SIGNING_IDENTITY));
    };

    let form = SignForm {
        document: payload.document,
        document_name: &payload.document_name,
        signer_name: &payload.signer_name,
        department_id,
        certificate_id,
        coordinates: &payload.coordinates,
    };
    let reply = signstation::sign_document(&state.client, &state.upstream_url, &token, &form).await?;

    if !reply.is_success() {
        return Err(ProxyError::Upstream {
            status: reply.status,
            message: "Document signing failed",
            details: reply.body,
        });
    }

    info!(document = %payload.document_name, "document signed upstream");
    Ok(forward(reply))
}

fn document_id(body: &[u8]) -> Result<String, ProxyError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid JSON body: {e}")))?;
    match value.get("documentId") {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(ProxyError::InvalidRequest(
            "Missing required field: documentId".into(),
        )),
    }
}

#[instrument(skip_all, fields(request_id = %request_id))]
async fn handle_download(
    state: &ProxyState,
    headers: &HeaderMap,
    body: &[u8],
    request_id: &str,
) -> Result<Response, ProxyError> {
    let token = bearer_token(headers)?;
    let document_id = document_id(body)?;

    let reply = retry_on_timeout("download", || {
        signstation::document_download_url(&state.client, &state.upstream_url, &token, &document_id)
    })
    .await?;

    if !reply.is_success() {
        return Err(ProxyError::Upstream {
            status: reply.status,
            message: "Failed to get download URL",
            details: reply.body,
        });
    }

    info!(document_id = %document_id, "download URL retrieved");
    Ok(forward(reply))
}
