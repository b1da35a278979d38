//! Request-level errors and their HTTP mapping
//!
//! Every rejection the proxy produces is a `ProxyError`; handlers return
//! `Result<Response, ProxyError>` and the JSON body is built in one place.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Origin not allowed")]
    OriginNotAllowed,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    /// Server-side credentials needed for this call are not configured.
    #[error("{0}")]
    MissingCredentials(&'static str),

    #[error("Authorization header missing")]
    MissingAuthorization,

    #[error("{0}")]
    InvalidRequest(String),

    /// Upstream answered with a non-success status.
    #[error("{message} (status {status})")]
    Upstream {
        status: u16,
        message: &'static str,
        details: Value,
    },

    /// Token endpoint succeeded without `data.accessToken`.
    #[error("No access token returned")]
    NoAccessToken(Value),

    #[error("upstream request failed: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream timed out: {0}")]
    UpstreamTimeout(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::OriginNotAllowed => StatusCode::FORBIDDEN,
            ProxyError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::MissingCredentials(_) | ProxyError::NoAccessToken(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::MissingAuthorization => StatusCode::UNAUTHORIZED,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ProxyError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Label for the upstream error counter, if this is an upstream failure.
    pub fn upstream_error_type(&self) -> Option<&'static str> {
        match self {
            ProxyError::Upstream { .. } => Some("status"),
            ProxyError::NoAccessToken(_) => Some("missing_token"),
            ProxyError::UpstreamUnavailable(_) => Some("connection"),
            ProxyError::UpstreamTimeout(_) => Some("timeout"),
            _ => None,
        }
    }

    fn body(&self) -> Value {
        match self {
            ProxyError::Upstream {
                message, details, ..
            } => json!({ "error": message, "details": details }),
            ProxyError::NoAccessToken(details) => {
                json!({ "error": "No access token returned", "details": details })
            }
            ProxyError::UpstreamUnavailable(details) => {
                json!({ "error": "Upstream request failed", "details": details })
            }
            ProxyError::UpstreamTimeout(details) => {
                json!({ "error": "Upstream request timed out", "details": details })
            }
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl From<signstation::Error> for ProxyError {
    fn from(err: signstation::Error) -> Self {
        match err {
            signstation::Error::Timeout(msg) => ProxyError::UpstreamTimeout(msg),
            signstation::Error::Http(msg) => ProxyError::UpstreamUnavailable(msg),
            signstation::Error::InvalidRequest(msg) => ProxyError::InvalidRequest(msg),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: ProxyError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn boundary_rejections_use_fixed_messages() {
        let (status, body) = body_json(ProxyError::OriginNotAllowed).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({"error": "Origin not allowed"}));

        let (status, body) = body_json(ProxyError::MethodNotAllowed).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({"error": "Method Not Allowed"}));

        let (status, body) = body_json(ProxyError::MissingAuthorization).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"error": "Authorization header missing"}));

        let (status, body) =
            body_json(ProxyError::MissingCredentials("SignStation credentials are missing.")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "SignStation credentials are missing."}));
    }

    #[tokio::test]
    async fn upstream_status_and_details_pass_through() {
        let (status, body) = body_json(ProxyError::Upstream {
            status: 422,
            message: "Document signing failed",
            details: json!({"message": "bad coordinates"}),
        })
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Document signing failed");
        assert_eq!(body["details"]["message"], "bad coordinates");
    }

    #[test]
    fn transport_errors_map_to_gateway_statuses() {
        let timeout: ProxyError = signstation::Error::Timeout("slow".into()).into();
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.upstream_error_type(), Some("timeout"));

        let refused: ProxyError = signstation::Error::Http("refused".into()).into();
        assert_eq!(refused.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(refused.upstream_error_type(), Some("connection"));

        let invalid: ProxyError = signstation::Error::InvalidRequest("bad id".into()).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.upstream_error_type(), None);
    }
}
