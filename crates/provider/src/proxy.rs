//! Proxy provider: routes calls through the same-origin signing proxy.
//!
//! The proxy exposes `auth`, `sign`, and `download` as POST endpoints and
//! enforces an origin allow-list, so every request carries the configured
//! `Origin` header.

use crate::{ProviderError, ProviderFuture, ProviderResponse, SigningProvider};
use reqwest::RequestBuilder;
use reqwest::header::ORIGIN;
use signstation::{DownloadRequest, SignSubmission, UpstreamReply, endpoint};
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-request timeout for proxy calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP provider targeting the proxy service.
#[derive(Debug, Clone)]
pub struct ProxyProvider {
    client: reqwest::Client,
    base_url: String,
    origin: Option<String>,
    timeout: Duration,
}

impl ProxyProvider {
    /// `base_url` is the proxy root, e.g. `https://app.example/.signing`.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            origin: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Origin presented to the proxy's allow-list.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .post(endpoint(&self.base_url, path))
            .timeout(self.timeout);
        match &self.origin {
            Some(origin) => builder.header(ORIGIN, origin),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        operation: &'static str,
    ) -> crate::Result<ProviderResponse> {
        let response = builder.send().await.map_err(|e| {
            let err = ProviderError::from(signstation::Error::from_reqwest(operation, e));
            warn!(operation, error = %err, "proxy call failed");
            err
        })?;
        let reply = UpstreamReply::from_response(response, operation).await?;
        debug!(operation, status = reply.status, "proxy answered");
        Ok(reply)
    }
}

impl SigningProvider for ProxyProvider {
    fn id(&self) -> &str {
        "proxy"
    }

    fn request_token(&self) -> ProviderFuture<'_> {
        Box::pin(async move { self.send(self.post("/auth"), "auth").await })
    }

    fn submit_document<'a>(
        &'a self,
        token: &'a str,
        submission: &'a SignSubmission,
    ) -> ProviderFuture<'a> {
        Box::pin(async move {
            let builder = self.post("/sign").bearer_auth(token).json(submission);
            self.send(builder, "sign").await
        })
    }

    fn request_download_url<'a>(
        &'a self,
        token: &'a str,
        document_id: &'a str,
    ) -> ProviderFuture<'a> {
        Box::pin(async move {
            let builder = self
                .post("/download")
                .bearer_auth(token)
                .json(&DownloadRequest {
                    document_id: document_id.to_string(),
                });
            self.send(builder, "download").await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use serde_json::{Value, json};
    use signstation::SignatureCoordinate;

    fn header(headers: &HeaderMap, name: &str) -> String {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    /// Proxy stand-in that echoes the headers and body it received.
    async fn start_echo_proxy() -> String {
        async fn echo(headers: HeaderMap, body: String) -> Json<Value> {
            let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            Json(json!({
                "origin": header(&headers, "origin"),
                "authorization": header(&headers, "authorization"),
                "body": parsed,
            }))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new()
            .route("/auth", post(echo))
            .route("/sign", post(echo))
            .route("/download", post(echo))
            .route(
                "/missing",
                post(|| async { (StatusCode::NOT_FOUND, "not json") }),
            );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn auth_sends_origin_without_credentials() {
        let base = start_echo_proxy().await;
        let provider =
            ProxyProvider::new(reqwest::Client::new(), &base).with_origin("https://app.example");

        let response = provider.request_token().await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["origin"], "https://app.example");
        assert_eq!(response.body["authorization"], "");
        assert_eq!(response.body["body"], Value::Null);
    }

    #[tokio::test]
    async fn sign_posts_submission_with_bearer() {
        let base = start_echo_proxy().await;
        let provider = ProxyProvider::new(reqwest::Client::new(), base);
        let submission = SignSubmission {
            document_base64: "JVBERi0xLjQ=".into(),
            document_name: "Policy_Asha".into(),
            signer_name: "Asha".into(),
            signature_coordinates: vec![SignatureCoordinate::new("1", "2", 1, "3", "4")],
            idempotency_key: Some("k1".into()),
        };

        let response = provider.submit_document("at_1", &submission).await.unwrap();
        let body = &response.body["body"];
        assert_eq!(response.body["authorization"], "Bearer at_1");
        assert_eq!(body["documentBase64"], "JVBERi0xLjQ=");
        assert_eq!(body["documentName"], "Policy_Asha");
        assert_eq!(body["signerName"], "Asha");
        assert_eq!(body["signatureCoordinates"][0]["pageNumber"], "1");
        assert_eq!(body["idempotencyKey"], "k1");
    }

    #[tokio::test]
    async fn download_posts_document_id() {
        let base = start_echo_proxy().await;
        let provider = ProxyProvider::new(reqwest::Client::new(), base);

        let response = provider.request_download_url("at_2", "123").await.unwrap();
        assert_eq!(response.body["body"]["documentId"], "123");
        assert_eq!(response.body["authorization"], "Bearer at_2");
    }

    #[tokio::test]
    async fn non_json_error_body_is_wrapped() {
        let base = start_echo_proxy().await;
        let provider = ProxyProvider::new(reqwest::Client::new(), base);

        let response = provider.send(provider.post("/missing"), "missing").await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.body["rawResponse"], "not json");
    }

    #[tokio::test]
    async fn unreachable_proxy_is_transport_error() {
        let provider = ProxyProvider::new(reqwest::Client::new(), "http://127.0.0.1:1");
        let result = provider.request_token().await;
        assert!(
            matches!(result, Err(ProviderError::Transport(_))),
            "got: {result:?}"
        );
    }

    #[test]
    fn id_returns_proxy() {
        let provider = ProxyProvider::new(reqwest::Client::new(), "http://unused");
        assert_eq!(provider.id(), "proxy");
    }
}
