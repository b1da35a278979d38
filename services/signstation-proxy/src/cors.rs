//! Origin enforcement for the signing endpoints
//!
//! Runs as an axum middleware in front of `/auth`, `/sign` and `/download`:
//!
//! - `OPTIONS` is answered 200 for any origin (the allowed origin is echoed,
//!   anything else gets `*`)
//! - a missing or unlisted `Origin` is rejected with 403
//! - an allowed origin using anything but `POST` gets 405
//! - allowed `POST` requests reach the handler and the response is decorated

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ORIGIN,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::error::ProxyError;
use crate::metrics;

const ALLOW_METHODS: &str = "POST, OPTIONS";

/// Origin allow-list with `https://*.domain` wildcard support.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    exact: Vec<String>,
    /// `(scheme, ".domain")` pairs from wildcard entries
    wildcards: Vec<(String, String)>,
}

impl OriginPolicy {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Self::default();
        for origin in origins {
            let origin = origin.as_ref().trim_end_matches('/');
            match origin.split_once("://*") {
                Some((scheme, suffix)) if suffix.starts_with('.') => {
                    policy
                        .wildcards
                        .push((scheme.to_ascii_lowercase(), suffix.to_ascii_lowercase()));
                }
                _ => policy.exact.push(origin.to_ascii_lowercase()),
            }
        }
        policy
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        let origin = origin.to_ascii_lowercase();
        if self.exact.iter().any(|o| *o == origin) {
            return true;
        }
        let Some((scheme, host)) = origin.split_once("://") else {
            return false;
        };
        // Port is not part of the wildcard match
        let hostname = host.split(':').next().unwrap_or(host);
        self.wildcards.iter().any(|(s, suffix)| {
            s == scheme && hostname.len() > suffix.len() && hostname.ends_with(suffix.as_str())
        })
    }
}

/// Allowed request headers for an endpoint path.
pub fn allow_headers(path: &str) -> &'static str {
    if path == "/auth" {
        "Content-Type"
    } else {
        "Content-Type, Authorization"
    }
}

fn origin_of(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|o| !o.is_empty())
}

fn decorate(response: &mut Response, allow_origin: &str, allow_headers: &'static str) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(allow_origin) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(allow_headers),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
}

/// Middleware applying the origin policy before any handler work.
pub async fn enforce(
    State(policy): State<Arc<OriginPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let allow_headers = allow_headers(&path);
    let origin = origin_of(request.headers()).map(str::to_owned);
    let allowed = origin.as_deref().is_some_and(|o| policy.is_allowed(o));

    if request.method() == Method::OPTIONS {
        let echo = match (&origin, allowed) {
            (Some(o), true) => o.as_str(),
            _ => "*",
        };
        let mut response = StatusCode::OK.into_response();
        decorate(&mut response, echo, allow_headers);
        return response;
    }

    let Some(origin) = origin.filter(|_| allowed) else {
        let presented = origin_of(request.headers()).unwrap_or("*").to_owned();
        warn!(path = %path, origin = %presented, "origin not allowed");
        metrics::record_cors_rejection();
        let mut response = ProxyError::OriginNotAllowed.into_response();
        if let Ok(value) = HeaderValue::from_str(&presented) {
            response
                .headers_mut()
                .insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        return response;
    };

    if request.method() != Method::POST {
        let mut response = ProxyError::MethodNotAllowed.into_response();
        decorate(&mut response, &origin, allow_headers);
        return response;
    }

    let mut response = next.run(request).await;
    decorate(&mut response, &origin, allow_headers);
    response
}
