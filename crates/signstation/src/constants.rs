//! SignStation endpoint paths and fixed signing metadata

/// Production SignStation host
pub const DEFAULT_BASE_URL: &str = "https://sign-station.theleegality.com";

/// Client-credential exchange endpoint
pub const TOKEN_PATH: &str = "/api/v1/auth/token";

/// Multipart document signing endpoint
pub const SIGN_PATH: &str = "/api/v1/documents/sign";

/// Location string stamped into every signature
pub const SIGNING_LOCATION: &str = "India";

/// Reason string stamped into every signature
pub const SIGNING_REASON: &str = "Policy Document Signing";

/// Token lifetime assumed when the auth reply omits `expiresIn` (seconds)
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 1800;

/// Path of the download-URL endpoint for a signed document.
pub fn download_url_path(document_id: &str) -> String {
    format!("/api/v1/documents/{document_id}/document-download-url")
}

/// Join a configured base URL with an endpoint path, tolerating a trailing slash.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
