//! SignStation wire types
//!
//! The provider's reply shapes are not firmly contracted, so payload fields
//! are extracted from `serde_json::Value` with the fallbacks observed in
//! practice (`data.id`, `data.documentId`, top-level `id`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A fixed rectangle on a page where the visual signature block is drawn.
///
/// All fields are numeric-as-string on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureCoordinate {
    pub xcoordinate: String,
    pub ycoordinate: String,
    pub page_number: String,
    pub width: String,
    pub height: String,
}

impl SignatureCoordinate {
    pub fn new(x: &str, y: &str, page: u32, width: &str, height: &str) -> Self {
        Self {
            xcoordinate: x.to_string(),
            ycoordinate: y.to_string(),
            page_number: page.to_string(),
            width: width.to_string(),
            height: height.to_string(),
        }
    }

    /// Page number as an integer, if it parses.
    pub fn page(&self) -> Option<u32> {
        self.page_number.trim().parse().ok()
    }
}

/// Body of a sign call as sent to the proxy `sign` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignSubmission {
    #[serde(alias = "pdfBase64")]
    pub document_base64: String,
    pub document_name: String,
    #[serde(default)]
    pub signer_name: String,
    pub signature_coordinates: Vec<SignatureCoordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Body of a download call as sent to the proxy `download` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub document_id: String,
}

/// Token grant inside `{"data": {...}}` of an auth reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenData {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Seconds until expiry (delta, not absolute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

/// Extract the token grant from an auth reply body.
///
/// Returns `None` when `data.accessToken` is missing, not a string, or empty.
pub fn token_from_body(body: &Value) -> Option<TokenData> {
    let data = body.get("data")?;
    let token: TokenData = serde_json::from_value(data.clone()).ok()?;
    if token.access_token.is_empty() {
        return None;
    }
    Some(token)
}

/// Extract the signed document identifier from a sign reply body.
///
/// Accepts `data.id`, `data.documentId`, or a top-level `id`; numeric ids are
/// rendered as strings. Empty strings count as absent.
pub fn document_id_from_body(body: &Value) -> Option<String> {
    let candidates = [
        body.get("data").and_then(|d| d.get("id")),
        body.get("data").and_then(|d| d.get("documentId")),
        body.get("id"),
    ];
    candidates.into_iter().flatten().find_map(|value| match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Classified `data` field of a download reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadPayload {
    /// A usable URL string
    Url(String),
    /// `data` missing, null, or an empty string
    Missing,
    /// `data` present but not a string (object, number, ...)
    NotAString,
}

/// Classify the `data` field of a download reply body.
pub fn download_url_from_body(body: &Value) -> DownloadPayload {
    match body.get("data") {
        None | Some(Value::Null) => DownloadPayload::Missing,
        Some(Value::String(s)) if s.trim().is_empty() => DownloadPayload::Missing,
        Some(Value::String(s)) => DownloadPayload::Url(s.clone()),
        Some(_) => DownloadPayload::NotAString,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coordinate_uses_wire_field_names() {
        let coord = SignatureCoordinate::new("484.78", "30.15", 1, "112.91", "45.16");
        let json = serde_json::to_value(&coord).unwrap();
        assert_eq!(json["xcoordinate"], "484.78");
        assert_eq!(json["ycoordinate"], "30.15");
        assert_eq!(json["pageNumber"], "1");
        assert_eq!(json["width"], "112.91");
        assert_eq!(json["height"], "45.16");
        assert_eq!(coord.page(), Some(1));
    }

    #[test]
    fn submission_accepts_pdf_base64_alias() {
        let body = json!({
            "pdfBase64": "JVBERi0=",
            "documentName": "Policy_Asha",
            "signatureCoordinates": []
        });
        let submission: SignSubmission = serde_json::from_value(body).unwrap();
        assert_eq!(submission.document_base64, "JVBERi0=");
        assert_eq!(submission.signer_name, "");
        assert!(submission.signature_coordinates.is_empty());
        assert!(submission.idempotency_key.is_none());
    }

    #[test]
    fn token_extracted_from_data_envelope() {
        let body = json!({"code": 200, "data": {"accessToken": "at_1", "tokenType": "Bearer", "expiresIn": 1800}});
        let token = token_from_body(&body).unwrap();
        assert_eq!(token.access_token, "at_1");
        assert_eq!(token.expires_in, Some(1800));
    }

    #[test]
    fn token_missing_or_empty_is_none() {
        assert!(token_from_body(&json!({"data": {}})).is_none());
        assert!(token_from_body(&json!({"data": {"accessToken": ""}})).is_none());
        assert!(token_from_body(&json!({"message": "ok"})).is_none());
    }

    #[test]
    fn document_id_fallbacks() {
        assert_eq!(
            document_id_from_body(&json!({"data": {"id": "123"}})).as_deref(),
            Some("123")
        );
        assert_eq!(
            document_id_from_body(&json!({"data": {"documentId": "abc"}})).as_deref(),
            Some("abc")
        );
        assert_eq!(
            document_id_from_body(&json!({"id": 77})).as_deref(),
            Some("77")
        );
        assert_eq!(document_id_from_body(&json!({"data": {"id": ""}})), None);
        assert_eq!(document_id_from_body(&json!({"data": {"status": "ok"}})), None);
    }

    #[test]
    fn download_payload_classification() {
        assert_eq!(
            download_url_from_body(&json!({"data": "https://host/doc/123?sig=x"})),
            DownloadPayload::Url("https://host/doc/123?sig=x".into())
        );
        assert_eq!(download_url_from_body(&json!({"data": null})), DownloadPayload::Missing);
        assert_eq!(download_url_from_body(&json!({})), DownloadPayload::Missing);
        assert_eq!(download_url_from_body(&json!({"data": ""})), DownloadPayload::Missing);
        assert_eq!(
            download_url_from_body(&json!({"data": {"url": "x"}})),
            DownloadPayload::NotAString
        );
        assert_eq!(download_url_from_body(&json!({"data": 5})), DownloadPayload::NotAString);
    }
}
