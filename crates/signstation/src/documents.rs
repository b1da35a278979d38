//! Document signing and download-URL lookup
//!
//! Signing is the only state-mutating call: each successful submission creates
//! a signed-document record on the provider side. Callers must not retry it
//! blindly.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info, warn};

use crate::constants::{SIGN_PATH, SIGNING_LOCATION, SIGNING_REASON, download_url_path, endpoint};
use crate::error::{Error, Result};
use crate::reply::UpstreamReply;
use crate::types::SignatureCoordinate;

/// Everything the multipart sign submission carries.
///
/// Department and certificate ids are server-held configuration; they are
/// merged in by the proxy, never supplied by the browser.
#[derive(Debug, Clone)]
pub struct SignForm<'a> {
    pub document: Bytes,
    pub document_name: &'a str,
    pub signer_name: &'a str,
    pub department_id: &'a str,
    pub certificate_id: &'a str,
    pub coordinates: &'a [SignatureCoordinate],
}

impl SignForm<'_> {
    /// Text fields of the submission in the order they are appended.
    ///
    /// Coordinates are flattened as `signatureCoordinates[i].<field>`.
    pub fn text_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("name".to_string(), self.document_name.to_string()),
            ("departmentId".to_string(), self.department_id.to_string()),
            ("certificateId".to_string(), self.certificate_id.to_string()),
            ("signerName".to_string(), self.signer_name.to_string()),
        ];
        for (index, coord) in self.coordinates.iter().enumerate() {
            let prefix = format!("signatureCoordinates[{index}]");
            fields.push((format!("{prefix}.xcoordinate"), coord.xcoordinate.clone()));
            fields.push((format!("{prefix}.ycoordinate"), coord.ycoordinate.clone()));
            fields.push((format!("{prefix}.pageNumber"), coord.page_number.clone()));
            fields.push((format!("{prefix}.width"), coord.width.clone()));
            fields.push((format!("{prefix}.height"), coord.height.clone()));
        }
        fields.push(("location".to_string(), SIGNING_LOCATION.to_string()));
        fields.push(("reason".to_string(), SIGNING_REASON.to_string()));
        fields
    }

    fn multipart(&self) -> Result<Form> {
        let file = Part::bytes(self.document.to_vec())
            .file_name(format!("{}.pdf", self.document_name))
            .mime_str("application/pdf")
            .map_err(|e| Error::InvalidRequest(format!("document part: {e}")))?;

        let mut form = Form::new().part("file", file);
        for (name, value) in self.text_fields() {
            form = form.text(name, value);
        }
        Ok(form)
    }
}

/// Submit a document for signing. Never retried here.
pub async fn sign_document(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    form: &SignForm<'_>,
) -> Result<UpstreamReply> {
    let multipart = form.multipart()?;
    info!(
        document = form.document_name,
        bytes = form.document.len(),
        placements = form.coordinates.len(),
        "submitting document for signing"
    );

    let response = client
        .post(endpoint(base_url, SIGN_PATH))
        .bearer_auth(token)
        .header(reqwest::header::ACCEPT, "*/*")
        .multipart(multipart)
        .send()
        .await
        .map_err(|e| Error::from_reqwest("sign request failed", e))?;

    let reply = UpstreamReply::from_response(response, "reading sign reply").await?;
    if !reply.is_success() {
        warn!(status = reply.status, document = form.document_name, "signing rejected");
    }
    Ok(reply)
}

/// A document id is spliced into the URL path, so it must stay one literal
/// segment: no separators, no dot segments, no percent escapes.
fn is_path_segment(document_id: &str) -> bool {
    !document_id.is_empty()
        && document_id != "."
        && document_id != ".."
        && !document_id.contains(['/', '\\', '?', '#', '%'])
}

/// Look up the time-limited download URL of a signed document.
pub async fn document_download_url(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    document_id: &str,
) -> Result<UpstreamReply> {
    if !is_path_segment(document_id) {
        return Err(Error::InvalidRequest(format!(
            "document id {document_id:?} is not a path segment"
        )));
    }

    let response = client
        .get(endpoint(base_url, &download_url_path(document_id)))
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| Error::from_reqwest("download url request failed", e))?;

    let reply = UpstreamReply::from_response(response, "reading download reply").await?;
    debug!(status = reply.status, document_id, "download url lookup answered");
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::extract::{Multipart, Path};
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use serde_json::{Map, Value, json};

    async fn spawn_upstream(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Upstream stand-in that echoes every multipart field back as JSON.
    async fn echo_multipart(headers: HeaderMap, mut multipart: Multipart) -> Json<Value> {
        let mut fields = Map::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.unwrap();
            match file_name {
                Some(file_name) => {
                    fields.insert(format!("{name}.filename"), json!(file_name));
                    fields.insert(format!("{name}.content_type"), json!(content_type));
                    fields.insert(format!("{name}.len"), json!(data.len()));
                }
                None => {
                    fields.insert(name, json!(String::from_utf8_lossy(&data)));
                }
            }
        }
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Json(json!({"data": {"id": "123"}, "authorization": auth, "fields": fields}))
    }

    fn policy_coordinates() -> Vec<SignatureCoordinate> {
        vec![
            SignatureCoordinate::new("484.7", "30.1", 1, "112.9", "45.1"),
            SignatureCoordinate::new("141.5", "120.4", 3, "112.9", "45.1"),
        ]
    }

    #[test]
    fn text_fields_flatten_coordinates() {
        let coords = policy_coordinates();
        let form = SignForm {
            document: Bytes::from_static(b"%PDF-1.4"),
            document_name: "Policy_Asha",
            signer_name: "Asha",
            department_id: "dept-1",
            certificate_id: "cert-1",
            coordinates: &coords,
        };
        let fields = form.text_fields();
        let lookup = |key: &str| {
            fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(lookup("name"), Some("Policy_Asha"));
        assert_eq!(lookup("signatureCoordinates[0].xcoordinate"), Some("484.7"));
        assert_eq!(lookup("signatureCoordinates[1].pageNumber"), Some("3"));
        assert_eq!(lookup("location"), Some(SIGNING_LOCATION));
        assert_eq!(lookup("reason"), Some(SIGNING_REASON));
        // 4 metadata + 5 per coordinate + location + reason
        assert_eq!(fields.len(), 4 + 10 + 2);
    }

    #[tokio::test]
    async fn sign_sends_multipart_with_pdf_part() {
        let base = spawn_upstream(axum::Router::new().route(SIGN_PATH, post(echo_multipart))).await;
        let coords = policy_coordinates();
        let form = SignForm {
            document: Bytes::from_static(b"%PDF-1.4 test"),
            document_name: "Policy_Asha",
            signer_name: "Asha",
            department_id: "dept-1",
            certificate_id: "cert-1",
            coordinates: &coords,
        };

        let reply = sign_document(&reqwest::Client::new(), &base, "at_1", &form)
            .await
            .unwrap();

        assert!(reply.is_success());
        assert_eq!(reply.body["authorization"], "Bearer at_1");
        let fields = &reply.body["fields"];
        assert_eq!(fields["file.filename"], "Policy_Asha.pdf");
        assert_eq!(fields["file.content_type"], "application/pdf");
        assert_eq!(fields["file.len"], 13);
        assert_eq!(fields["departmentId"], "dept-1");
        assert_eq!(fields["certificateId"], "cert-1");
        assert_eq!(fields["signatureCoordinates[1].ycoordinate"], "120.4");
    }

    #[tokio::test]
    async fn sign_with_no_coordinates_still_submits() {
        let base = spawn_upstream(axum::Router::new().route(SIGN_PATH, post(echo_multipart))).await;
        let form = SignForm {
            document: Bytes::from_static(b"%PDF"),
            document_name: "Empty",
            signer_name: "",
            department_id: "d",
            certificate_id: "c",
            coordinates: &[],
        };

        let reply = sign_document(&reqwest::Client::new(), &base, "at", &form)
            .await
            .unwrap();
        let fields = reply.body["fields"].as_object().unwrap();
        assert!(!fields.keys().any(|k| k.starts_with("signatureCoordinates")));
    }

    #[tokio::test]
    async fn download_url_uses_get_with_bearer() {
        let router = axum::Router::new().route(
            "/api/v1/documents/{id}/document-download-url",
            get(|Path(id): Path<String>, headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({"data": format!("https://host/doc/{id}?sig=abc"), "authorization": auth}))
            }),
        );
        let base = spawn_upstream(router).await;

        let reply = document_download_url(&reqwest::Client::new(), &base, "at_9", "123")
            .await
            .unwrap();
        assert_eq!(reply.body["data"], "https://host/doc/123?sig=abc");
        assert_eq!(reply.body["authorization"], "Bearer at_9");
    }

    #[test]
    fn plain_ids_are_path_segments() {
        assert!(is_path_segment("123"));
        assert!(is_path_segment("doc-9.v2"));
        assert!(is_path_segment("..."));
        assert!(!is_path_segment(".."));
        assert!(!is_path_segment("%2e%2e"));
    }

    #[tokio::test]
    async fn download_rejects_ids_that_escape_the_path() {
        let client = reqwest::Client::new();
        for bad in ["", "../admin", "1?x=2", "a#b", "..", ".", "%2e%2e", "%2E%2E", "a%2fb", "..\\x"] {
            let result = document_download_url(&client, "http://127.0.0.1:1", "at", bad).await;
            assert!(matches!(result, Err(Error::InvalidRequest(_))), "{bad:?} accepted");
        }
    }
}
