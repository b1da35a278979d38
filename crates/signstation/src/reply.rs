//! Upstream reply capture

use serde_json::{Value, json};

use crate::error::{Error, Result};

/// Status and JSON body of an upstream response.
///
/// Bodies that are not valid JSON are wrapped as `{"rawResponse": "<text>"}`
/// so the proxy can always answer with JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: Value,
}

impl UpstreamReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Capture status and body of a response. Only reading the body can fail.
    pub async fn from_response(response: reqwest::Response, context: &str) -> Result<Self> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| Error::from_reqwest(context, e))?;
        Ok(Self {
            status,
            body: parse_body(&text),
        })
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "rawResponse": text }))
}
