//! Wire types shared between the printpage server and its clients.
//!
//! Everything here is plain serde data. Validation happens on the server side.

use serde::{Deserialize, Serialize};

/// Body accepted by `POST /generate-pdf`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratePdfRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

/// Acknowledgement returned when the document was persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateAck {
    pub status: String,
    pub id: String,
    pub pdf_url: String,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl GenerateAck {
    pub fn success(id: impl Into<String>, pdf_url: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            id: id.into(),
            pdf_url: pdf_url.into(),
            degraded: false,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.degraded = !warnings.is_empty();
        self.warnings = warnings;
        self
    }
}

/// Payloads posted to webhook targets.
///
/// `Started` goes to the deployment-wide start webhook; `Success` and `Error`
/// go to the per-request callback URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookPayload {
    Started {
        id: String,
        url: String,
    },
    Success {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pdf_url: Option<String>,
        #[serde(default)]
        degraded: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    Error {
        id: String,
        error: String,
    },
}

impl WebhookPayload {
    pub fn id(&self) -> &str {
        match self {
            Self::Started { id, .. } | Self::Success { id, .. } | Self::Error { id, .. } => id,
        }
    }
}

/// Static liveness body served on `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LivenessResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_accepts_bare_url() {
        let request: GeneratePdfRequest =
            serde_json::from_value(json!({ "url": "https://example.com" })).expect("parse");
        assert_eq!(request.url, "https://example.com");
        assert!(request.id.is_none());
        assert!(request.callback_url.is_none());
    }

    #[test]
    fn webhook_payload_is_tagged_by_status() {
        let payload = WebhookPayload::Error {
            id: "inv-7".to_string(),
            error: "boom".to_string(),
        };
        let value = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(
            value,
            json!({ "status": "error", "id": "inv-7", "error": "boom" })
        );
        assert_eq!(payload.id(), "inv-7");
    }

    #[test]
    fn ack_marks_degraded_when_warnings_present() {
        let ack = GenerateAck::success("a", "http://host/invoices/a.pdf")
            .with_warnings(vec!["navigation timed out".to_string()]);
        assert!(ack.degraded);

        let clean = GenerateAck::success("a", "http://host/invoices/a.pdf");
        let value = serde_json::to_value(&clean).expect("serialize");
        assert!(value.get("warnings").is_none());
        assert_eq!(value["degraded"], json!(false));
    }
}
