use printpage_api_types::WebhookPayload;
use url::Url;

use super::document::DocumentId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Success {
        pdf_url: Option<Url>,
        warnings: Vec<String>,
    },
    Failure {
        error: String,
    },
}

/// Result of one render, addressed to the caller's callback URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackNotification {
    pub id: DocumentId,
    pub outcome: NotificationOutcome,
}

impl CallbackNotification {
    pub fn success(id: DocumentId, pdf_url: Option<Url>, warnings: Vec<String>) -> Self {
        Self {
            id,
            outcome: NotificationOutcome::Success { pdf_url, warnings },
        }
    }

    pub fn failure(id: DocumentId, error: impl Into<String>) -> Self {
        Self {
            id,
            outcome: NotificationOutcome::Failure {
                error: error.into(),
            },
        }
    }

    pub fn into_payload(self) -> WebhookPayload {
        let id = self.id.to_string();
        match self.outcome {
            NotificationOutcome::Success { pdf_url, warnings } => WebhookPayload::Success {
                id,
                pdf_url: pdf_url.map(String::from),
                degraded: !warnings.is_empty(),
                warnings,
            },
            NotificationOutcome::Failure { error } => WebhookPayload::Error { id, error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_payload_carries_retrieval_url() {
        let id = DocumentId::parse("inv-1").expect("id");
        let url = Url::parse("http://localhost:8000/invoices/inv-1.pdf").expect("url");
        let payload = CallbackNotification::success(id, Some(url), Vec::new()).into_payload();

        insta::assert_snapshot!(
            serde_json::to_string(&payload).expect("serialize"),
            @r#"{"status":"success","id":"inv-1","pdf_url":"http://localhost:8000/invoices/inv-1.pdf","degraded":false}"#
        );
    }

    #[test]
    fn failure_payload_carries_error_message() {
        let id = DocumentId::parse("inv-2").expect("id");
        let notification = CallbackNotification::failure(id, "browser failed to launch");

        insta::assert_snapshot!(
            serde_json::to_string(&notification.into_payload()).expect("serialize"),
            @r#"{"status":"error","id":"inv-2","error":"browser failed to launch"}"#
        );
    }
}
