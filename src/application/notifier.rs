//! Outbound webhook delivery.
//!
//! Two kinds of calls leave the service: the deployment-wide start webhook,
//! awaited before any rendering happens, and per-request callbacks, spawned
//! in the background once the outcome is known.

use printpage_api_types::WebhookPayload;
use reqwest::Client;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::WebhookSettings,
    domain::{
        notification::CallbackNotification,
        request::{Credential, RenderRequest},
    },
};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("webhook {url} answered with status {status}")]
    Status { url: String, status: u16 },
}

/// One outbound webhook call, fully described up front.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub target: Url,
    pub payload: WebhookPayload,
    pub bearer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    start_url: Option<Url>,
    forward_credentials: bool,
}

impl Notifier {
    pub fn new(settings: &WebhookSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self::with_client(
            client,
            settings.start_url.clone(),
            settings.forward_credentials,
        ))
    }

    pub fn with_client(client: Client, start_url: Option<Url>, forward_credentials: bool) -> Self {
        Self {
            client,
            start_url,
            forward_credentials,
        }
    }

    /// A notifier without a start webhook, using a default client.
    pub fn disabled() -> Self {
        Self::with_client(Client::new(), None, false)
    }

    pub fn start_url(&self) -> Option<&Url> {
        self.start_url.as_ref()
    }

    /// Announce a render to the start webhook. A no-op when none is configured.
    pub async fn notify_start(&self, request: &RenderRequest) -> Result<(), NotifyError> {
        let Some(target) = self.start_url.clone() else {
            return Ok(());
        };

        let notification = NotificationRequest {
            target,
            payload: WebhookPayload::Started {
                id: request.id.to_string(),
                url: request.target.to_string(),
            },
            bearer: self.bearer_for(request.credential.as_ref()),
        };
        self.send(&notification).await
    }

    /// Build the callback request for a finished render.
    pub fn callback_request(
        &self,
        target: Url,
        notification: CallbackNotification,
        credential: Option<&Credential>,
    ) -> NotificationRequest {
        NotificationRequest {
            target,
            payload: notification.into_payload(),
            bearer: self.bearer_for(credential),
        }
    }

    /// Send in the background. Failures are logged and counted, never returned.
    pub fn dispatch(&self, request: NotificationRequest) -> JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.send(&request).await {
                warn!(
                    target = "printpage::notifier",
                    id = request.payload.id(),
                    url = %request.target,
                    error = %err,
                    "callback notification failed"
                );
            }
        })
    }

    pub async fn send(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        let mut builder = self
            .client
            .post(request.target.clone())
            .json(&request.payload);
        if let Some(token) = request.bearer.as_deref() {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|source| {
            metrics::counter!("printpage_notification_failed_total").increment(1);
            NotifyError::Transport {
                url: request.target.to_string(),
                source,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            metrics::counter!("printpage_notification_failed_total").increment(1);
            return Err(NotifyError::Status {
                url: request.target.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(
            target = "printpage::notifier",
            id = request.payload.id(),
            url = %request.target,
            status = status.as_u16(),
            "webhook delivered"
        );
        Ok(())
    }

    fn bearer_for(&self, credential: Option<&Credential>) -> Option<String> {
        if !self.forward_credentials {
            return None;
        }
        credential.map(|credential| credential.expose().to_string())
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::disabled()
    }
}
