//! One render, start to finish.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
    application::{
        delivery::{Delivered, DeliveryError, DeliveryTarget},
        notifier::{NotifyError, Notifier},
        renderer::{PageRenderer, RenderError},
    },
    domain::{notification::CallbackNotification, request::RenderRequest},
    infra::storage::StorageError,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("start notification failed: {0}")]
    StartNotification(#[source] NotifyError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to deliver document: {0}")]
    Delivery(#[source] DeliveryError),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("document `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Storage(StorageError),
}

/// Runs the linear pipeline: start webhook, render, deliver, callback.
#[derive(Clone)]
pub struct GenerationService {
    renderer: Arc<dyn PageRenderer>,
    notifier: Notifier,
    delivery: DeliveryTarget,
}

impl GenerationService {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        notifier: Notifier,
        delivery: DeliveryTarget,
    ) -> Self {
        Self {
            renderer,
            notifier,
            delivery,
        }
    }

    pub fn persists(&self) -> bool {
        self.delivery.is_persisted()
    }

    /// Render `request.target` and deliver the result.
    ///
    /// `base_url` is where persisted documents will be reachable. Callback
    /// notifications are spawned and never affect the returned value.
    pub async fn generate(
        &self,
        request: RenderRequest,
        base_url: &Url,
    ) -> Result<Delivered, PipelineError> {
        self.notifier
            .notify_start(&request)
            .await
            .map_err(PipelineError::StartNotification)?;

        let started = Instant::now();
        let rendered = self.renderer.render(&request.target).await;
        metrics::histogram!("printpage_render_ms").record(started.elapsed().as_secs_f64() * 1000.0);

        let document = match rendered {
            Ok(document) => document,
            Err(err) => {
                metrics::counter!("printpage_render_failed_total").increment(1);
                warn!(
                    target = "printpage::pipeline",
                    id = %request.id,
                    url = %request.target,
                    error = %err,
                    "render failed"
                );
                self.notify_failure(&request, err.to_string());
                return Err(PipelineError::Render(err));
            }
        };

        metrics::counter!("printpage_render_total").increment(1);
        if document.is_degraded() {
            metrics::counter!("printpage_render_degraded_total").increment(1);
        }
        let bytes = document.len();

        let delivered = match self
            .delivery
            .deliver(request.id.clone(), document, base_url)
            .await
        {
            Ok(delivered) => delivered,
            Err(err) => {
                self.notify_failure(&request, err.to_string());
                return Err(PipelineError::Delivery(err));
            }
        };

        info!(
            target = "printpage::pipeline",
            id = %request.id,
            url = %request.target,
            bytes,
            degraded = !delivered.warnings().is_empty(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document generated"
        );

        if let Some(callback) = request.callback.clone() {
            let notification = CallbackNotification::success(
                request.id.clone(),
                delivered.pdf_url().cloned(),
                delivered.warnings(),
            );
            self.notifier.dispatch(self.notifier.callback_request(
                callback,
                notification,
                request.credential.as_ref(),
            ));
        }

        Ok(delivered)
    }

    /// Read back a persisted document by its `{id}.pdf` file name.
    pub async fn fetch(&self, file_name: &str) -> Result<Bytes, RetrievalError> {
        self.delivery.fetch(file_name).await.map_err(|err| {
            if err.is_not_found() {
                RetrievalError::NotFound(file_name.to_string())
            } else {
                RetrievalError::Storage(err)
            }
        })
    }

    fn notify_failure(&self, request: &RenderRequest, error: String) {
        let Some(callback) = request.callback.clone() else {
            return;
        };
        let notification = CallbackNotification::failure(request.id.clone(), error);
        self.notifier.dispatch(self.notifier.callback_request(
            callback,
            notification,
            request.credential.as_ref(),
        ));
    }
}
