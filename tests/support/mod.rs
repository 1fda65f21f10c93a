//! Shared fixtures: a scripted renderer, a webhook sink and an app builder.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode, header},
    routing::post,
};
use printpage::{
    application::{
        auth::AuthPolicy,
        delivery::DeliveryTarget,
        janitor::{Janitor, RETENTION_WINDOW},
        notifier::Notifier,
        pipeline::GenerationService,
        renderer::{PageRenderer, RenderError},
    },
    domain::document::{RenderWarning, RenderedDocument},
    infra::{
        http::{HttpState, build_router},
        storage::DocumentStorage,
    },
};
use printpage_api_types::WebhookPayload;
use tempfile::TempDir;
use tokio::{
    net::TcpListener,
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tower::ServiceExt;
use url::Url;

pub const LISTEN_BASE: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone)]
pub enum Script {
    Pdf,
    Degraded(Vec<RenderWarning>),
    Fail(String),
}

/// Stands in for Chromium. Counts calls and answers from a script.
pub struct FakeRenderer {
    calls: AtomicUsize,
    script: Script,
}

impl FakeRenderer {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn fake_pdf(target: &Url) -> Bytes {
    Bytes::from(format!("%PDF-1.4\n% rendered from {target}\n%%EOF\n"))
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, target: &Url) -> Result<RenderedDocument, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Pdf => Ok(RenderedDocument::new(fake_pdf(target), Vec::new())?),
            Script::Degraded(warnings) => {
                Ok(RenderedDocument::new(fake_pdf(target), warnings.clone())?)
            }
            Script::Fail(message) => Err(RenderError::Navigation {
                url: target.to_string(),
                message: message.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Received {
    pub path: String,
    pub bearer: Option<String>,
    pub payload: WebhookPayload,
}

/// Local HTTP server recording every webhook it receives.
/// `/ok` answers 200, `/fail` answers 500.
pub struct WebhookSink {
    base: Url,
    rx: Mutex<mpsc::UnboundedReceiver<Received>>,
    task: JoinHandle<()>,
}

impl WebhookSink {
    pub async fn start() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let ok_tx = tx.clone();
        let fail_tx = tx;

        let app = Router::new()
            .route(
                "/ok",
                post(move |headers: HeaderMap, Json(payload): Json<WebhookPayload>| {
                    let tx = ok_tx.clone();
                    async move {
                        let _ = tx.send(record("/ok", &headers, payload));
                        StatusCode::OK
                    }
                }),
            )
            .route(
                "/fail",
                post(move |headers: HeaderMap, Json(payload): Json<WebhookPayload>| {
                    let tx = fail_tx.clone();
                    async move {
                        let _ = tx.send(record("/fail", &headers, payload));
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind sink");
        let addr = listener.local_addr().expect("sink addr");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base: Url::parse(&format!("http://{addr}")).expect("sink url"),
            rx: Mutex::new(rx),
            task,
        }
    }

    pub fn url(&self, path: &str) -> Url {
        self.base.join(path).expect("sink path")
    }

    /// Next recorded webhook, failing the test after a few seconds.
    pub async fn next(&self) -> Received {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("webhook should arrive")
            .expect("sink channel open")
    }

    /// Assert nothing arrives within `window`.
    pub async fn assert_silent(&self, window: Duration) {
        let mut rx = self.rx.lock().await;
        if let Ok(Some(received)) = tokio::time::timeout(window, rx.recv()).await {
            panic!("unexpected webhook: {received:?}");
        }
    }
}

impl Drop for WebhookSink {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn record(path: &str, headers: &HeaderMap, payload: WebhookPayload) -> Received {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(str::to_string);
    Received {
        path: path.to_string(),
        bearer,
        payload,
    }
}

pub struct TestApp {
    pub router: Router,
    pub renderer: Arc<FakeRenderer>,
    pub storage: Option<Arc<DocumentStorage>>,
    pub janitor: Option<Janitor>,
    _dir: Option<TempDir>,
}

pub struct AppBuilder {
    script: Script,
    auth: AuthPolicy,
    start_url: Option<Url>,
    forward_credentials: bool,
    persisted: bool,
    retention: Duration,
    public_base_url: Option<Url>,
    cors: bool,
}

impl AppBuilder {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            auth: AuthPolicy::open(),
            start_url: None,
            forward_credentials: true,
            persisted: false,
            retention: RETENTION_WINDOW,
            public_base_url: None,
            cors: false,
        }
    }

    pub fn auth(mut self, auth: AuthPolicy) -> Self {
        self.auth = auth;
        self
    }

    pub fn start_webhook(mut self, url: Url) -> Self {
        self.start_url = Some(url);
        self
    }

    pub fn forward_credentials(mut self, forward: bool) -> Self {
        self.forward_credentials = forward;
        self
    }

    pub fn persisted(mut self) -> Self {
        self.persisted = true;
        self
    }

    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn public_base_url(mut self, url: &str) -> Self {
        self.public_base_url = Some(Url::parse(url).expect("public base url"));
        self
    }

    pub fn cors(mut self) -> Self {
        self.cors = true;
        self
    }

    pub fn build(self) -> TestApp {
        let renderer = FakeRenderer::new(self.script);
        let notifier = Notifier::with_client(
            reqwest::Client::new(),
            self.start_url,
            self.forward_credentials,
        );

        let (delivery, storage, janitor, dir) = if self.persisted {
            let dir = TempDir::new().expect("output dir");
            let storage =
                Arc::new(DocumentStorage::new(dir.path().to_path_buf()).expect("storage"));
            let janitor = Janitor::with_retention(storage.clone(), self.retention);
            (
                DeliveryTarget::persisted(storage.clone(), janitor.clone()),
                Some(storage),
                Some(janitor),
                Some(dir),
            )
        } else {
            (DeliveryTarget::Inline, None, None, None)
        };

        let renderer_dyn: Arc<dyn PageRenderer> = renderer.clone();
        let state = HttpState {
            generation: Arc::new(GenerationService::new(renderer_dyn, notifier, delivery)),
            auth: Arc::new(self.auth),
            public_base_url: self.public_base_url,
            listen_base: Url::parse(LISTEN_BASE).expect("listen base"),
        };

        TestApp {
            router: build_router(state, self.cors),
            renderer,
            storage,
            janitor,
            _dir: dir,
        }
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("json body")
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Reply {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        Reply {
            status,
            headers,
            body,
        }
    }

    pub async fn generate(&self, body: serde_json::Value, headers: &[(&str, &str)]) -> Reply {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/generate-pdf")
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Body::from(body.to_string()))
            .expect("request should build");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> Reply {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        self.send(request).await
    }
}
