//! Headless Chromium driven over the DevTools protocol.
//!
//! Every render gets its own browser process and profile directory. Nothing is
//! shared between requests, and the process is torn down whichever way the
//! render ends.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{
    Browser, BrowserConfig, Page,
    cdp::browser_protocol::{
        network::{EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent},
        page::PrintToPdfParams,
    },
    error::CdpError,
    handler::viewport::Viewport as CdpViewport,
};
use dashmap::DashSet;
use futures::{StreamExt, stream};
use tempfile::TempDir;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    application::renderer::{
        PageGeometry, PageRenderer, RenderError, RenderOptions, Viewport, WaitStrategy,
    },
    domain::document::{RenderWarning, RenderWarningKind, RenderedDocument},
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Floor for every DevTools command, PDF export included.
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Headroom so our own navigation timer always fires before the protocol's.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

pub struct ChromiumRenderer {
    options: RenderOptions,
}

impl ChromiumRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    fn browser_config(&self, profile: &Path) -> Result<BrowserConfig, RenderError> {
        let viewport = &self.options.viewport;
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile)
            .window_size(viewport.width, viewport.height)
            .viewport(cdp_viewport(viewport))
            .request_timeout(request_timeout(self.options.navigation_timeout));
        if self.options.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(executable) = &self.options.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(RenderError::Launch)
    }

    async fn render_in_session(
        &self,
        browser: &Browser,
        target: &Url,
    ) -> Result<RenderedDocument, RenderError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|err| RenderError::Page(err.to_string()))?;

        let monitor = match self.options.wait {
            WaitStrategy::NetworkIdle { .. } => Some(NetworkMonitor::attach(&page).await?),
            _ => None,
        };

        let mut warnings = Vec::new();
        warnings.extend(self.navigate(&page, target).await?);
        warnings.extend(self.wait_until_ready(&page, monitor.as_ref()).await);
        drop(monitor);

        if !self.options.settle_delay.is_zero() {
            tokio::time::sleep(self.options.settle_delay).await;
        }

        let bytes = page
            .pdf(print_params(&self.options.geometry))
            .await
            .map_err(|err| RenderError::Export(err.to_string()))?;

        for warning in &warnings {
            warn!(
                target = "printpage::browser",
                url = %target,
                kind = warning.kind.as_str(),
                detail = %warning.message,
                "render degraded"
            );
        }

        Ok(RenderedDocument::new(bytes, warnings)?)
    }

    async fn navigate(
        &self,
        page: &Page,
        target: &Url,
    ) -> Result<Option<RenderWarning>, RenderError> {
        let timeout = self.options.navigation_timeout;
        let outcome = tokio::time::timeout(timeout, page.goto(target.as_str()))
            .await
            .ok()
            .map(|result| result.map(|_| ()));
        navigation_outcome(target, timeout, outcome)
    }

    async fn wait_until_ready(
        &self,
        page: &Page,
        monitor: Option<&NetworkMonitor>,
    ) -> Option<RenderWarning> {
        match &self.options.wait {
            WaitStrategy::Delay => None,
            WaitStrategy::NetworkIdle {
                idle_window,
                timeout,
            } => match monitor {
                Some(monitor) => wait_for_network_idle(monitor, *idle_window, *timeout).await,
                None => None,
            },
            WaitStrategy::Selector { selector, timeout } => {
                wait_for_selector(page, selector, *timeout).await
            }
        }
    }
}

/// `None` means our own timer ran out. A protocol-level timeout is treated
/// the same way; any other navigation error is fatal.
fn navigation_outcome(
    target: &Url,
    timeout: Duration,
    outcome: Option<Result<(), CdpError>>,
) -> Result<Option<RenderWarning>, RenderError> {
    match outcome {
        Some(Ok(())) => Ok(None),
        None | Some(Err(CdpError::Timeout)) => Ok(Some(RenderWarning::new(
            RenderWarningKind::NavigationTimeout,
            format!(
                "page did not finish loading within {} ms",
                timeout.as_millis()
            ),
        ))),
        Some(Err(err)) => Err(RenderError::Navigation {
            url: target.to_string(),
            message: err.to_string(),
        }),
    }
}

fn request_timeout(navigation_timeout: Duration) -> Duration {
    navigation_timeout.max(MIN_REQUEST_TIMEOUT) + REQUEST_TIMEOUT_MARGIN
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, target: &Url) -> Result<RenderedDocument, RenderError> {
        let profile = TempDir::new().map_err(|err| {
            RenderError::Launch(format!("failed to create profile directory: {err}"))
        })?;
        let config = self.browser_config(profile.path())?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| RenderError::Launch(err.to_string()))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(target = "printpage::browser", error = %err, "devtools event error");
                }
            }
        });

        debug!(target = "printpage::browser", url = %target, "browser session started");
        let result = self.render_in_session(&browser, target).await;
        teardown(&mut browser, handler_task).await;
        drop(profile);

        if let Ok(document) = &result {
            info!(
                target = "printpage::browser",
                url = %target,
                bytes = document.len(),
                "page exported"
            );
        }
        result
    }
}

async fn teardown(browser: &mut Browser, handler_task: JoinHandle<()>) {
    if let Err(err) = browser.close().await {
        debug!(target = "printpage::browser", error = %err, "browser close failed");
    }
    if let Err(err) = browser.wait().await {
        debug!(target = "printpage::browser", error = %err, "browser exit wait failed");
    }
    handler_task.abort();
}

async fn wait_for_network_idle(
    monitor: &NetworkMonitor,
    idle_window: Duration,
    timeout: Duration,
) -> Option<RenderWarning> {
    let deadline = Instant::now() + timeout;
    let mut tracker = IdleTracker::new(idle_window);

    loop {
        if tracker.observe(monitor.inflight(), Instant::now()) {
            return None;
        }
        if Instant::now() >= deadline {
            return Some(RenderWarning::new(
                RenderWarningKind::NetworkIdleTimeout,
                format!(
                    "{} request(s) still in flight after {} ms",
                    monitor.inflight(),
                    timeout.as_millis()
                ),
            ));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

enum NetworkChange {
    Started(String),
    Settled(String),
}

/// Follows the page's network events and keeps the set of requests that
/// have started but neither finished nor failed.
struct NetworkMonitor {
    inflight: Arc<DashSet<String>>,
    task: JoinHandle<()>,
}

impl NetworkMonitor {
    async fn attach(page: &Page) -> Result<Self, RenderError> {
        let started = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|err| RenderError::Page(err.to_string()))?
            .map(|event| NetworkChange::Started(event.request_id.inner().clone()));
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|err| RenderError::Page(err.to_string()))?
            .map(|event| NetworkChange::Settled(event.request_id.inner().clone()));
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|err| RenderError::Page(err.to_string()))?
            .map(|event| NetworkChange::Settled(event.request_id.inner().clone()));

        let inflight = Arc::new(DashSet::new());
        let tracked = inflight.clone();
        let mut changes = stream::select(started, stream::select(finished, failed));
        let task = tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                match change {
                    NetworkChange::Started(id) => {
                        tracked.insert(id);
                    }
                    NetworkChange::Settled(id) => {
                        tracked.remove(&id);
                    }
                }
            }
        });

        Ok(Self { inflight, task })
    }

    fn inflight(&self) -> usize {
        self.inflight.len()
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn wait_for_selector(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> Option<RenderWarning> {
    let deadline = Instant::now() + timeout;
    loop {
        if page.find_element(selector).await.is_ok() {
            return None;
        }
        if Instant::now() >= deadline {
            return Some(RenderWarning::new(
                RenderWarningKind::SelectorTimeout,
                format!(
                    "`{selector}` did not appear within {} ms",
                    timeout.as_millis()
                ),
            ));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Tracks how long the page has had no requests in flight.
#[derive(Debug)]
struct IdleTracker {
    idle_window: Duration,
    quiet_since: Option<Instant>,
}

impl IdleTracker {
    fn new(idle_window: Duration) -> Self {
        Self {
            idle_window,
            quiet_since: None,
        }
    }

    /// Record a sample; true once nothing has been in flight for the whole window.
    fn observe(&mut self, inflight: usize, now: Instant) -> bool {
        if inflight > 0 {
            self.quiet_since = None;
            return false;
        }
        let since = *self.quiet_since.get_or_insert(now);
        now.duration_since(since) >= self.idle_window
    }
}

fn cdp_viewport(viewport: &Viewport) -> CdpViewport {
    CdpViewport {
        width: viewport.width,
        height: viewport.height,
        device_scale_factor: Some(viewport.device_scale_factor),
        emulating_mobile: false,
        is_landscape: false,
        has_touch: false,
    }
}

fn print_params(geometry: &PageGeometry) -> PrintToPdfParams {
    PrintToPdfParams {
        paper_width: Some(geometry.paper_width),
        paper_height: Some(geometry.paper_height),
        margin_top: Some(geometry.margin),
        margin_bottom: Some(geometry.margin),
        margin_left: Some(geometry.margin),
        margin_right: Some(geometry.margin),
        print_background: Some(geometry.print_background),
        display_header_footer: Some(geometry.display_header_footer),
        scale: Some(geometry.scale),
        ..Default::default()
    }
}
