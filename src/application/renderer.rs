//! The seam between the pipeline and whatever drives the browser.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::{
    config::{RenderSettings, WaitStrategyKind},
    domain::{document::RenderedDocument, error::DomainError},
};

/// Fatal rendering failures. Timeouts while waiting for content are not
/// errors; they end up as warnings on the [`RenderedDocument`].
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("failed to open browser page: {0}")]
    Page(String),
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("failed to export PDF: {0}")]
    Export(String),
    #[error("browser produced an unusable document: {0}")]
    InvalidDocument(#[from] DomainError),
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Load `target` in a fresh browser session and export it as a PDF.
    async fn render(&self, target: &Url) -> Result<RenderedDocument, RenderError>;
}

/// How the renderer decides a page is ready to print.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitStrategy {
    /// Wait until no request has been in flight for `idle_window`, bounded by `timeout`.
    NetworkIdle { idle_window: Duration, timeout: Duration },
    /// Do not inspect the page; rely on the settle delay alone.
    Delay,
    /// Wait for a CSS selector to match, bounded by `timeout`.
    Selector { selector: String, timeout: Duration },
}

/// Paper layout handed to the browser's print-to-PDF call. Lengths in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin: f64,
    pub print_background: bool,
    pub display_header_footer: bool,
    pub scale: f64,
}

impl PageGeometry {
    pub const fn a4() -> Self {
        Self {
            paper_width: 8.27,
            paper_height: 11.69,
            margin: 0.0,
            print_background: true,
            display_header_footer: false,
            scale: 1.0,
        }
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub chrome_executable: Option<PathBuf>,
    pub no_sandbox: bool,
    pub viewport: Viewport,
    pub navigation_timeout: Duration,
    pub wait: WaitStrategy,
    pub settle_delay: Duration,
    pub geometry: PageGeometry,
}

impl From<&RenderSettings> for RenderOptions {
    fn from(settings: &RenderSettings) -> Self {
        let wait = match settings.wait_strategy {
            WaitStrategyKind::NetworkIdle => WaitStrategy::NetworkIdle {
                idle_window: settings.idle_window,
                timeout: settings.wait_timeout,
            },
            WaitStrategyKind::Delay => WaitStrategy::Delay,
            // Settings validation guarantees a selector for this strategy.
            WaitStrategyKind::Selector => WaitStrategy::Selector {
                selector: settings.wait_selector.clone().unwrap_or_default(),
                timeout: settings.wait_timeout,
            },
        };

        Self {
            chrome_executable: settings.chrome_executable.clone(),
            no_sandbox: settings.no_sandbox,
            viewport: Viewport {
                width: settings.viewport_width,
                height: settings.viewport_height,
                device_scale_factor: settings.device_scale_factor,
            },
            navigation_timeout: settings.navigation_timeout,
            wait,
            settle_delay: settings.settle_delay,
            geometry: PageGeometry::a4(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(kind: WaitStrategyKind, selector: Option<&str>) -> RenderSettings {
        RenderSettings {
            chrome_executable: None,
            no_sandbox: true,
            viewport_width: 1280,
            viewport_height: 1800,
            device_scale_factor: 2.0,
            navigation_timeout: Duration::from_secs(30),
            wait_strategy: kind,
            idle_window: Duration::from_millis(500),
            wait_timeout: Duration::from_secs(10),
            wait_selector: selector.map(str::to_string),
            settle_delay: Duration::from_secs(3),
        }
    }

    #[test]
    fn options_use_a4_without_margins() {
        let options = RenderOptions::from(&settings(WaitStrategyKind::NetworkIdle, None));
        assert_eq!(options.geometry, PageGeometry::a4());
        assert_eq!(options.geometry.margin, 0.0);
        assert!(options.geometry.print_background);
        assert!(!options.geometry.display_header_footer);
        assert_eq!(options.viewport.device_scale_factor, 2.0);
        assert!(matches!(options.wait, WaitStrategy::NetworkIdle { .. }));
    }

    #[test]
    fn selector_strategy_carries_selector() {
        let options = RenderOptions::from(&settings(WaitStrategyKind::Selector, Some(".ready")));
        assert_eq!(
            options.wait,
            WaitStrategy::Selector {
                selector: ".ready".to_string(),
                timeout: Duration::from_secs(10),
            }
        );
    }
}
