use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "printpage_render_total",
            Unit::Count,
            "Total number of render attempts that produced a PDF."
        );
        describe_counter!(
            "printpage_render_failed_total",
            Unit::Count,
            "Total number of render attempts that failed."
        );
        describe_counter!(
            "printpage_render_degraded_total",
            Unit::Count,
            "Total number of PDFs produced after a navigation or wait timeout."
        );
        describe_histogram!(
            "printpage_render_ms",
            Unit::Milliseconds,
            "Browser launch to PDF export latency in milliseconds."
        );
        describe_counter!(
            "printpage_notification_failed_total",
            Unit::Count,
            "Total number of webhook deliveries that failed."
        );
        describe_counter!(
            "printpage_janitor_deleted_total",
            Unit::Count,
            "Total number of persisted documents removed after retention."
        );
    });
}
