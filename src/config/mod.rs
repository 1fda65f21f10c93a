//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{fmt, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::{
    Deserialize, Deserializer,
    de::{self, SeqAccess, Visitor},
};
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{CliArgs, Command, RenderArgs, RenderOverrides, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "printpage";
const ENV_PREFIX: &str = "PRINTPAGE";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 1800;
const DEFAULT_DEVICE_SCALE_FACTOR: f64 = 2.0;
const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_IDLE_WINDOW_MS: u64 = 500;
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SETTLE_DELAY_MS: u64 = 3_000;
const DEFAULT_DELIVERY_DIR: &str = "invoices";
const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Bare environment variables honoured for compatibility with container platforms.
pub const PORT_ENV: &str = "PORT";
pub const START_WEBHOOK_URL_ENV: &str = "START_WEBHOOK_URL";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub delivery: DeliverySettings,
    pub auth: AuthSettings,
    pub webhook: WebhookSettings,
    pub cors: CorsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategyKind {
    NetworkIdle,
    Delay,
    Selector,
}

impl FromStr for WaitStrategyKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "network_idle" | "networkidle" => Ok(Self::NetworkIdle),
            "delay" => Ok(Self::Delay),
            "selector" => Ok(Self::Selector),
            other => Err(format!(
                "unknown wait strategy `{other}` (expected network_idle, delay or selector)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub chrome_executable: Option<PathBuf>,
    pub no_sandbox: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    pub navigation_timeout: Duration,
    pub wait_strategy: WaitStrategyKind,
    pub idle_window: Duration,
    pub wait_timeout: Duration,
    pub wait_selector: Option<String>,
    pub settle_delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// PDF bytes are the response body.
    Inline,
    /// PDF is written to disk and a retrieval link is returned.
    Persisted,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "persisted" | "persist" | "file" => Ok(Self::Persisted),
            other => Err(format!(
                "unknown delivery mode `{other}` (expected inline or persisted)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub mode: DeliveryMode,
    pub directory: PathBuf,
    pub public_base_url: Option<Url>,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub required: bool,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub start_url: Option<Url>,
    pub timeout: Duration,
    pub forward_credentials: bool,
}

#[derive(Debug, Clone)]
pub struct CorsSettings {
    pub enabled: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    // Env values stay strings; `auth.tokens` splits its own commas so numeric
    // tokens are never coerced.
    let env = Environment::with_prefix(ENV_PREFIX).separator("__");
    builder = builder.add_source(env);

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_process_env(|key| std::env::var(key).ok())?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Render(args)) => raw.apply_render_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    delivery: RawDeliverySettings,
    auth: RawAuthSettings,
    webhook: RawWebhookSettings,
    cors: RawCorsSettings,
}

impl RawSettings {
    /// Apply the bare `PORT` / `START_WEBHOOK_URL` variables on top of file and prefixed env.
    fn apply_process_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), LoadError> {
        if let Some(port) = lookup(PORT_ENV) {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|err| LoadError::invalid("PORT", format!("failed to parse: {err}")))?;
            self.server.port = Some(port);
        }
        if let Some(url) = lookup(START_WEBHOOK_URL_ENV) {
            self.webhook.start_url = Some(url);
        }
        Ok(())
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(mode) = overrides.delivery_mode.as_ref() {
            self.delivery.mode = Some(mode.clone());
        }
        if let Some(directory) = overrides.delivery_directory.as_ref() {
            self.delivery.directory = Some(directory.clone());
        }
        if let Some(base) = overrides.public_base_url.as_ref() {
            self.delivery.public_base_url = Some(base.clone());
        }
        if let Some(required) = overrides.auth_required {
            self.auth.required = Some(required);
        }
        if let Some(enabled) = overrides.cors_enabled {
            self.cors.enabled = Some(enabled);
        }

        self.apply_render_overrides(&overrides.render);
    }

    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if let Some(path) = overrides.chrome_executable.as_ref() {
            self.render.chrome_executable = Some(path.clone());
        }
        if let Some(strategy) = overrides.wait_strategy.as_ref() {
            self.render.wait_strategy = Some(strategy.clone());
        }
        if let Some(selector) = overrides.wait_selector.as_ref() {
            self.render.wait_selector = Some(selector.clone());
        }
        if let Some(delay) = overrides.settle_delay_ms {
            self.render.settle_delay_ms = Some(delay);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
            delivery,
            auth,
            webhook,
            cors,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            render: build_render_settings(render)?,
            delivery: build_delivery_settings(delivery)?,
            auth: build_auth_settings(auth),
            webhook: build_webhook_settings(webhook)?,
            cors: CorsSettings {
                enabled: cors.enabled.unwrap_or(false),
            },
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let chrome_executable = render
        .chrome_executable
        .filter(|path| !path.as_os_str().is_empty());

    let viewport_width = render.viewport_width.unwrap_or(DEFAULT_VIEWPORT_WIDTH);
    let viewport_height = render.viewport_height.unwrap_or(DEFAULT_VIEWPORT_HEIGHT);
    if viewport_width == 0 || viewport_height == 0 {
        return Err(LoadError::invalid(
            "render.viewport",
            "width and height must be greater than zero",
        ));
    }

    let device_scale_factor = render
        .device_scale_factor
        .unwrap_or(DEFAULT_DEVICE_SCALE_FACTOR);
    if !(device_scale_factor.is_finite() && device_scale_factor > 0.0) {
        return Err(LoadError::invalid(
            "render.device_scale_factor",
            "must be a positive number",
        ));
    }

    let navigation_timeout_ms = render
        .navigation_timeout_ms
        .unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_MS);
    if navigation_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "render.navigation_timeout_ms",
            "must be greater than zero",
        ));
    }

    let wait_strategy = match render.wait_strategy {
        Some(value) => WaitStrategyKind::from_str(&value)
            .map_err(|reason| LoadError::invalid("render.wait_strategy", reason))?,
        None => WaitStrategyKind::NetworkIdle,
    };

    let wait_selector = render.wait_selector.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    if wait_strategy == WaitStrategyKind::Selector && wait_selector.is_none() {
        return Err(LoadError::invalid(
            "render.wait_selector",
            "required when wait_strategy is `selector`",
        ));
    }

    let wait_timeout_ms = render.wait_timeout_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS);
    if wait_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "render.wait_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(RenderSettings {
        chrome_executable,
        no_sandbox: render.no_sandbox.unwrap_or(false),
        viewport_width,
        viewport_height,
        device_scale_factor,
        navigation_timeout: Duration::from_millis(navigation_timeout_ms),
        wait_strategy,
        idle_window: Duration::from_millis(
            render.idle_window_ms.unwrap_or(DEFAULT_IDLE_WINDOW_MS),
        ),
        wait_timeout: Duration::from_millis(wait_timeout_ms),
        wait_selector,
        settle_delay: Duration::from_millis(
            render.settle_delay_ms.unwrap_or(DEFAULT_SETTLE_DELAY_MS),
        ),
    })
}

fn build_delivery_settings(delivery: RawDeliverySettings) -> Result<DeliverySettings, LoadError> {
    let mode = match delivery.mode {
        Some(value) => DeliveryMode::from_str(&value)
            .map_err(|reason| LoadError::invalid("delivery.mode", reason))?,
        None => DeliveryMode::Inline,
    };

    let directory = delivery
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DELIVERY_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "delivery.directory",
            "path must not be empty",
        ));
    }

    let public_base_url = delivery
        .public_base_url
        .filter(|value| !value.trim().is_empty())
        .map(|value| parse_http_url("delivery.public_base_url", &value))
        .transpose()?;

    Ok(DeliverySettings {
        mode,
        directory,
        public_base_url,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> AuthSettings {
    let tokens: Vec<String> = auth
        .tokens
        .unwrap_or_default()
        .into_iter()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect();

    AuthSettings {
        required: auth.required.unwrap_or(false) || !tokens.is_empty(),
        tokens,
    }
}

fn build_webhook_settings(webhook: RawWebhookSettings) -> Result<WebhookSettings, LoadError> {
    let start_url = webhook
        .start_url
        .filter(|value| !value.trim().is_empty())
        .map(|value| parse_http_url("webhook.start_url", &value))
        .transpose()?;

    let timeout_secs = webhook
        .timeout_seconds
        .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "webhook.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(WebhookSettings {
        start_url,
        timeout: Duration::from_secs(timeout_secs),
        forward_credentials: webhook.forward_credentials.unwrap_or(true),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    chrome_executable: Option<PathBuf>,
    no_sandbox: Option<bool>,
    viewport_width: Option<u32>,
    viewport_height: Option<u32>,
    device_scale_factor: Option<f64>,
    navigation_timeout_ms: Option<u64>,
    wait_strategy: Option<String>,
    idle_window_ms: Option<u64>,
    wait_timeout_ms: Option<u64>,
    wait_selector: Option<String>,
    settle_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDeliverySettings {
    mode: Option<String>,
    directory: Option<PathBuf>,
    public_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    required: Option<bool>,
    #[serde(deserialize_with = "deserialize_tokens")]
    tokens: Option<Vec<String>>,
}

/// Accepts a sequence of tokens or one comma-separated string.
fn deserialize_tokens<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(TokenListVisitor).map(Some)
}

struct TokenListVisitor;

impl<'de> Visitor<'de> for TokenListVisitor {
    type Value = Vec<String>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a list of tokens or a comma-separated string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(value.split(',').map(str::to_string).collect())
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(vec![value.to_string()])
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        Ok(vec![value.to_string()])
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut tokens = Vec::new();
        while let Some(token) = seq.next_element::<String>()? {
            tokens.push(token);
        }
        Ok(tokens)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWebhookSettings {
    start_url: Option<String>,
    timeout_seconds: Option<u64>,
    forward_credentials: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCorsSettings {
    enabled: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_http_url(key: &'static str, value: &str) -> Result<Url, LoadError> {
    let url = Url::parse(value.trim())
        .map_err(|err| LoadError::invalid(key, format!("failed to parse: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "must be an http or https URL"));
    }
    Ok(url)
}
