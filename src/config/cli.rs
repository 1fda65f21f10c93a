use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the printpage binary.
#[derive(Debug, Parser)]
#[command(name = "printpage", version, about = "Web page to PDF renderer")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PRINTPAGE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Render a single URL to a PDF file and exit.
    Render(RenderArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: RenderOverrides,

    /// Page to render.
    #[arg(value_name = "URL", value_hint = ValueHint::Url)]
    pub url: String,

    /// Where to write the PDF.
    #[arg(long, short, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Override the Chromium executable used for rendering.
    #[arg(long = "chrome-executable", value_name = "PATH")]
    pub chrome_executable: Option<PathBuf>,

    /// Override the page readiness strategy (network_idle|delay|selector).
    #[arg(long = "wait-strategy", value_name = "STRATEGY")]
    pub wait_strategy: Option<String>,

    /// CSS selector awaited by the `selector` strategy.
    #[arg(long = "wait-selector", value_name = "SELECTOR")]
    pub wait_selector: Option<String>,

    /// Override the fixed delay applied before export, in milliseconds.
    #[arg(long = "settle-delay-ms", value_name = "MS")]
    pub settle_delay_ms: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub render: RenderOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override how documents are handed back (inline|persisted).
    #[arg(long = "delivery-mode", value_name = "MODE")]
    pub delivery_mode: Option<String>,

    /// Override the directory persisted documents are written to.
    #[arg(long = "delivery-directory", value_name = "PATH")]
    pub delivery_directory: Option<PathBuf>,

    /// Override the base URL used to build retrieval links.
    #[arg(long = "public-base-url", value_name = "URL")]
    pub public_base_url: Option<String>,

    /// Require a bearer token or API key on generate requests.
    #[arg(
        long = "auth-required",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub auth_required: Option<bool>,

    /// Allow cross-origin requests from any origin.
    #[arg(
        long = "cors-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cors_enabled: Option<bool>,
}
