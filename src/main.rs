use std::{future::IntoFuture, net::SocketAddr, process, sync::Arc};

use printpage::{
    application::{
        auth::AuthPolicy,
        delivery::DeliveryTarget,
        error::AppError,
        janitor::Janitor,
        notifier::Notifier,
        pipeline::GenerationService,
        renderer::{PageRenderer, RenderOptions},
    },
    config::{self, DeliveryMode},
    infra::{
        browser::ChromiumRenderer,
        error::InfraError,
        http::{self, HttpState},
        storage::DocumentStorage,
        telemetry,
    },
};
use tokio::{net::TcpListener, sync::Notify};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use url::Url;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let renderer: Arc<dyn PageRenderer> = Arc::new(ChromiumRenderer::new(RenderOptions::from(
        &settings.render,
    )));
    let notifier = Notifier::new(&settings.webhook)
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let delivery = match settings.delivery.mode {
        DeliveryMode::Inline => DeliveryTarget::Inline,
        DeliveryMode::Persisted => {
            let storage = Arc::new(
                DocumentStorage::new(settings.delivery.directory.clone())
                    .map_err(|err| AppError::from(InfraError::Io(err)))?,
            );
            let janitor = Janitor::new(storage.clone());
            janitor.sweep_existing().await.map_err(|err| {
                AppError::unexpected(format!("failed to sweep output directory: {err}"))
            })?;
            DeliveryTarget::persisted(storage, janitor)
        }
    };

    let state = HttpState {
        generation: Arc::new(GenerationService::new(renderer, notifier, delivery.clone())),
        auth: Arc::new(AuthPolicy::from(&settings.auth)),
        public_base_url: settings.delivery.public_base_url.clone(),
        listen_base: listen_base(settings.server.addr)?,
    };

    let result = serve_http(&settings, state).await;

    if let Some(janitor) = delivery.janitor() {
        janitor.shutdown();
    }
    result
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state, settings.cors.enabled);
    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "printpage::server",
        addr = %settings.server.addr,
        delivery = ?settings.delivery.mode,
        auth_required = settings.auth.required,
        cors = settings.cors.enabled,
        "listening"
    );

    let stop = Arc::new(Notify::new());
    let stopped = stop.clone();
    let mut server = tokio::spawn(
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move { stopped.notified().await })
            .into_future(),
    );

    tokio::select! {
        joined = &mut server => return server_outcome(joined),
        () = shutdown_signal() => {}
    }

    info!(
        target = "printpage::server",
        "shutdown requested, draining connections"
    );
    stop.notify_one();

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                target = "printpage::server",
                grace_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out; aborting open connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<Result<(), std::io::Error>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "printpage::server", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "printpage::server", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// `http://{addr}` with unspecified hosts swapped for loopback.
fn listen_base(addr: SocketAddr) -> Result<Url, AppError> {
    let host = if addr.ip().is_unspecified() {
        "127.0.0.1".to_string()
    } else {
        addr.ip().to_string()
    };
    let raw = if addr.is_ipv6() && !addr.ip().is_unspecified() {
        format!("http://[{host}]:{}", addr.port())
    } else {
        format!("http://{host}:{}", addr.port())
    };
    Url::parse(&raw).map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "invalid listen address `{addr}`: {err}"
        )))
    })
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let target = printpage::domain::request::parse_web_url("url", &args.url)?;
    let renderer = ChromiumRenderer::new(RenderOptions::from(&settings.render));

    info!(
        target = "printpage::render",
        url = %target,
        output = %args.output.display(),
        "rendering"
    );

    let document = renderer
        .render(&target)
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    for warning in document.warnings() {
        warn!(target = "printpage::render", warning = %warning, "render degraded");
    }

    tokio::fs::write(&args.output, document.bytes())
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;

    info!(
        target = "printpage::render",
        output = %args.output.display(),
        bytes = document.len(),
        "PDF written"
    );
    Ok(())
}
