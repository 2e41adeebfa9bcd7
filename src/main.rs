use std::process;

use axum::{
    Router,
    http::{HeaderMap, Method, StatusCode, Uri},
    middleware::from_fn_with_state,
};
use ssr_bridge::{
    config,
    error::AppError,
    infra::{error::InfraError, telemetry},
    middleware::{ConfigError, RenderMiddleware, render_pages},
    render::{DistEngine, EngineOptions, RenderContext, RenderEngine, RenderRequest},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pages = RenderMiddleware::new(settings.render.middleware_config())?;
    let app = Router::new()
        .fallback(not_found)
        .layer(from_fn_with_state(pages, render_pages));

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;

    info!(
        target: "ssr_bridge::serve",
        addr = %settings.server.addr,
        dist_path = %settings.render.dist_path.display(),
        resilient = settings.render.resilient,
        chunked_response = settings.render.chunked_response,
        "listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| InfraError::server(err.to_string()))?;

    info!(target: "ssr_bridge::serve", "server stopped");
    Ok(())
}

async fn run_render(settings: config::Settings, args: config::RenderArgs) -> Result<(), AppError> {
    let engine = DistEngine::open(
        &settings.render.dist_path,
        EngineOptions {
            resilient: settings.render.resilient,
        },
    )
    .map_err(ConfigError::from)?;

    let uri: Uri = args.path.parse().map_err(|err| AppError::InvalidPath {
        path: args.path.clone(),
        reason: format!("{err}"),
    })?;
    let request = RenderRequest::new(
        args.path.clone(),
        RenderContext {
            method: Method::GET,
            uri,
            headers: HeaderMap::new(),
        },
    );

    let result = engine.visit(request).await?;
    if let Some(failure) = result.fallback.as_ref() {
        warn!(
            target: "ssr_bridge::render",
            error = %failure,
            "render failed, printing original document"
        );
    }

    let status = result.status;
    let html = result.body.into_text().await?;
    info!(
        target: "ssr_bridge::render",
        path = %args.path,
        status = status.as_u16(),
        bytes = html.len(),
        "rendered"
    );
    println!("{html}");
    Ok(())
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not Found")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: "ssr_bridge::serve", "shutdown requested"),
        Err(err) => {
            error!(target: "ssr_bridge::serve", error = %err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
