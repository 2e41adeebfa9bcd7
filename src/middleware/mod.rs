//! Axum middleware that hands requests to a [`RenderEngine`] and turns the
//! outcome into a response, or passes the request on when the engine does not
//! recognize the URL.
//!
//! ```rust,ignore
//! let pages = RenderMiddleware::from_dist_path("./dist")?;
//! let app = Router::new()
//!     .fallback(not_found)
//!     .layer(axum::middleware::from_fn_with_state(pages, render_pages));
//! ```

mod classify;
mod log;
mod report;
mod translate;

use std::{path::PathBuf, sync::Arc, time::Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

pub use classify::{Classification, classify, failure_response};
pub use log::{NoopLog, RequestLog, TracingLog};
pub use report::{ErrorReport, RenderFallback};
pub use translate::{Delivery, body_failure_response, translate_result};

use crate::render::{
    DistEngine, EngineError, EngineOptions, RenderContext, RenderEngine, RenderRequest,
};

pub const REQUESTS_METRIC: &str = "ssr_render_requests_total";
pub const DURATION_METRIC: &str = "ssr_render_duration_ms";

/// Options accepted when building a [`RenderMiddleware`].
#[derive(Clone)]
pub struct MiddlewareConfig {
    /// Dist directory for the built-in engine. Required unless `engine` is set.
    pub dist_path: Option<PathBuf>,
    /// Built-in engine only: serve the original document when a render fails.
    pub resilient: bool,
    /// Emit one log line per rendered request.
    pub log: bool,
    /// Engine to use instead of opening `dist_path`. The caller keeps its handle.
    pub engine: Option<Arc<dyn RenderEngine>>,
    /// Stream bodies with chunked transfer encoding instead of buffering them.
    pub chunked_response: bool,
    /// Replaces the default `tracing` logger when `log` is on.
    pub logger: Option<Arc<dyn RequestLog>>,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            dist_path: None,
            resilient: false,
            log: true,
            engine: None,
            chunked_response: false,
            logger: None,
        }
    }
}

impl MiddlewareConfig {
    pub fn with_dist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dist_path = Some(path.into());
        self
    }

    pub fn with_resilient(mut self, resilient: bool) -> Self {
        self.resilient = resilient;
        self
    }

    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn RenderEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_chunked_response(mut self, chunked: bool) -> Self {
        self.chunked_response = chunked;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn RequestLog>) -> Self {
        self.logger = Some(logger);
        self
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("a dist path is required when no render engine is supplied")]
    MissingDistPath,
    #[error("failed to load render engine: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Clone)]
pub struct RenderMiddleware {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<dyn RenderEngine>,
    delivery: Delivery,
    log: Arc<dyn RequestLog>,
}

impl RenderMiddleware {
    pub fn new(config: MiddlewareConfig) -> Result<Self, ConfigError> {
        let MiddlewareConfig {
            dist_path,
            resilient,
            log,
            engine,
            chunked_response,
            logger,
        } = config;

        let engine: Arc<dyn RenderEngine> = match engine {
            Some(engine) => engine,
            None => {
                let dist_path = dist_path.ok_or(ConfigError::MissingDistPath)?;
                Arc::new(DistEngine::open(dist_path, EngineOptions { resilient })?)
            }
        };

        let log: Arc<dyn RequestLog> = if log {
            logger.unwrap_or_else(|| Arc::new(TracingLog))
        } else {
            Arc::new(NoopLog)
        };

        let delivery = if chunked_response {
            Delivery::Chunked
        } else {
            Delivery::Buffered
        };

        Ok(Self::from_parts(engine, delivery, log))
    }

    pub fn from_dist_path(dist_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Self::new(MiddlewareConfig::default().with_dist_path(dist_path))
    }

    /// `dist_path` takes precedence over any path already in `config`.
    pub fn with_options(
        dist_path: impl Into<PathBuf>,
        config: MiddlewareConfig,
    ) -> Result<Self, ConfigError> {
        Self::new(config.with_dist_path(dist_path))
    }

    /// Buffered delivery and `tracing` logging around a caller-owned engine.
    pub fn with_engine(engine: Arc<dyn RenderEngine>) -> Self {
        Self::from_parts(engine, Delivery::Buffered, Arc::new(TracingLog))
    }

    fn from_parts(engine: Arc<dyn RenderEngine>, delivery: Delivery, log: Arc<dyn RequestLog>) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                delivery,
                log,
            }),
        }
    }

    pub fn engine(&self) -> &Arc<dyn RenderEngine> {
        &self.inner.engine
    }

    pub fn delivery(&self) -> Delivery {
        self.inner.delivery
    }

    #[instrument(
        name = "render",
        skip_all,
        fields(path = %request.uri().path(), request_id = %Uuid::new_v4())
    )]
    pub async fn handle(&self, request: Request<Body>, next: Next) -> Response {
        let log = self.inner.log.as_ref();
        let started = log.enabled().then(Instant::now);
        let timer = Instant::now();

        let uri = request.uri();
        let path = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string());
        let render_request = RenderRequest::new(
            path.clone(),
            RenderContext {
                method: request.method().clone(),
                uri: uri.clone(),
                headers: request.headers().clone(),
            },
        );

        let (response, outcome) = match self.inner.engine.visit(render_request).await {
            Ok(result) => {
                let outcome = if result.fallback.is_some() {
                    Outcome::Fallback
                } else {
                    Outcome::Rendered
                };
                match translate_result(result, &path, started, self.inner.delivery, log).await {
                    Ok(response) => (response, outcome),
                    Err(err) => (body_failure_response(&err, &path), Outcome::BodyError),
                }
            }
            Err(error) => match classify(&error) {
                Classification::NotHandled => {
                    debug!(reason = %error, "engine passed on request");
                    record_outcome(Outcome::Passed, timer);
                    return next.run(request).await;
                }
                Classification::Unexpected(failure) => {
                    (failure_response(failure, started, log), Outcome::Failed)
                }
            },
        };

        record_outcome(outcome, timer);
        response
    }
}

/// Axum middleware entry point for `axum::middleware::from_fn_with_state`.
pub async fn render_pages(
    State(middleware): State<RenderMiddleware>,
    request: Request<Body>,
    next: Next,
) -> Response {
    middleware.handle(request, next).await
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Rendered,
    Fallback,
    Passed,
    Failed,
    BodyError,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Rendered => "rendered",
            Outcome::Fallback => "fallback",
            Outcome::Passed => "passed",
            Outcome::Failed => "failed",
            Outcome::BodyError => "body_error",
        }
    }
}

fn record_outcome(outcome: Outcome, timer: Instant) {
    let elapsed_ms = timer.elapsed().as_secs_f64() * 1000.0;
    counter!(REQUESTS_METRIC, "outcome" => outcome.as_str()).increment(1);
    histogram!(DURATION_METRIC, "outcome" => outcome.as_str()).record(elapsed_ms);
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn missing_dist_path_and_engine_is_fatal() {
        let err = RenderMiddleware::new(MiddlewareConfig::default()).err();
        assert!(matches!(err, Some(ConfigError::MissingDistPath)));
    }

    #[test]
    fn unreadable_dist_path_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = RenderMiddleware::from_dist_path(dir.path().join("missing")).err();
        assert!(matches!(err, Some(ConfigError::Engine(EngineError::Io { .. }))));
    }

    #[test]
    fn options_select_delivery_and_logger() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("index.html"), "").expect("shell");
        fs::write(dir.path().join("routes.toml"), "").expect("manifest");

        let middleware = RenderMiddleware::with_options(
            dir.path(),
            MiddlewareConfig::default()
                .with_chunked_response(true)
                .with_log(false),
        )
        .expect("middleware");

        assert_eq!(middleware.delivery(), Delivery::Chunked);
        assert!(!middleware.inner.log.enabled());

        let middleware = RenderMiddleware::from_dist_path(dir.path()).expect("middleware");
        assert_eq!(middleware.delivery(), Delivery::Buffered);
        assert!(middleware.inner.log.enabled());
    }

    #[test]
    fn supplied_engine_wins_over_dist_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("index.html"), "").expect("shell");
        fs::write(dir.path().join("routes.toml"), "").expect("manifest");
        let engine: Arc<dyn RenderEngine> =
            Arc::new(DistEngine::open(dir.path(), EngineOptions::default()).expect("engine"));

        let middleware = RenderMiddleware::new(
            MiddlewareConfig::default()
                .with_dist_path(dir.path().join("ignored"))
                .with_engine(Arc::clone(&engine)),
        )
        .expect("middleware");

        assert!(Arc::ptr_eq(middleware.engine(), &engine));
    }
}
