use std::{fmt, time::Instant};

use axum::http::StatusCode;
use tracing::{error, info};

/// Per-request log line emitted by the middleware.
///
/// `message` is passed unformatted so a disabled logger never pays for it.
pub trait RequestLog: Send + Sync {
    fn record(&self, status: StatusCode, message: fmt::Arguments<'_>, started: Option<Instant>);

    /// When false the middleware skips capturing start times entirely.
    fn enabled(&self) -> bool {
        true
    }
}

/// Logs through `tracing`: 200 at INFO, everything else at ERROR.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl RequestLog for TracingLog {
    fn record(&self, status: StatusCode, message: fmt::Arguments<'_>, started: Option<Instant>) {
        let code = status.as_u16();
        let elapsed_ms = started.map(|start| start.elapsed().as_millis() as u64);

        match (status == StatusCode::OK, elapsed_ms) {
            (true, Some(ms)) => {
                info!(target: "ssr_bridge::request", status = code, elapsed_ms = ms, "{message} {ms}ms")
            }
            (true, None) => info!(target: "ssr_bridge::request", status = code, "{message}"),
            (false, Some(ms)) => {
                error!(target: "ssr_bridge::request", status = code, elapsed_ms = ms, "{message} {ms}ms")
            }
            (false, None) => error!(target: "ssr_bridge::request", status = code, "{message}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLog;

impl RequestLog for NoopLog {
    fn record(&self, _status: StatusCode, _message: fmt::Arguments<'_>, _started: Option<Instant>) {}

    fn enabled(&self) -> bool {
        false
    }
}
