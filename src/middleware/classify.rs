use std::time::Instant;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::{log::RequestLog, report::ErrorReport};
use crate::render::{RenderError, RenderFailure};

/// What the middleware should do with a failed visit.
#[derive(Debug)]
pub enum Classification<'a> {
    /// The engine does not own this URL; let the rest of the pipeline answer.
    NotHandled,
    /// The engine owned the URL and broke.
    Unexpected(&'a RenderFailure),
}

pub fn classify(error: &RenderError) -> Classification<'_> {
    match error {
        RenderError::UnrecognizedUrl { .. } | RenderError::TransitionAborted { .. } => {
            Classification::NotHandled
        }
        RenderError::Failed(failure) => Classification::Unexpected(failure),
    }
}

/// 500 carrying the stack trace when there is one, empty otherwise.
pub fn failure_response(
    failure: &RenderFailure,
    started: Option<Instant>,
    log: &dyn RequestLog,
) -> Response {
    log.record(
        StatusCode::INTERNAL_SERVER_ERROR,
        format_args!("Unknown Error: {}", failure.diagnostic()),
        started,
    );

    let mut response = match failure.stack.as_ref() {
        Some(stack) => (StatusCode::INTERNAL_SERVER_ERROR, stack.clone()).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    ErrorReport::from_failure(
        "middleware::classify::failure_response",
        StatusCode::INTERNAL_SERVER_ERROR,
        failure,
    )
    .attach(&mut response);
    response
}
