use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};

use crate::render::RenderFailure;

/// Diagnostic attached to failed responses for outer middleware to inspect.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_failure(source: &'static str, status: StatusCode, failure: &RenderFailure) -> Self {
        let mut messages = vec![failure.to_string()];
        if let Some(stack) = failure.stack.as_ref() {
            messages.push(stack.clone());
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Present on a successful response when a resilient engine replaced a
/// failed render with the original document.
#[derive(Debug, Clone)]
pub struct RenderFallback {
    pub failure: RenderFailure,
}

impl RenderFallback {
    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}
