use std::string::FromUtf8Error;

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use bytes::{Bytes, BytesMut};
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use thiserror::Error;

use super::error::RenderFailure;

/// Chunked body as produced by an engine.
pub type BodyStream = BoxStream<'static, Result<Bytes, BodyError>>;

/// Request metadata handed to the engine untouched.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

/// One page render, keyed by the URL as the client sent it.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    path: String,
    context: RenderContext,
}

impl RenderRequest {
    pub fn new(path: impl Into<String>, context: RenderContext) -> Self {
        Self {
            path: path.into(),
            context,
        }
    }

    /// Path and query, e.g. `/posts?page=2`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.path.split_once('?').map_or(self.path.as_str(), |(route, _)| route)
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }
}

/// A successful render, consumed once by the middleware.
pub struct RenderResult {
    pub status: StatusCode,
    /// Header pairs in the order the engine produced them.
    pub headers: Vec<(String, String)>,
    pub body: RenderBody,
    /// Set when a resilient engine served original content in place of a failed render.
    pub fallback: Option<RenderFailure>,
}

impl RenderResult {
    pub fn new(status: StatusCode, body: RenderBody) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
            fallback: None,
        }
    }

    pub fn ok(body: RenderBody) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_fallback(mut self, failure: RenderFailure) -> Self {
        self.fallback = Some(failure);
        self
    }
}

impl std::fmt::Debug for RenderResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderResult")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// The page body, either already in memory or still being produced.
pub enum RenderBody {
    Text(String),
    Stream(BodyStream),
}

impl RenderBody {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, BodyError>> + Send + 'static,
    {
        Self::Stream(stream.boxed())
    }

    /// Collect the whole body as UTF-8 text.
    pub async fn into_text(self) -> Result<String, BodyError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Stream(mut chunks) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = chunks.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                Ok(String::from_utf8(buffer.to_vec())?)
            }
        }
    }

    /// View the body as a chunk stream; in-memory text becomes a single chunk.
    pub fn into_stream(self) -> BodyStream {
        match self {
            Self::Text(text) => stream::once(async move { Ok(Bytes::from(text)) }).boxed(),
            Self::Stream(chunks) => chunks,
        }
    }
}

impl std::fmt::Debug for RenderBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Failure while producing the body of an otherwise successful render.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("io error while reading body: {0}")]
    Io(#[from] std::io::Error),
    #[error("body is not valid utf-8: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("body stream failed: {message}")]
    Source { message: String },
}

impl BodyError {
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }
}
