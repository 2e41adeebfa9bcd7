use std::time::Instant;

use async_stream::stream;
use axum::{
    body::Body,
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE, SET_COOKIE, TRANSFER_ENCODING},
    },
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use tracing::{debug, error, warn};

use super::{
    log::RequestLog,
    report::{ErrorReport, RenderFallback},
};
use crate::render::{BodyError, RenderBody, RenderResult};

const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// How the body of a successful render reaches the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delivery {
    /// Materialize the whole page, then send it with a content length.
    #[default]
    Buffered,
    /// Forward chunks as the engine produces them.
    Chunked,
}

/// Turn a successful render into a response.
///
/// Errors only when the body cannot be produced before anything was
/// committed; see [`body_failure_response`].
pub async fn translate_result(
    result: RenderResult,
    path: &str,
    started: Option<Instant>,
    delivery: Delivery,
    log: &dyn RequestLog,
) -> Result<Response, BodyError> {
    let RenderResult {
        status,
        headers,
        body,
        fallback,
    } = result;

    let body = match delivery {
        Delivery::Buffered => Body::from(body.into_text().await?),
        Delivery::Chunked => chunked_body(body, path).await?,
    };

    let mut response = Response::new(body);
    apply_headers(response.headers_mut(), &headers);
    if !response.headers().contains_key(CONTENT_TYPE) {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    }
    *response.status_mut() = status;

    if let Some(failure) = fallback {
        RenderFallback { failure }.attach(&mut response);
    }

    log.record(status, format_args!("OK {path}"), started);
    Ok(response)
}

/// Bare 500 for a render whose body could not be produced.
pub fn body_failure_response(error: &BodyError, path: &str) -> Response {
    error!(
        target: "ssr_bridge::translate",
        path,
        error = %error,
        detail = ?error,
        "failed to produce rendered body"
    );
    let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    ErrorReport::from_error(
        "middleware::translate::body_failure_response",
        StatusCode::INTERNAL_SERVER_ERROR,
        error,
    )
    .attach(&mut response);
    response
}

/// Copy engine headers in order. A repeated name replaces the earlier value,
/// except `Set-Cookie`, where every value is kept. Framing headers are
/// dropped; the body decides between content length and chunked encoding.
fn apply_headers(target: &mut HeaderMap, pairs: &[(String, String)]) {
    for (name, value) in pairs {
        let (Ok(header), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            warn!(header = %name, "skipping invalid header from render engine");
            continue;
        };

        if header == CONTENT_LENGTH || header == TRANSFER_ENCODING {
            debug!(header = %header, "dropping framing header from render engine");
            continue;
        }

        if header == SET_COOKIE {
            target.append(header, header_value);
        } else {
            target.insert(header, header_value);
        }
    }
}

/// Waits for the first chunk so an engine that fails immediately still gets
/// a clean 500. Errors after that abort the response.
async fn chunked_body(body: RenderBody, path: &str) -> Result<Body, BodyError> {
    let mut chunks = body.into_stream();
    let first = chunks.next().await.transpose()?;
    let path = path.to_string();

    let forwarded = stream! {
        if let Some(chunk) = first {
            yield Ok(chunk);
        }
        while let Some(chunk) = chunks.next().await {
            if let Err(err) = &chunk {
                error!(
                    target: "ssr_bridge::translate",
                    path = %path,
                    error = %err,
                    "body stream failed mid-response, aborting"
                );
            }
            yield chunk;
        }
    };

    Ok(Body::from_stream(forwarded))
}
