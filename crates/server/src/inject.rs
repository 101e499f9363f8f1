//! HTML response rewriting: adds the client script tag to served pages.

use std::borrow::Cow;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use liverefresh_protocol::CLIENT_SCRIPT_ROUTE;

/// Largest HTML body the middleware will buffer (16 MiB).
const MAX_HTML_BODY: usize = 16 * 1024 * 1024;

const HEAD_CLOSE: &str = "</head>";

/// Inserts the client script tag, plus a newline, before the first
/// `</head>`. Documents without one are returned unchanged.
pub fn inject_script_tag(html: &str) -> Cow<'_, str> {
    match html.find(HEAD_CLOSE) {
        Some(idx) => {
            let (before, after) = html.split_at(idx);
            Cow::Owned(format!(
                "{before}<script src=\"{CLIENT_SCRIPT_ROUTE}\"></script>\n{after}"
            ))
        }
        None => Cow::Borrowed(html),
    }
}

/// Middleware injecting the client script into every HTML response.
///
/// Use with [`axum::middleware::from_fn`]. Only complete `200 OK`
/// `text/html` responses are rewritten. Encoded bodies, partial content and
/// pages declared larger than the buffer limit pass through untouched.
pub async fn inject_client_script(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() != StatusCode::OK || !is_injectable(response.headers()) {
        return response;
    }
    if exceeds_buffer_limit(response.headers()) {
        tracing::debug!("HTML response too large to rewrite, serving as is");
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_HTML_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("failed to buffer HTML response: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let Ok(html) = std::str::from_utf8(&bytes) else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    match inject_script_tag(html) {
        Cow::Owned(injected) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(injected))
        }
        Cow::Borrowed(_) => Response::from_parts(parts, Body::from(bytes)),
    }
}

fn is_injectable(headers: &HeaderMap) -> bool {
    let is_html = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("text/html"));
    let encoded = headers
        .get(header::CONTENT_ENCODING)
        .is_some_and(|v| v.as_bytes() != b"identity");
    is_html && !encoded
}

fn exceeds_buffer_limit(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .is_some_and(|len| len > MAX_HTML_BODY as u64)
}
