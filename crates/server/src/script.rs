//! Browser client script loading and serving.

use std::borrow::Cow;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::ServerError;
use crate::config::ScriptSource;

/// File name of the browser client script.
pub const SCRIPT_FILE_NAME: &str = "live-refresh-browser.js";

/// Browser client script compiled into the crate.
pub const EMBEDDED_SCRIPT: &str = include_str!("../res/live-refresh-browser.js");

/// Replaced with the connection route, as a JS string literal.
const ROUTE_PLACEHOLDER: &str = "__LIVE_REFRESH_ROUTE__";

/// Loads the client script and fills in the connection route.
///
/// File sources are re-read on every call so edits show up without a
/// restart.
pub async fn load_script(source: &ScriptSource, route: &str) -> Result<String, ServerError> {
    let template = match source {
        ScriptSource::Embedded => Cow::Borrowed(EMBEDDED_SCRIPT),
        ScriptSource::File { path } => {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ServerError::Script {
                    path: path.clone(),
                    source,
                })?;
            Cow::Owned(text)
        }
    };

    let route_literal = serde_json::to_string(route)?;
    Ok(template.replace(ROUTE_PLACEHOLDER, &route_literal))
}

/// Responds with the client script, or a plain-text 500 if it cannot be
/// loaded.
pub(crate) async fn serve_script(source: &ScriptSource, route: &str) -> Response {
    match load_script(source, route).await {
        Ok(body) => ([(header::CONTENT_TYPE, "application/javascript")], body).into_response(),
        Err(e) => {
            tracing::error!("failed to serve client script: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error: Could not load {SCRIPT_FILE_NAME}"),
            )
                .into_response()
        }
    }
}
