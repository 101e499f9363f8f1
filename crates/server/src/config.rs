//! Live refresh configuration.
//!
//! Hosting integrations usually embed this as a table in their own config
//! file:
//!
//! ```toml
//! [live_refresh]
//! route = "/ws-LIVE-REFRESH-RESERVED-ROUTE"
//!
//! [live_refresh.script]
//! kind = "file"
//! path = "res/live-refresh-browser.js"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use liverefresh_protocol::{CLIENT_SCRIPT_ROUTE, DEFAULT_CONNECTION_ROUTE};

use crate::ServerError;

/// Configuration for a [`LiveRefresh`](crate::LiveRefresh) instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveRefreshConfig {
    /// Route of the WebSocket endpoint.
    #[serde(default = "default_route")]
    pub route: String,

    /// Where the browser client script is loaded from.
    #[serde(default)]
    pub script: ScriptSource,
}

/// Source of the browser client script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScriptSource {
    /// The script compiled into this crate.
    #[default]
    Embedded,
    /// A file on disk, re-read on every request.
    File { path: PathBuf },
}

fn default_route() -> String {
    DEFAULT_CONNECTION_ROUTE.into()
}

impl Default for LiveRefreshConfig {
    fn default() -> Self {
        Self {
            route: default_route(),
            script: ScriptSource::default(),
        }
    }
}

impl LiveRefreshConfig {
    /// Returns a default configuration with a custom connection route.
    pub fn with_route(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            ..Self::default()
        }
    }

    /// Checks that the connection route is usable.
    pub fn validate(&self) -> Result<(), ServerError> {
        if !self.route.starts_with('/') {
            return Err(ServerError::InvalidRoute(format!(
                "`{}` must start with `/`",
                self.route
            )));
        }
        if self.route == CLIENT_SCRIPT_ROUTE {
            return Err(ServerError::InvalidRoute(format!(
                "`{}` is reserved for the client script",
                self.route
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = LiveRefreshConfig::default();
        assert_eq!(config.route, DEFAULT_CONNECTION_ROUTE);
        assert_eq!(config.script, ScriptSource::Embedded);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_partial_toml() {
        let config: LiveRefreshConfig = toml::from_str(r#"route = "/__refresh""#).unwrap();
        assert_eq!(config.route, "/__refresh");
        assert_eq!(config.script, ScriptSource::Embedded);
    }

    #[test]
    fn config_file_script_toml() {
        let toml_str = r#"
            [script]
            kind = "file"
            path = "res/client.js"
        "#;
        let config: LiveRefreshConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.route, DEFAULT_CONNECTION_ROUTE);
        assert_eq!(
            config.script,
            ScriptSource::File {
                path: PathBuf::from("res/client.js")
            }
        );
    }

    #[test]
    fn relative_route_is_rejected() {
        let err = LiveRefreshConfig::with_route("ws").validate().unwrap_err();
        assert!(matches!(err, ServerError::InvalidRoute(_)));
    }

    #[test]
    fn script_route_is_reserved() {
        let err = LiveRefreshConfig::with_route(CLIENT_SCRIPT_ROUTE)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }
}
