//! Client configuration derived from the hosting page's location.

use tokio_tungstenite::tungstenite::http::Uri;

use liverefresh_protocol::PROTOCOL_VERSION;

use crate::ClientError;
use crate::backoff::ReconnectConfig;

/// Host names treated as local development.
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// Returns `true` for host names the live refresh client runs on.
///
/// IPv6 hosts may be given with or without brackets.
pub fn is_local_development(host: &str) -> bool {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    LOCAL_HOSTS
        .iter()
        .any(|local| local.eq_ignore_ascii_case(host))
}

/// Settings for one [`LiveRefreshClient`](crate::LiveRefreshClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket URL of the connection route.
    pub endpoint: String,
    /// Whether the client connects at all.
    pub enabled: bool,
    /// Protocol version the client speaks.
    pub expected_version: u32,
    /// Reconnect delay policy.
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    /// Creates an enabled config for an explicit WebSocket endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            enabled: true,
            expected_version: PROTOCOL_VERSION,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Derives the config for a page served at `page_url`.
    ///
    /// The endpoint uses `ws` for `http` pages and `wss` for `https` pages,
    /// on the same authority. The client is only enabled when the page host
    /// is a local development host.
    pub fn for_page(page_url: &str, route: &str) -> Result<Self, ClientError> {
        let invalid = |reason: &str| ClientError::InvalidUrl {
            url: page_url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = page_url.parse().map_err(|e| ClientError::InvalidUrl {
            url: page_url.to_string(),
            reason: format!("{e}"),
        })?;

        let scheme = match uri.scheme_str() {
            Some("http") => "ws",
            Some("https") => "wss",
            Some(_) => return Err(invalid("scheme must be http or https")),
            None => return Err(invalid("missing scheme")),
        };
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;

        Ok(Self {
            endpoint: format!("{scheme}://{authority}{route}"),
            enabled: is_local_development(authority.host()),
            ..Self::new(String::new())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liverefresh_protocol::DEFAULT_CONNECTION_ROUTE;

    #[test]
    fn local_hosts() {
        assert!(is_local_development("localhost"));
        assert!(is_local_development("LOCALHOST"));
        assert!(is_local_development("127.0.0.1"));
        assert!(is_local_development("[::1]"));
        assert!(is_local_development("::1"));

        assert!(!is_local_development("example.com"));
        assert!(!is_local_development("localhost.example.com"));
        assert!(!is_local_development("192.168.1.10"));
        assert!(!is_local_development(""));
    }

    #[test]
    fn http_page_maps_to_ws() {
        let config =
            ClientConfig::for_page("http://localhost:3000/docs/index.html", DEFAULT_CONNECTION_ROUTE)
                .unwrap();
        assert_eq!(
            config.endpoint,
            "ws://localhost:3000/ws-LIVE-REFRESH-RESERVED-ROUTE"
        );
        assert!(config.enabled);
        assert_eq!(config.expected_version, PROTOCOL_VERSION);
        assert_eq!(config.reconnect, ReconnectConfig::default());
    }

    #[test]
    fn https_page_maps_to_wss() {
        let config = ClientConfig::for_page("https://localhost/", "/live").unwrap();
        assert_eq!(config.endpoint, "wss://localhost/live");
    }

    #[test]
    fn remote_page_is_disabled() {
        let config = ClientConfig::for_page("https://example.com/", "/live").unwrap();
        assert!(!config.enabled);
        assert_eq!(config.endpoint, "wss://example.com/live");
    }

    #[test]
    fn ipv6_loopback_page_is_enabled() {
        let config = ClientConfig::for_page("http://[::1]:8080/", "/live").unwrap();
        assert!(config.enabled);
        assert_eq!(config.endpoint, "ws://[::1]:8080/live");
    }

    #[test]
    fn invalid_page_urls() {
        for url in ["/relative/path", "ftp://localhost/", "not a url"] {
            let err = ClientConfig::for_page(url, "/live").unwrap_err();
            assert!(matches!(err, ClientError::InvalidUrl { .. }), "{url}");
        }
    }
}
