//! Channel URI construction.
//!
//! The WebSocket base is resolved in a fixed order:
//!
//! 1. explicit override (`ws_url`)
//! 2. API base with `http`→`ws` swap and `/api` → `/api/realtime/ws`
//! 3. `ws://localhost:<port>/api/realtime/ws`
//!
//! A [`Platform::Server`] host skips resolution entirely and gets the
//! default, so construction never fails in contexts without transport.

use url::Url;

use crate::constants::{DEFAULT_PORT, REALTIME_PATH};
use crate::env::Platform;

/// Inputs for resolving the WebSocket base address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Explicit WebSocket base, used verbatim when set.
    pub ws_url: Option<String>,
    /// HTTP API base (e.g. `https://api.hireq.app/api`).
    pub api_url: Option<String>,
    /// Port for the localhost fallback.
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            ws_url: None,
            api_url: None,
            port: DEFAULT_PORT,
        }
    }
}

impl Endpoint {
    /// Endpoint that always resolves to `ws_url`.
    #[must_use]
    pub fn with_ws_url(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: Some(ws_url.into()),
            ..Self::default()
        }
    }

    /// Resolve the WebSocket base for `platform`.
    #[must_use]
    pub fn ws_base(&self, platform: Platform) -> String {
        if !platform.supports_transport() {
            return default_ws_base(self.port);
        }

        if let Some(ws_url) = non_empty(self.ws_url.as_deref()) {
            return ws_url.trim_end_matches('/').to_string();
        }

        if let Some(api_url) = non_empty(self.api_url.as_deref()) {
            return api_to_ws_base(api_url);
        }

        default_ws_base(self.port)
    }

    /// Full channel URI for a user and optional token.
    ///
    /// An unparseable base is logged and replaced by the localhost default.
    #[must_use]
    pub fn channel_url(&self, platform: Platform, user_id: &str, token: Option<&str>) -> Url {
        let base = self.ws_base(platform);
        let mut url = match Url::parse(&base) {
            Ok(url) => url,
            Err(e) => {
                log::error!(
                    "[Realtime] Invalid WebSocket base '{}': {} (falling back to default)",
                    base,
                    e
                );
                placeholder_url(self.port)
            }
        };

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("user_id", user_id);
            if let Some(token) = non_empty(token) {
                query.append_pair("token", token);
            }
        }

        url
    }
}

/// `ws://localhost:<port>/api/realtime/ws`.
#[must_use]
pub fn default_ws_base(port: u16) -> String {
    format!("ws://localhost:{port}{REALTIME_PATH}")
}

/// Derive the realtime base from an HTTP API base.
///
/// `http://host:8000/api` becomes `ws://host:8000/api/realtime/ws`. A base
/// without an `/api` suffix gets the full realtime path appended.
#[must_use]
pub fn api_to_ws_base(api_url: &str) -> String {
    let swapped = crate::ws::http_to_ws_scheme(api_url);
    let trimmed = swapped.trim_end_matches('/');
    match trimmed.strip_suffix("/api") {
        Some(root) => format!("{root}{REALTIME_PATH}"),
        None => format!("{trimmed}{REALTIME_PATH}"),
    }
}

fn placeholder_url(port: u16) -> Url {
    let base = default_ws_base(port);
    // The default is built from constants and a numeric port, so it always parses.
    Url::parse(&base).unwrap_or_else(|_| unreachable!("default WebSocket base is valid: {base}"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ws_base() {
        let endpoint = Endpoint::default();
        assert_eq!(
            endpoint.ws_base(Platform::Client),
            "ws://localhost:8000/api/realtime/ws"
        );
    }

    #[test]
    fn test_override_wins_over_api_url() {
        let endpoint = Endpoint {
            ws_url: Some("wss://rt.hireq.app/socket/".to_string()),
            api_url: Some("https://api.hireq.app/api".to_string()),
            port: 8000,
        };
        assert_eq!(
            endpoint.ws_base(Platform::Client),
            "wss://rt.hireq.app/socket"
        );
    }

    #[test]
    fn test_api_url_swaps_protocol_and_path() {
        let endpoint = Endpoint {
            api_url: Some("https://api.hireq.app/api".to_string()),
            ..Endpoint::default()
        };
        assert_eq!(
            endpoint.ws_base(Platform::Client),
            "wss://api.hireq.app/api/realtime/ws"
        );
    }

    #[test]
    fn test_api_url_without_api_suffix() {
        assert_eq!(
            api_to_ws_base("http://localhost:9000/"),
            "ws://localhost:9000/api/realtime/ws"
        );
    }

    #[test]
    fn test_blank_override_is_ignored() {
        let endpoint = Endpoint {
            ws_url: Some("  ".to_string()),
            api_url: None,
            port: 9100,
        };
        assert_eq!(
            endpoint.ws_base(Platform::Client),
            "ws://localhost:9100/api/realtime/ws"
        );
    }

    #[test]
    fn test_server_platform_gets_placeholder() {
        let endpoint = Endpoint::with_ws_url("wss://rt.hireq.app/ws");
        assert_eq!(
            endpoint.ws_base(Platform::Server),
            "ws://localhost:8000/api/realtime/ws"
        );
    }

    #[test]
    fn test_channel_url_with_token() {
        let endpoint = Endpoint::default();
        let url = endpoint.channel_url(Platform::Client, "user-42", Some("abc.def"));
        assert_eq!(
            url.as_str(),
            "ws://localhost:8000/api/realtime/ws?user_id=user-42&token=abc.def"
        );
    }

    #[test]
    fn test_channel_url_without_token() {
        let endpoint = Endpoint::default();
        let url = endpoint.channel_url(Platform::Client, "anonymous", None);
        assert_eq!(
            url.as_str(),
            "ws://localhost:8000/api/realtime/ws?user_id=anonymous"
        );

        let url = endpoint.channel_url(Platform::Client, "anonymous", Some(""));
        assert!(!url.as_str().contains("token"));
    }

    #[test]
    fn test_channel_url_encodes_query_values() {
        let endpoint = Endpoint::default();
        let url = endpoint.channel_url(Platform::Client, "a b&c", Some("t=1"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("user_id".to_string(), "a b&c".to_string()));
        assert_eq!(pairs[1], ("token".to_string(), "t=1".to_string()));
    }

    #[test]
    fn test_channel_url_invalid_base_falls_back() {
        let endpoint = Endpoint::with_ws_url("not a url");
        let url = endpoint.channel_url(Platform::Client, "u1", None);
        assert_eq!(
            url.as_str(),
            "ws://localhost:8000/api/realtime/ws?user_id=u1"
        );
    }
}
