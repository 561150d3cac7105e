//! Chat endpoint addressing.
//!
//! The connection target is rebuilt on every connect attempt because it
//! embeds the current access token.

use url::Url;

use crate::constants::{CHAT_ENDPOINT_PATH, CLIENT_TYPE_CONSOLE};

/// Errors building a connection URL.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid base url: {0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported url scheme '{0}'; expected http(s) or ws(s)")]
    UnsupportedScheme(String),
}

/// Where and as whom the client connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEndpoint {
    /// Server origin, e.g. `https://chat.example.com`. `http(s)` is mapped
    /// to `ws(s)`.
    pub base_url: String,
    pub path: String,
    pub client_type: u8,
    /// Room key of an embedded widget. Consoles leave this empty.
    pub room_key: Option<String>,
    pub site_key: String,
}

impl ChatEndpoint {
    pub fn new(base_url: impl Into<String>, site_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: CHAT_ENDPOINT_PATH.to_string(),
            client_type: CLIENT_TYPE_CONSOLE,
            room_key: None,
            site_key: site_key.into(),
        }
    }

    pub fn with_room_key(mut self, room_key: impl Into<String>) -> Self {
        self.room_key = Some(room_key.into());
        self
    }

    /// Builds the WebSocket URL for one connect attempt.
    pub fn url(&self, access_token: &str) -> Result<Url, EndpointError> {
        let mut url = Url::parse(self.base_url.trim())?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| EndpointError::UnsupportedScheme(scheme.to_string()))?;
        url.set_path(&self.path);
        url.set_fragment(None);
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("access_token", access_token);
            query.append_pair("client", &self.client_type.to_string());
            query.append_pair("room_key", self.room_key.as_deref().unwrap_or_default());
            query.append_pair("site_key", &self.site_key);
        }
        Ok(url)
    }
}
