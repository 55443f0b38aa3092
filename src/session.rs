//! Identity of one running bridge instance.

use crate::{error::BridgeError, memory::client::normalize_base_url};

/// Immutable identity shared by every component of a running bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSession {
    base_url: String,
    client: String,
    user_id: String,
}

impl BridgeSession {
    /// Validate and build a session identity.
    ///
    /// Every field must be non-blank and the base URL must be an absolute http(s) URL; anything
    /// else is a [`BridgeError::Configuration`].
    pub fn new(base_url: &str, client: &str, user_id: &str) -> Result<Self, BridgeError> {
        let base_url = require("baseUrl", base_url)?;
        let client = require("client", client)?;
        let user_id = require("userId", user_id)?;
        if client.contains('/') || user_id.contains('/') {
            return Err(BridgeError::Configuration(
                "`client` and `userId` must not contain '/'".into(),
            ));
        }
        let base_url = normalize_base_url(base_url)
            .map_err(|err| BridgeError::Configuration(format!("invalid baseUrl: {err}")))?;

        Ok(Self {
            base_url,
            client: client.to_string(),
            user_id: user_id.to_string(),
        })
    }

    /// Recover the identity from a canonical stream address `{base}/mcp/{client}/sse/{user}`.
    pub fn from_stream_url(stream_url: &str) -> Result<Self, BridgeError> {
        let mut parsed = reqwest::Url::parse(stream_url.trim())
            .map_err(|err| BridgeError::Configuration(format!("invalid stream URL: {err}")))?;

        let segments: Vec<String> = parsed
            .path()
            .trim_matches('/')
            .split('/')
            .map(str::to_string)
            .collect();
        let n = segments.len();
        if n < 4 || segments[n - 4] != "mcp" || segments[n - 2] != "sse" {
            return Err(BridgeError::Configuration(format!(
                "stream URL `{stream_url}` does not match {{baseUrl}}/mcp/{{client}}/sse/{{userId}}"
            )));
        }

        let client = segments[n - 3].clone();
        let user_id = segments[n - 1].clone();
        let prefix = segments[..n - 4].join("/");
        parsed.set_path(&prefix);
        parsed.set_query(None);
        parsed.set_fragment(None);

        Self::new(parsed.as_str(), &client, &user_id)
    }

    /// Memory service root.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Logical MCP client name.
    pub fn client(&self) -> &str {
        &self.client
    }

    /// Owner of the memories this bridge reads and writes.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Canonical stream address for this identity.
    pub fn stream_url(&self) -> String {
        format!("{}/mcp/{}/sse/{}", self.base_url, self.client, self.user_id)
    }
}

fn require<'a>(field: &str, value: &'a str) -> Result<&'a str, BridgeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::Configuration(format!(
            "`{field}` must not be empty"
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn builds_canonical_stream_url() {
        let session = BridgeSession::new("http://localhost:8765/", "claude", "moot").unwrap();
        assert_eq!(session.base_url(), "http://localhost:8765");
        assert_eq!(
            session.stream_url(),
            "http://localhost:8765/mcp/claude/sse/moot"
        );
    }

    #[test]
    fn empty_identity_fields_are_configuration_errors() {
        for (base, client, user) in [
            ("", "claude", "moot"),
            ("http://localhost:8765", " ", "moot"),
            ("http://localhost:8765", "claude", ""),
        ] {
            let err = BridgeSession::new(base, client, user).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConfigurationError);
        }
    }

    #[test]
    fn rejects_non_http_base_urls() {
        let err = BridgeSession::new("file:///tmp/memories", "claude", "moot").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }

    #[test]
    fn stream_url_round_trips() {
        let session =
            BridgeSession::from_stream_url("http://localhost:8765/mcp/claude/sse/moot").unwrap();
        assert_eq!(session.base_url(), "http://localhost:8765");
        assert_eq!(session.client(), "claude");
        assert_eq!(session.user_id(), "moot");
        assert_eq!(
            session.stream_url(),
            "http://localhost:8765/mcp/claude/sse/moot"
        );
    }

    #[test]
    fn stream_url_keeps_base_path_prefix() {
        let session =
            BridgeSession::from_stream_url("https://memory.example/api/mcp/cursor/sse/alice/")
                .unwrap();
        assert_eq!(session.base_url(), "https://memory.example/api");
        assert_eq!(session.client(), "cursor");
        assert_eq!(session.user_id(), "alice");
    }

    #[test]
    fn malformed_stream_urls_are_rejected() {
        for url in [
            "http://localhost:8765/mcp/claude",
            "http://localhost:8765/mcp/claude/events/moot",
            "not a url",
        ] {
            let err = BridgeSession::from_stream_url(url).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConfigurationError, "{url}");
        }
    }
}
