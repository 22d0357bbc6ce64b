//! Client target configuration.
//!
//! Plain serde data so the host can load it from whatever source it uses;
//! the binding layer itself never reads files or the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Logical name of the remote service, used in logs.
    #[serde(default)]
    pub name: String,
    /// Origin every path template is resolved against.
    pub url: String,
    /// Decode 404 responses as an absent value instead of failing.
    #[serde(default)]
    pub decode_404: bool,
    /// Whole-call timeout for the stock transport.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ClientConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.trim_end_matches('/').to_string(),
            decode_404: false,
            timeout_ms: None,
        }
    }

    pub fn decode_404(mut self, enabled: bool) -> Self {
        self.decode_404 = enabled;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// The target URL without trailing separators.
    pub fn target_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_stripped() {
        let config = ClientConfig::new("orders", "http://localhost:3000/");
        assert_eq!(config.target_url(), "http://localhost:3000");
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"url":"http://orders/"}"#).unwrap();
        assert_eq!(config.target_url(), "http://orders");
        assert!(!config.decode_404);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn timeout_is_in_milliseconds() {
        let config: ClientConfig = serde_json::from_str(r#"{"url":"http://o","timeout_ms":1500}"#).unwrap();
        assert_eq!(config.timeout(), Some(Duration::from_millis(1500)));
    }
}
