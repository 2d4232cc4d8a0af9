//! HTTP transport to the webhook sink.
//!
//! A single POST per call, no retries. Telemetry is at-most-once: a failed
//! report is logged by the caller and dropped.

use crate::preferences::{keys, PreferenceStore};
use serde::Serialize;
use std::time::Duration;

/// Where and how to send webhook requests.
///
/// Derived once from the stored registration and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Webhook endpoint
    pub api_url: String,
    /// Shared secret issued at registration
    pub secret: Option<String>,
    /// Whether requests must be encrypted
    pub encrypt: bool,
}

impl ApiConfig {
    /// Create a configuration that encrypts whenever a secret is present.
    pub fn new(api_url: impl Into<String>, secret: Option<String>) -> Self {
        let secret = secret.filter(|s| !s.is_empty());
        Self {
            api_url: api_url.into(),
            encrypt: secret.is_some(),
            secret,
        }
    }

    /// Build the configuration from stored registration credentials.
    ///
    /// Endpoint preference: cloud hook, then remote UI, then the server host.
    /// `require_encryption` forces encrypted requests even without a secret.
    pub fn from_preferences(
        prefs: &dyn PreferenceStore,
        require_encryption: bool,
    ) -> Result<Self, TransportError> {
        let get = |key: &str| -> Result<Option<String>, TransportError> {
            prefs
                .get(key)
                .map(|v| v.filter(|s| !s.is_empty()))
                .map_err(|e| TransportError::Config(e.to_string()))
        };

        let api_url = match get(keys::CLOUDHOOK_URL)? {
            Some(url) => url,
            None => {
                let webhook_id = get(keys::WEBHOOK_ID)?.ok_or_else(|| {
                    TransportError::Config("No webhook id stored; register first".to_string())
                })?;
                match get(keys::REMOTE_UI_URL)? {
                    Some(remote) => webhook_url(&remote, &webhook_id),
                    None => {
                        let host = get(keys::HOST)?.ok_or_else(|| {
                            TransportError::Config("No server host stored; register first".to_string())
                        })?;
                        let use_tls = get(keys::USE_TLS)?.is_some_and(|v| v == "true");
                        webhook_url(&base_url(&host, use_tls), &webhook_id)
                    }
                }
            }
        };

        let mut config = Self::new(api_url, get(keys::SECRET)?);
        config.encrypt |= require_encryption;
        Ok(config)
    }
}

/// `http(s)://host` unless `host` already carries a scheme.
pub fn base_url(host: &str, use_tls: bool) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else if use_tls {
        format!("https://{host}")
    } else {
        format!("http://{host}")
    }
}

/// Webhook endpoint under a server base URL.
pub fn webhook_url(base: &str, webhook_id: &str) -> String {
    format!("{}/api/webhook/{webhook_id}", base.trim_end_matches('/'))
}

/// Transport error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Client or endpoint configuration error
    Config(String),
    /// Connection failure or timeout
    Network(String),
    /// Sink answered with a non-2xx status
    Status { status: u16, body: String },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Config(msg) => write!(f, "Transport config error: {msg}"),
            TransportError::Network(msg) => write!(f, "Network error: {msg}"),
            TransportError::Status { status, body } => {
                write!(f, "Sink returned status {status}: {body}")
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// HTTP client for the sink. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
}

impl ApiClient {
    /// Create a client whose calls time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// POST an already marshaled JSON body and return the raw response body.
    pub async fn execute(&self, endpoint: &str, body: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let request = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .body(body);
        Self::send(request).await
    }

    /// POST a serializable body, optionally with a bearer token.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        token: Option<&str>,
        body: &T,
    ) -> Result<Vec<u8>, TransportError> {
        let mut request = self.client.post(endpoint).json(body);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        Self::send(request).await
    }

    async fn send(request: reqwest::RequestBuilder) -> Result<Vec<u8>, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::MemoryPreferences;

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("localhost:8123", false), "http://localhost:8123");
        assert_eq!(base_url("ha.example.org", true), "https://ha.example.org");
        assert_eq!(base_url("https://ha.example.org/", false), "https://ha.example.org");
    }

    #[test]
    fn test_webhook_url() {
        assert_eq!(
            webhook_url("http://localhost:8123/", "abc123"),
            "http://localhost:8123/api/webhook/abc123"
        );
    }

    #[test]
    fn test_api_config_from_host() {
        let mut prefs = MemoryPreferences::new();
        prefs.set(keys::HOST, "localhost:8123").unwrap();
        prefs.set(keys::USE_TLS, "true").unwrap();
        prefs.set(keys::WEBHOOK_ID, "abc123").unwrap();

        let config = ApiConfig::from_preferences(&prefs, false).unwrap();
        assert_eq!(config.api_url, "https://localhost:8123/api/webhook/abc123");
        assert_eq!(config.secret, None);
        assert!(!config.encrypt);
    }

    #[test]
    fn test_api_config_prefers_cloudhook() {
        let mut prefs = MemoryPreferences::new();
        prefs.set(keys::HOST, "localhost:8123").unwrap();
        prefs.set(keys::WEBHOOK_ID, "abc123").unwrap();
        prefs.set(keys::REMOTE_UI_URL, "https://remote.example.org").unwrap();
        prefs.set(keys::SECRET, "s3cret").unwrap();

        let config = ApiConfig::from_preferences(&prefs, false).unwrap();
        assert_eq!(config.api_url, "https://remote.example.org/api/webhook/abc123");
        assert!(config.encrypt);

        prefs
            .set(keys::CLOUDHOOK_URL, "https://hooks.example.org/xyz")
            .unwrap();
        let config = ApiConfig::from_preferences(&prefs, false).unwrap();
        assert_eq!(config.api_url, "https://hooks.example.org/xyz");
    }

    #[test]
    fn test_api_config_requires_registration() {
        let prefs = MemoryPreferences::new();
        assert!(matches!(
            ApiConfig::from_preferences(&prefs, false),
            Err(TransportError::Config(_))
        ));
    }

    #[test]
    fn test_require_encryption_without_secret() {
        let mut prefs = MemoryPreferences::new();
        prefs.set(keys::HOST, "localhost:8123").unwrap();
        prefs.set(keys::WEBHOOK_ID, "abc123").unwrap();

        let config = ApiConfig::from_preferences(&prefs, true).unwrap();
        assert!(config.encrypt);
        assert_eq!(config.secret, None);
    }
}
