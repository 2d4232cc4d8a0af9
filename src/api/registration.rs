//! One-shot device registration.
//!
//! Exchanges the device identity and a long-lived access token for webhook
//! credentials:
//!
//! ```text
//! Idle ──▶ AwaitingHostInfo ──▶ Requesting ──▶ Complete
//!               │                    │
//!               └────────────────────┴──────▶ Failed
//! ```
//!
//! There is no retry. A failure ends the flow and is returned to the caller.

use crate::api::transport::{base_url, ApiClient};
use crate::preferences::{keys, PreferenceStore};
use serde::{Deserialize, Serialize};

/// Path of the registration endpoint on the server.
pub const REGISTRATION_PATH: &str = "/api/mobile_app/registrations";

/// Application identifier sent to the sink.
pub const APP_ID: &str = "hass_sensor_agent";

/// Where the flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    AwaitingHostInfo,
    Requesting,
    Complete,
    Failed,
}

/// Server details supplied by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    /// `host:port` or a full URL
    pub server: String,
    /// Long-lived access token
    pub token: String,
    pub use_tls: bool,
}

/// Supplies host details, or `None` if the operator cancelled.
pub trait HostInfoProvider: Sync {
    fn host_info(&self) -> Option<HostInfo>;
}

/// Host details given up front, e.g. on the command line.
#[derive(Debug, Clone)]
pub struct StaticHostInfo(Option<HostInfo>);

impl StaticHostInfo {
    /// Empty server or token is treated as "nothing supplied".
    pub fn new(server: impl Into<String>, token: impl Into<String>, use_tls: bool) -> Self {
        let server = server.into();
        let token = token.into();
        if server.trim().is_empty() || token.trim().is_empty() {
            return Self(None);
        }
        Self(Some(HostInfo {
            server,
            token,
            use_tls,
        }))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl HostInfoProvider for StaticHostInfo {
    fn host_info(&self) -> Option<HostInfo> {
        self.0.clone()
    }
}

/// Identity of this device as sent in the registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_name: String,
    pub app_id: String,
    pub app_name: String,
    pub app_version: String,
    pub manufacturer: String,
    pub model: String,
    pub os_name: String,
    pub os_version: String,
    pub supports_encryption: bool,
    pub app_data: serde_json::Value,
}

impl DeviceInfo {
    /// Describe this host, reusing a stored device id when there is one.
    pub fn detect(prefs: &dyn PreferenceStore) -> Self {
        let device_id = prefs
            .get(keys::DEVICE_ID)
            .ok()
            .flatten()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let device_name = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            device_id,
            device_name,
            app_id: APP_ID.to_string(),
            app_name: crate::APP_NAME.to_string(),
            app_version: crate::VERSION.to_string(),
            manufacturer: "Unknown".to_string(),
            model: std::env::consts::ARCH.to_string(),
            os_name: std::env::consts::OS.to_string(),
            os_version: os_version(),
            supports_encryption: true,
            app_data: serde_json::json!({}),
        }
    }
}

#[cfg(feature = "system")]
fn os_version() -> String {
    sysinfo::System::os_version().unwrap_or_else(|| "unknown".to_string())
}

#[cfg(not(feature = "system"))]
fn os_version() -> String {
    "unknown".to_string()
}

/// Credentials returned by a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub webhook_id: String,
    /// Present when the sink wants encrypted requests
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub cloudhook_url: Option<String>,
    #[serde(default)]
    pub remote_ui_url: Option<String>,
}

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The host info provider supplied nothing
    NoHostInfo,
    /// The request failed or the response lacked credentials
    RegistrationFailed(String),
    /// Credentials could not be persisted
    Preferences(String),
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationError::NoHostInfo => write!(f, "No server or token provided"),
            RegistrationError::RegistrationFailed(msg) => write!(f, "Registration failed: {msg}"),
            RegistrationError::Preferences(msg) => {
                write!(f, "Could not save registration: {msg}")
            }
        }
    }
}

impl std::error::Error for RegistrationError {}

/// A single run of the registration protocol.
pub struct Registration {
    client: ApiClient,
    state: RegistrationState,
    force: bool,
}

impl Registration {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            state: RegistrationState::Idle,
            force: false,
        }
    }

    /// Register again even if the device is already registered.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// Run the flow to completion and persist the credentials in `prefs`.
    pub async fn run(
        &mut self,
        provider: &dyn HostInfoProvider,
        prefs: &mut dyn PreferenceStore,
    ) -> Result<Credentials, RegistrationError> {
        if self.state != RegistrationState::Idle {
            return Err(RegistrationError::RegistrationFailed(
                "registration flow already ran".to_string(),
            ));
        }
        if prefs.is_registered() && !self.force {
            return Err(self.fail(RegistrationError::RegistrationFailed(
                "device is already registered; re-run with force to register again".to_string(),
            )));
        }

        let device = DeviceInfo::detect(&*prefs);
        tracing::debug!(device_id = %device.device_id, device_name = %device.device_name, "Collected device identity");

        self.transition(RegistrationState::AwaitingHostInfo);
        let host = match provider.host_info() {
            Some(host) => host,
            None => return Err(self.fail(RegistrationError::NoHostInfo)),
        };

        self.transition(RegistrationState::Requesting);
        let url = format!("{}{REGISTRATION_PATH}", base_url(&host.server, host.use_tls));
        let credentials = match self.request(&url, &host.token, &device).await {
            Ok(credentials) => credentials,
            Err(e) => return Err(self.fail(e)),
        };

        if let Err(e) = save_registration(prefs, &host, &device, &credentials) {
            return Err(self.fail(e));
        }

        self.transition(RegistrationState::Complete);
        tracing::info!(server = %host.server, encrypted = credentials.secret.is_some(), "Device registered");
        Ok(credentials)
    }

    async fn request(
        &self,
        url: &str,
        token: &str,
        device: &DeviceInfo,
    ) -> Result<Credentials, RegistrationError> {
        let body = self
            .client
            .post_json(url, Some(token), device)
            .await
            .map_err(|e| RegistrationError::RegistrationFailed(e.to_string()))?;

        let credentials: Credentials = serde_json::from_slice(&body).map_err(|e| {
            RegistrationError::RegistrationFailed(format!("unreadable response: {e}"))
        })?;
        if credentials.webhook_id.is_empty() {
            return Err(RegistrationError::RegistrationFailed(
                "response did not include a webhook id".to_string(),
            ));
        }
        Ok(credentials)
    }

    fn transition(&mut self, next: RegistrationState) {
        tracing::debug!(from = ?self.state, to = ?next, "Registration state change");
        self.state = next;
    }

    fn fail(&mut self, error: RegistrationError) -> RegistrationError {
        tracing::error!(state = ?self.state, "Registration failed: {error}");
        self.state = RegistrationState::Failed;
        error
    }
}

fn save_registration(
    prefs: &mut dyn PreferenceStore,
    host: &HostInfo,
    device: &DeviceInfo,
    credentials: &Credentials,
) -> Result<(), RegistrationError> {
    let mut values: Vec<(&str, &str)> = vec![
        (keys::HOST, host.server.as_str()),
        (keys::USE_TLS, if host.use_tls { "true" } else { "false" }),
        (keys::TOKEN, host.token.as_str()),
        (keys::WEBHOOK_ID, credentials.webhook_id.as_str()),
        (keys::DEVICE_ID, device.device_id.as_str()),
        (keys::DEVICE_NAME, device.device_name.as_str()),
        (keys::VERSION, crate::VERSION),
    ];
    let optional = [
        (keys::SECRET, &credentials.secret),
        (keys::CLOUDHOOK_URL, &credentials.cloudhook_url),
        (keys::REMOTE_UI_URL, &credentials.remote_ui_url),
    ];
    for (key, value) in optional {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            values.push((key, value));
        }
    }
    // Written last so a partial save never looks registered
    values.push((keys::REGISTERED, "true"));

    for (key, value) in values {
        prefs
            .set(key, value)
            .map_err(|e| RegistrationError::Preferences(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::MemoryPreferences;
    use std::time::Duration;

    fn client() -> ApiClient {
        ApiClient::new(Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_static_host_info_empty_is_none() {
        assert!(StaticHostInfo::new("", "token", false).host_info().is_none());
        assert!(StaticHostInfo::new("localhost:8123", " ", false)
            .host_info()
            .is_none());
        assert!(StaticHostInfo::none().host_info().is_none());

        let info = StaticHostInfo::new("localhost:8123", "token", true)
            .host_info()
            .unwrap();
        assert_eq!(info.server, "localhost:8123");
        assert!(info.use_tls);
    }

    #[test]
    fn test_device_info_reuses_stored_id() {
        let mut prefs = MemoryPreferences::new();
        let fresh = DeviceInfo::detect(&prefs);
        assert!(uuid::Uuid::parse_str(&fresh.device_id).is_ok());
        assert!(fresh.supports_encryption);

        prefs.set(keys::DEVICE_ID, "stable-id").unwrap();
        assert_eq!(DeviceInfo::detect(&prefs).device_id, "stable-id");
    }

    #[test]
    fn test_credentials_optional_fields() {
        let credentials: Credentials = serde_json::from_str(r#"{"webhook_id":"abc"}"#).unwrap();
        assert_eq!(credentials.webhook_id, "abc");
        assert_eq!(credentials.secret, None);
        assert_eq!(credentials.cloudhook_url, None);
    }

    #[tokio::test]
    async fn test_no_host_info_fails() {
        let mut prefs = MemoryPreferences::new();
        let mut registration = Registration::new(client());

        let err = registration
            .run(&StaticHostInfo::none(), &mut prefs)
            .await
            .unwrap_err();
        assert_eq!(err, RegistrationError::NoHostInfo);
        assert_eq!(registration.state(), RegistrationState::Failed);
        assert!(!prefs.is_registered());
    }

    #[tokio::test]
    async fn test_already_registered_needs_force() {
        let mut prefs = MemoryPreferences::new();
        prefs.set(keys::REGISTERED, "true").unwrap();
        let mut registration = Registration::new(client());

        let err = registration
            .run(&StaticHostInfo::new("localhost:8123", "token", false), &mut prefs)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::RegistrationFailed(_)));
        assert_eq!(registration.state(), RegistrationState::Failed);
    }

    #[tokio::test]
    async fn test_flow_is_one_shot() {
        let mut prefs = MemoryPreferences::new();
        let mut registration = Registration::new(client());
        let _ = registration.run(&StaticHostInfo::none(), &mut prefs).await;

        let err = registration
            .run(&StaticHostInfo::none(), &mut prefs)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::RegistrationFailed(_)));
    }
}
