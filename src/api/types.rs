//! Types shared by the request and response codecs.

use serde::{Deserialize, Serialize};

/// Discriminator carried in the `type` field of every webhook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    UpdateSensorStates,
    RegisterSensor,
    Encrypted,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::UpdateSensorStates => "update_sensor_states",
            RequestType::RegisterSensor => "register_sensor",
            RequestType::Encrypted => "encrypted",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors building requests or reading responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Encryption is required but no secret is configured
    MissingSecret,
    /// Payload could not be serialized
    Serialization(String),
    /// Encrypting or decrypting a payload failed
    Encryption(String),
    /// Response body could not be understood
    MalformedResponse(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::MissingSecret => {
                write!(f, "Encrypted request requested but no secret is configured")
            }
            CodecError::Serialization(msg) => write!(f, "Request serialization error: {msg}"),
            CodecError::Encryption(msg) => write!(f, "Encryption error: {msg}"),
            CodecError::MalformedResponse(msg) => write!(f, "Malformed response: {msg}"),
        }
    }
}

impl std::error::Error for CodecError {}
