//! Decoding of webhook responses.
//!
//! The sink answers with a loosely shaped JSON object:
//!
//! ```text
//! {
//!   "success": true,                      // registration outcome
//!   "<sensor id>": {                      // per-sensor outcome
//!     "success": false,
//!     "error": {"code": "...", "message": "..."},
//!     "is_disabled": true
//!   }
//! }
//! ```
//!
//! Any subset of those keys may be present.

use crate::api::types::CodecError;
use crate::sensor::SensorMetadata;
use serde_json::{Map, Value};

/// Error detail reported for a single sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome reported under the sensor's own id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorStatus {
    pub success: bool,
    pub error: Option<ApiError>,
    /// `is_disabled` key was present
    pub is_disabled: bool,
}

/// Decoded response for one sensor's request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SensorResponse {
    /// Top-level `success`, if present
    pub success: Option<bool>,
    /// Entry keyed by the sensor id, if present
    pub sensor: Option<SensorStatus>,
}

/// Metadata changes caused by applying a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetadataChange {
    /// The sensor went from unregistered to registered
    pub registered: bool,
    /// New value of the disabled flag, if it flipped
    pub disabled: Option<bool>,
}

impl MetadataChange {
    pub fn is_empty(&self) -> bool {
        !self.registered && self.disabled.is_none()
    }
}

impl SensorResponse {
    /// Whether the sink explicitly reported a failure.
    pub fn rejected(&self) -> bool {
        self.success == Some(false) || self.sensor.as_ref().is_some_and(|s| !s.success)
    }

    /// Fold this response into a sensor's metadata.
    ///
    /// `registered` only ever goes false -> true. `disabled` follows the
    /// per-sensor entry when one is present and is left alone otherwise.
    pub fn apply(&self, metadata: &mut SensorMetadata) -> MetadataChange {
        let mut change = MetadataChange::default();

        if self.success == Some(true) && !metadata.registered {
            metadata.registered = true;
            change.registered = true;
        }

        if let Some(status) = &self.sensor {
            if status.is_disabled != metadata.disabled {
                metadata.disabled = status.is_disabled;
                change.disabled = Some(status.is_disabled);
            }
        }

        change
    }
}

/// Decode a response body for the sensor `sensor_id`.
///
/// An empty body or an empty object means the sink did not act on the
/// request (usually bad request data); that yields `Ok(None)` and must not
/// change any metadata.
pub fn decode_response(body: &[u8], sensor_id: &str) -> Result<Option<SensorResponse>, CodecError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| CodecError::MalformedResponse(e.to_string()))?;
    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(CodecError::MalformedResponse(format!(
                "expected a JSON object, got {other}"
            )))
        }
    };
    if object.is_empty() {
        return Ok(None);
    }

    let success = object.get("success").and_then(Value::as_bool);
    // A bad per-sensor entry does not invalidate the top-level outcome.
    let sensor = match object.get(sensor_id) {
        Some(Value::Object(entry)) => Some(decode_status(entry)),
        Some(other) => {
            tracing::warn!(sensor = %sensor_id, "Ignoring non-object response entry: {other}");
            None
        }
        None => None,
    };

    Ok(Some(SensorResponse { success, sensor }))
}

fn decode_status(entry: &Map<String, Value>) -> SensorStatus {
    let error = entry.get("error").and_then(Value::as_object).map(|e| ApiError {
        code: text(e.get("code")),
        message: text(e.get("message")),
    });

    SensorStatus {
        success: entry.get("success").and_then(Value::as_bool).unwrap_or(false),
        error,
        is_disabled: entry.contains_key("is_disabled"),
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}
