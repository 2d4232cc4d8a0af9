//! Webhook request envelopes.
//!
//! Plain requests are sent as `{"type": ..., "data": ...}`. Encrypted requests
//! seal that same record and send
//! `{"type": "encrypted", "encrypted_data": ..., "encrypted": true}`.

use crate::api::crypto;
use crate::api::types::{CodecError, RequestType};
use crate::sensor::{DeviceClass, EntityCategory, SensorState, SensorValue, StateClass};
use serde::Serialize;
use serde_json::Value;

/// Anything that can be sent to the webhook.
pub trait Request {
    /// Type of the payload itself (never [`RequestType::Encrypted`] for sensor data).
    fn request_type(&self) -> RequestType;

    /// JSON payload placed under `data`.
    fn request_data(&self) -> Result<Value, CodecError>;

    /// Whether the payload must be sealed before sending.
    fn encrypted(&self) -> bool {
        false
    }
}

#[derive(Serialize)]
struct UnencryptedRequest<'a> {
    #[serde(rename = "type")]
    request_type: RequestType,
    data: &'a Value,
}

#[derive(Serialize)]
struct EncryptedRequest {
    #[serde(rename = "type")]
    request_type: RequestType,
    encrypted_data: String,
    encrypted: bool,
}

/// Serialize a request into the bytes posted to the webhook.
///
/// Fails with [`CodecError::MissingSecret`] before producing any body when the
/// request must be encrypted and `secret` is absent or empty.
pub fn marshal<R: Request + ?Sized>(request: &R, secret: Option<&str>) -> Result<Vec<u8>, CodecError> {
    let secret = secret.filter(|s| !s.is_empty());
    if request.encrypted() && secret.is_none() {
        return Err(CodecError::MissingSecret);
    }

    let data = request.request_data()?;
    let inner = UnencryptedRequest {
        request_type: request.request_type(),
        data: &data,
    };
    let inner = serde_json::to_vec(&inner).map_err(|e| CodecError::Serialization(e.to_string()))?;

    match secret {
        Some(secret) if request.encrypted() => {
            let envelope = EncryptedRequest {
                request_type: RequestType::Encrypted,
                encrypted_data: crypto::encrypt(secret, &inner)?,
                encrypted: true,
            };
            serde_json::to_vec(&envelope).map_err(|e| CodecError::Serialization(e.to_string()))
        }
        _ => Ok(inner),
    }
}

/// Registration payload for a new sensor.
#[derive(Debug, Serialize)]
struct SensorRegistration<'a> {
    #[serde(rename = "type")]
    sensor_type: &'static str,
    unique_id: &'a str,
    name: &'a str,
    state: &'a SensorValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_of_measurement: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_class: Option<DeviceClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<StateClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity_category: Option<EntityCategory>,
    disabled: bool,
}

/// State update payload for an already registered sensor.
#[derive(Debug, Serialize)]
struct SensorStateUpdate<'a> {
    #[serde(rename = "type")]
    sensor_type: &'static str,
    unique_id: &'a str,
    state: &'a SensorValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
}

/// A sensor state as a webhook request.
///
/// Unregistered sensors always go out as `register_sensor`, registered ones as
/// `update_sensor_states`.
#[derive(Debug, Clone, Copy)]
pub struct SensorRequest<'a> {
    state: &'a SensorState,
    encrypted: bool,
}

impl<'a> SensorRequest<'a> {
    pub fn new(state: &'a SensorState, encrypted: bool) -> Self {
        Self { state, encrypted }
    }

    pub fn sensor_id(&self) -> &str {
        &self.state.id
    }
}

impl Request for SensorRequest<'_> {
    fn request_type(&self) -> RequestType {
        if self.state.metadata.registered {
            RequestType::UpdateSensorStates
        } else {
            RequestType::RegisterSensor
        }
    }

    fn request_data(&self) -> Result<Value, CodecError> {
        let s = self.state;
        let value = if s.metadata.registered {
            serde_json::to_value([SensorStateUpdate {
                sensor_type: s.sensor_type.as_str(),
                unique_id: &s.id,
                state: &s.value,
                attributes: s.attributes.as_ref(),
                icon: s.icon.as_deref(),
            }])
        } else {
            serde_json::to_value(SensorRegistration {
                sensor_type: s.sensor_type.as_str(),
                unique_id: &s.id,
                name: &s.name,
                state: &s.value,
                attributes: s.attributes.as_ref(),
                icon: s.icon.as_deref(),
                unit_of_measurement: s.units.as_deref(),
                device_class: s.device_class,
                state_class: s.state_class,
                entity_category: s.category,
                disabled: s.metadata.disabled,
            })
        };
        value.map_err(|e| CodecError::Serialization(e.to_string()))
    }

    fn encrypted(&self) -> bool {
        self.encrypted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{SensorMetadata, SensorUpdate};
    use serde_json::json;

    struct RawRequest {
        request_type: RequestType,
        encrypted: bool,
    }

    impl Request for RawRequest {
        fn request_type(&self) -> RequestType {
            self.request_type
        }

        fn request_data(&self) -> Result<Value, CodecError> {
            Ok(json!({"someField": "someValue"}))
        }

        fn encrypted(&self) -> bool {
            self.encrypted
        }
    }

    #[test]
    fn test_marshal_unencrypted() {
        let request = RawRequest {
            request_type: RequestType::UpdateSensorStates,
            encrypted: false,
        };
        let body = marshal(&request, None).unwrap();
        assert_eq!(
            body,
            br#"{"type":"update_sensor_states","data":{"someField":"someValue"}}"#.to_vec()
        );
    }

    #[test]
    fn test_marshal_encrypted_without_secret() {
        let request = RawRequest {
            request_type: RequestType::UpdateSensorStates,
            encrypted: true,
        };
        assert_eq!(marshal(&request, None), Err(CodecError::MissingSecret));
        assert_eq!(marshal(&request, Some("")), Err(CodecError::MissingSecret));
    }

    #[test]
    fn test_marshal_encrypted_with_secret() {
        let request = RawRequest {
            request_type: RequestType::UpdateSensorStates,
            encrypted: true,
        };
        let body = marshal(&request, Some("fakeSecret")).unwrap();
        let envelope: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(envelope["type"], "encrypted");
        assert_eq!(envelope["encrypted"], true);
        assert!(envelope.get("data").is_none());

        let sealed = envelope["encrypted_data"].as_str().unwrap();
        let inner: Value = serde_json::from_slice(&crypto::decrypt("fakeSecret", sealed).unwrap()).unwrap();
        assert_eq!(
            inner,
            json!({"type": "update_sensor_states", "data": {"someField": "someValue"}})
        );
    }

    #[test]
    fn test_secret_ignored_for_plain_requests() {
        let request = RawRequest {
            request_type: RequestType::RegisterSensor,
            encrypted: false,
        };
        let body: Value = serde_json::from_slice(&marshal(&request, Some("fakeSecret")).unwrap()).unwrap();
        assert_eq!(body["type"], "register_sensor");
    }

    #[test]
    fn test_sensor_request_register_payload() {
        let state = SensorState::from_update(
            SensorUpdate::new("battery_level", "Battery Level", 87i64)
                .units("%")
                .icon("mdi:battery")
                .device_class(DeviceClass::Battery)
                .state_class(StateClass::Measurement),
        );
        let request = SensorRequest::new(&state, false);
        assert_eq!(request.request_type(), RequestType::RegisterSensor);

        let body: Value = serde_json::from_slice(&marshal(&request, None).unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "type": "register_sensor",
                "data": {
                    "type": "sensor",
                    "unique_id": "battery_level",
                    "name": "Battery Level",
                    "state": 87,
                    "icon": "mdi:battery",
                    "unit_of_measurement": "%",
                    "device_class": "battery",
                    "state_class": "measurement",
                    "disabled": false
                }
            })
        );
    }

    #[test]
    fn test_sensor_request_update_payload() {
        let mut state = SensorState::from_update(
            SensorUpdate::new("wifi_strength", "Wi-Fi Strength", -42i64)
                .attributes(json!({"ssid": "home"})),
        );
        state.metadata = SensorMetadata {
            registered: true,
            disabled: false,
        };
        let request = SensorRequest::new(&state, false);
        assert_eq!(request.request_type(), RequestType::UpdateSensorStates);
        assert_eq!(request.sensor_id(), "wifi_strength");

        let body: Value = serde_json::from_slice(&marshal(&request, None).unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "type": "update_sensor_states",
                "data": [{
                    "type": "sensor",
                    "unique_id": "wifi_strength",
                    "state": -42,
                    "attributes": {"ssid": "home"}
                }]
            })
        );
    }
}
