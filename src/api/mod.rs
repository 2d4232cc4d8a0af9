//! Wire protocol for the webhook sink.
//!
//! This module contains:
//! - Request envelopes, plain and encrypted
//! - Per-sensor response decoding
//! - The HTTP transport
//! - The one-shot device registration flow

pub mod crypto;
pub mod registration;
pub mod request;
pub mod response;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use registration::{
    Credentials, DeviceInfo, HostInfo, HostInfoProvider, Registration, RegistrationError,
    RegistrationState, StaticHostInfo,
};
pub use request::{marshal, Request, SensorRequest};
pub use response::{decode_response, ApiError, MetadataChange, SensorResponse, SensorStatus};
pub use transport::{ApiClient, ApiConfig, TransportError};
pub use types::{CodecError, RequestType};
