//! The four-field response envelope and its validator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire names of the envelope fields.
pub const FIELD_ERROR_MESSAGE: &str = "api_error_message";
pub const FIELD_RESPONSE: &str = "api_response";
pub const FIELD_SERVER_VERSION: &str = "api_server_version";
pub const FIELD_STATUS_CODE: &str = "api_status_code";

/// Status recorded when `api_status_code` is present but not an integer HTTP status.
pub const UNUSABLE_STATUS: u16 = 0;

/// Uniform response shape produced by every API endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Empty on success.
    #[serde(rename = "api_error_message")]
    pub error_message: String,
    /// Decoded body; opaque to this layer.
    #[serde(rename = "api_response")]
    pub payload: Value,
    #[serde(rename = "api_server_version")]
    pub server_version: String,
    #[serde(rename = "api_status_code")]
    pub status_code: u16,
}

impl ResponseEnvelope {
    pub fn new(
        status_code: u16,
        error_message: impl Into<String>,
        payload: Value,
        server_version: impl Into<String>,
    ) -> Self {
        Self {
            error_message: error_message.into(),
            payload,
            server_version: server_version.into(),
            status_code,
        }
    }

    /// Envelope standing in for a response that never produced a usable body.
    pub fn synthesized(
        status_code: u16,
        error_message: impl Into<String>,
        server_version: impl Into<String>,
    ) -> Self {
        Self::new(
            status_code,
            error_message,
            Value::String(String::new()),
            server_version,
        )
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }

    /// Validate a decoded body and convert it into an envelope.
    ///
    /// Returns `None` when the value is not an envelope (see [`is_envelope`]). A status
    /// code that is not an integer HTTP status reads as [`UNUSABLE_STATUS`], which is
    /// never a success. Non-string message or version fields read as empty.
    pub fn from_value(value: Value) -> Option<Self> {
        if !is_envelope(&value) {
            return None;
        }
        let Value::Object(mut map) = value else {
            return None;
        };
        let status_code = map
            .get(FIELD_STATUS_CODE)
            .and_then(Value::as_u64)
            .filter(|code| (100..=999).contains(code))
            .map(|code| code as u16)
            .unwrap_or(UNUSABLE_STATUS);
        let text = |v: Option<Value>| match v {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        Some(Self {
            error_message: text(map.remove(FIELD_ERROR_MESSAGE)),
            payload: map.remove(FIELD_RESPONSE).unwrap_or(Value::Null),
            server_version: text(map.remove(FIELD_SERVER_VERSION)),
            status_code,
        })
    }
}

/// True iff `value` is a non-null object carrying all four envelope fields.
pub fn is_envelope(value: &Value) -> bool {
    match value.as_object() {
        Some(map) => [
            FIELD_RESPONSE,
            FIELD_ERROR_MESSAGE,
            FIELD_SERVER_VERSION,
            FIELD_STATUS_CODE,
        ]
        .iter()
        .all(|field| map.contains_key(*field)),
        None => false,
    }
}

/// Why an envelope had to be synthesized instead of decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticCause {
    /// The gateway answered 502; the body was not read.
    Unreachable,
    /// Connection, DNS or body-decode failure.
    Transport,
}

/// An envelope tagged with where it came from.
///
/// The wire shape is identical in every case; the tag only exists so callers and
/// tests can tell a real server answer from one the client made up.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Server(ResponseEnvelope),
    Cached(ResponseEnvelope),
    Synthesized {
        cause: SyntheticCause,
        envelope: ResponseEnvelope,
    },
}

impl Reply {
    pub fn envelope(&self) -> &ResponseEnvelope {
        match self {
            Reply::Server(envelope) | Reply::Cached(envelope) => envelope,
            Reply::Synthesized { envelope, .. } => envelope,
        }
    }

    pub fn into_envelope(self) -> ResponseEnvelope {
        match self {
            Reply::Server(envelope) | Reply::Cached(envelope) => envelope,
            Reply::Synthesized { envelope, .. } => envelope,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.envelope().status_code
    }

    pub fn payload(&self) -> &Value {
        &self.envelope().payload
    }

    pub fn error_message(&self) -> &str {
        &self.envelope().error_message
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Reply::Cached(_))
    }

    pub fn synthetic_cause(&self) -> Option<SyntheticCause> {
        match self {
            Reply::Synthesized { cause, .. } => Some(*cause),
            _ => None,
        }
    }
}
