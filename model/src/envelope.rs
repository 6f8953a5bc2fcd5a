//! The wire envelope every response (success or error) is wrapped in.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The protocol this crate speaks. Bumped only on a breaking wire change.
pub const PROTOCOL_VERSION: &str = "arena/v0";

/// A generic success envelope: `{protocol_version, ..fields}`.
///
/// Flattened so callers can define their own response body and still get the
/// `protocol_version` field for free.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Envelope<T> {
    pub protocol_version: String,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn new(body: T) -> Self {
        Envelope {
            protocol_version: PROTOCOL_VERSION.to_string(),
            body,
        }
    }
}

/// The error envelope's `error` field.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// The standard error response body: `{protocol_version, error}`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub protocol_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        ErrorResponse {
            protocol_version: PROTOCOL_VERSION.to_string(),
            error: ErrorInfo {
                code: code.into(),
                message: message.into(),
                retryable,
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.error.details = Some(details);
        self
    }
}
