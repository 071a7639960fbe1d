use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Broad classes of failures. Serialized with the names callers on the
/// other side of the Lambda boundary expect.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
pub enum ErrorCategory {
    Unknown,
    Internal,
    Misconfiguration,
    InvalidState,
    BadRequest,
    Invocation,
    NotFound,
    Unauthorized,
    Conflict,
}

impl ErrorCategory {
    pub fn status(&self) -> u16 {
        match self {
            ErrorCategory::BadRequest => 400,
            ErrorCategory::Unauthorized => 401,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Conflict => 409,
            ErrorCategory::Unknown
            | ErrorCategory::Internal
            | ErrorCategory::Misconfiguration
            | ErrorCategory::InvalidState
            | ErrorCategory::Invocation => 500,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Structured error returned by every layer of the crate and serialized
/// as the failure envelope of a Lambda invocation.
#[derive(thiserror::Error, Serialize, Deserialize, PartialEq, Debug, Clone)]
#[error("{code}: {message}")]
pub struct ApplicationError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ApplicationError {
    pub fn new(
        category: ErrorCategory,
        correlation_id: Option<&str>,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        ApplicationError {
            category,
            code: code.to_string(),
            message: message.into(),
            status: category.status(),
            correlation_id: correlation_id.map(str::to_string),
            details: BTreeMap::new(),
            cause: None,
        }
    }

    pub fn unknown(correlation_id: Option<&str>, code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Unknown, correlation_id, code, message)
    }

    pub fn internal(correlation_id: Option<&str>, code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, correlation_id, code, message)
    }

    pub fn config(correlation_id: Option<&str>, code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Misconfiguration, correlation_id, code, message)
    }

    pub fn invalid_state(
        correlation_id: Option<&str>,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorCategory::InvalidState, correlation_id, code, message)
    }

    pub fn bad_request(
        correlation_id: Option<&str>,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorCategory::BadRequest, correlation_id, code, message)
    }

    pub fn invocation(correlation_id: Option<&str>, code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Invocation, correlation_id, code, message)
    }

    pub fn unauthorized(
        correlation_id: Option<&str>,
        code: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorCategory::Unauthorized, correlation_id, code, message)
    }

    pub fn with_details(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<&str>) -> Self {
        if correlation_id.is_some() {
            self.correlation_id = correlation_id.map(str::to_string);
        }
        self
    }

    /// Serialized form used as the Lambda error payload.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"code\":\"{}\"}}", self.code))
    }
}

impl From<serde_json::Error> for ApplicationError {
    fn from(err: serde_json::Error) -> Self {
        ApplicationError::internal(None, "SERIALIZATION_FAILED", "Failed to serialize value")
            .with_cause(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_shape() {
        let err = ApplicationError::bad_request(Some("123"), "NO_ACTION", "Action x was not found")
            .with_details("command", "x");

        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["code"], "NO_ACTION");
        assert_eq!(value["category"], "BadRequest");
        assert_eq!(value["status"], 400);
        assert_eq!(value["correlation_id"], "123");
        assert_eq!(value["details"]["command"], "x");
        assert!(value.get("cause").is_none());

        let parsed: ApplicationError = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, err);
    }

    #[test]
    fn test_display_includes_code() {
        let err = ApplicationError::config(None, "NO_ACCESS_ID", "No access_id is configured");
        assert_eq!(err.to_string(), "NO_ACCESS_ID: No access_id is configured");
        assert_eq!(err.status, 500);
    }
}
