use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ApplicationError;

/// Converts a call result into a typed value; a `null` result is `None`.
pub fn convert_command_result<T: DeserializeOwned>(
    result: Value,
) -> Result<Option<T>, ApplicationError> {
    if result.is_null() {
        return Ok(None);
    }
    serde_json::from_value(result).map(Some).map_err(|e| {
        ApplicationError::invocation(None, "DESERIALIZATION_FAILED", "Failed to convert result")
            .with_cause(e)
    })
}
