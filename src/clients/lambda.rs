use std::time::Duration;

use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use aws_sdk_lambda::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

use crate::commands::Parameters;
use crate::config::ConfigParams;
use crate::connect::{AwsConnectionParams, AwsConnectionResolver};
use crate::count::CompositeCounters;
use crate::errors::ApplicationError;
use crate::instrument::{instrument, InstrumentTiming};
use crate::refer::References;

/// Error envelope produced by the Lambda runtime for a failed handler.
#[derive(Deserialize)]
struct RuntimeError {
    #[serde(rename = "errorMessage")]
    error_message: String,
}

/// Client for remote services exposed as AWS Lambda functions.
///
/// Every call sends one JSON object carrying `cmd` (the action to run) and
/// `correlation_id` next to the call arguments.
///
/// ### Configuration parameters
///
/// - `connection.*`: `arn` or `region`/`account`/`resource` of the function,
///   plus an optional `endpoint` override
/// - `credential.*`: `access_id` and `access_key`
/// - `options.connect_timeout`: connect timeout in ms (default 10000)
pub struct LambdaClient {
    resolver: AwsConnectionResolver,
    connect_timeout: Duration,
    connection: Option<AwsConnectionParams>,
    client: Option<Client>,
    counters: CompositeCounters,
}

impl Default for LambdaClient {
    fn default() -> Self {
        LambdaClient {
            resolver: AwsConnectionResolver::new(),
            connect_timeout: Duration::from_millis(10000),
            connection: None,
            client: None,
            counters: CompositeCounters::new(),
        }
    }
}

impl LambdaClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, config: &ConfigParams) {
        self.resolver.configure(config);
        self.connect_timeout = Duration::from_millis(
            config
                .get_as_integer_with_default(
                    "options.connect_timeout",
                    self.connect_timeout.as_millis() as i64,
                )
                .max(0) as u64,
        );
    }

    pub fn set_references(&mut self, references: &References) {
        self.counters.set_references(references);
    }

    pub fn counters(&self) -> &CompositeCounters {
        &self.counters
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    pub async fn open(&mut self, correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        if self.is_open() {
            return Ok(());
        }

        let connection = self.resolver.resolve(correlation_id)?;
        let sdk_config = connection.to_sdk_config(self.connect_timeout).await;
        self.client = Some(Client::new(&sdk_config));

        debug!(
            correlation_id = correlation_id.unwrap_or_default(),
            "Lambda client connected to {}",
            connection.arn()
        );
        self.connection = Some(connection);
        Ok(())
    }

    pub async fn close(&mut self, _correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        self.client = None;
        self.connection = None;
        Ok(())
    }

    /// Starts measuring a client call named `name`.
    pub fn instrument(&self, correlation_id: Option<&str>, name: &str) -> InstrumentTiming {
        instrument(&self.counters, correlation_id, name)
    }

    /// Invokes the function with `cmd` and `correlation_id` added to the
    /// arguments. A correlation id is generated when none is given.
    pub async fn invoke(
        &self,
        invocation_type: InvocationType,
        cmd: &str,
        correlation_id: Option<&str>,
        mut args: Parameters,
    ) -> Result<Value, ApplicationError> {
        let (Some(client), Some(connection)) = (&self.client, &self.connection) else {
            return Err(ApplicationError::invalid_state(
                correlation_id,
                "NOT_OPENED",
                "Lambda client is not opened",
            ));
        };

        if cmd.is_empty() {
            let err = ApplicationError::unknown(correlation_id, "NO_COMMAND", "Missing cmd");
            error!(
                correlation_id = correlation_id.unwrap_or_default(),
                "Failed to call {}: {}", cmd, err
            );
            return Err(err);
        }

        let correlation_id = correlation_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        args.insert("cmd".to_string(), Value::String(cmd.to_string()));
        args.insert(
            "correlation_id".to_string(),
            Value::String(correlation_id.clone()),
        );
        let payload = serde_json::to_vec(&Value::Object(args))
            .map_err(|e| ApplicationError::from(e).with_correlation_id(Some(&correlation_id)))?;

        let output = client
            .invoke()
            .function_name(connection.arn())
            .invocation_type(invocation_type)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|err| {
                error!(
                    correlation_id = correlation_id.as_str(),
                    "Failed to invoke lambda function: {}", err
                );
                ApplicationError::invocation(
                    Some(&correlation_id),
                    "CALL_FAILED",
                    "Failed to invoke lambda function",
                )
                .with_cause(err)
            })?;

        let payload = output.payload().map(|b| b.as_ref()).unwrap_or_default();
        if let Some(function_error) = output.function_error() {
            return Err(remote_error(&correlation_id, function_error, payload));
        }
        parse_payload(&correlation_id, payload)
    }

    /// Synchronous call waiting for the function result.
    pub async fn call(
        &self,
        cmd: &str,
        correlation_id: Option<&str>,
        params: Parameters,
    ) -> Result<Value, ApplicationError> {
        self.invoke(InvocationType::RequestResponse, cmd, correlation_id, params)
            .await
    }

    /// Asynchronous call that does not wait for the function to run.
    pub async fn call_one_way(
        &self,
        cmd: &str,
        correlation_id: Option<&str>,
        params: Parameters,
    ) -> Result<(), ApplicationError> {
        self.invoke(InvocationType::Event, cmd, correlation_id, params)
            .await
            .map(|_| ())
    }
}

fn parse_payload(correlation_id: &str, payload: &[u8]) -> Result<Value, ApplicationError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(payload).map_err(|e| {
        ApplicationError::invocation(
            Some(correlation_id),
            "DESERIALIZATION_FAILED",
            "Failed to deserialize result",
        )
        .with_cause(e)
    })
}

/// Restores the remote `ApplicationError` from a function error payload,
/// either as is or wrapped in the runtime's `errorMessage` envelope.
fn remote_error(correlation_id: &str, function_error: &str, payload: &[u8]) -> ApplicationError {
    if let Ok(err) = serde_json::from_slice::<ApplicationError>(payload) {
        return err;
    }
    if let Ok(runtime) = serde_json::from_slice::<RuntimeError>(payload) {
        if let Ok(err) = serde_json::from_str::<ApplicationError>(&runtime.error_message) {
            return err;
        }
    }

    ApplicationError::invocation(
        Some(correlation_id),
        "CALL_FAILED",
        format!("Lambda function failed with {} error", function_error),
    )
    .with_details("function_error", function_error)
    .with_cause(String::from_utf8_lossy(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload("1", b"").unwrap(), Value::Null);
        assert_eq!(parse_payload("1", b"null").unwrap(), Value::Null);
        assert_eq!(
            parse_payload("1", br#"{"id":"1"}"#).unwrap(),
            serde_json::json!({"id": "1"})
        );
        let err = parse_payload("1", b"not json").unwrap_err();
        assert_eq!(err.code, "DESERIALIZATION_FAILED");
    }

    #[test]
    fn test_remote_error_from_runtime_envelope() {
        let remote = ApplicationError::bad_request(Some("123"), "NO_ACTION", "Action x was not found")
            .with_details("command", "x");
        let envelope = serde_json::json!({
            "errorType": "&alloc::boxed::Box<dyn core::error::Error + core::marker::Send + core::marker::Sync>",
            "errorMessage": remote.to_json(),
        });

        let err = remote_error("123", "Unhandled", envelope.to_string().as_bytes());
        assert_eq!(err, remote);

        let err = remote_error("123", "Unhandled", b"boom");
        assert_eq!(err.code, "CALL_FAILED");
        assert_eq!(err.category, ErrorCategory::Invocation);
        assert_eq!(err.cause.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_invoke_before_open_fails() {
        let client = LambdaClient::new();
        let err = client.call("get_dummies", None, Parameters::new()).await.unwrap_err();
        assert_eq!(err.code, "NOT_OPENED");
    }
}
