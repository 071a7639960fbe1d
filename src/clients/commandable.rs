use serde_json::Value;

use crate::clients::LambdaClient;
use crate::commands::Parameters;
use crate::config::ConfigParams;
use crate::errors::ApplicationError;
use crate::refer::References;

/// Lambda client for functions that expose a command set: each command is
/// called by its name and instrumented as `<name>.<command>`.
pub struct CommandableLambdaClient {
    name: String,
    client: LambdaClient,
}

impl CommandableLambdaClient {
    pub fn new(name: &str) -> Self {
        CommandableLambdaClient {
            name: name.to_string(),
            client: LambdaClient::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &LambdaClient {
        &self.client
    }

    pub fn configure(&mut self, config: &ConfigParams) {
        self.client.configure(config);
    }

    pub fn set_references(&mut self, references: &References) {
        self.client.set_references(references);
    }

    pub fn is_open(&self) -> bool {
        self.client.is_open()
    }

    pub async fn open(&mut self, correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        self.client.open(correlation_id).await
    }

    pub async fn close(&mut self, correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        self.client.close(correlation_id).await
    }

    pub async fn call_command(
        &self,
        name: &str,
        correlation_id: Option<&str>,
        params: Parameters,
    ) -> Result<Value, ApplicationError> {
        let timing = self
            .client
            .instrument(correlation_id, &format!("{}.{}", self.name, name));
        let result = self.client.call(name, correlation_id, params).await;
        timing.end(result)
    }
}
