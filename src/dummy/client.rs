use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::clients::{convert_command_result, LambdaClient};
use crate::commands::Parameters;
use crate::config::ConfigParams;
use crate::dummy::{DataPage, Dummy, FilterParams, PagingParams};
use crate::errors::ApplicationError;
use crate::refer::References;

/// Typed client of a function hosting the dummy actions. `prefix` is
/// prepended to the action names, e.g. `dummies` for a hosted service.
pub struct DummyLambdaClient {
    client: LambdaClient,
    prefix: Option<String>,
}

impl Default for DummyLambdaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyLambdaClient {
    pub fn new() -> Self {
        DummyLambdaClient {
            client: LambdaClient::new(),
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
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

    async fn call<T: DeserializeOwned>(
        &self,
        name: &str,
        correlation_id: Option<&str>,
        params: Value,
    ) -> Result<Option<T>, ApplicationError> {
        let cmd = match &self.prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.to_string(),
        };
        let params: Parameters = match params {
            Value::Object(map) => map,
            _ => Parameters::new(),
        };

        let timing = self
            .client
            .instrument(correlation_id, &format!("dummies.{}", name));
        let result = self.client.call(&cmd, correlation_id, params).await;
        timing.end(result.and_then(convert_command_result))
    }

    pub async fn get_dummies(
        &self,
        correlation_id: Option<&str>,
        filter: &FilterParams,
        paging: &PagingParams,
    ) -> Result<Option<DataPage<Dummy>>, ApplicationError> {
        self.call(
            "get_dummies",
            correlation_id,
            json!({"filter": filter, "paging": paging}),
        )
        .await
    }

    pub async fn get_dummy_by_id(
        &self,
        correlation_id: Option<&str>,
        dummy_id: &str,
    ) -> Result<Option<Dummy>, ApplicationError> {
        self.call("get_dummy_by_id", correlation_id, json!({"dummy_id": dummy_id}))
            .await
    }

    pub async fn create_dummy(
        &self,
        correlation_id: Option<&str>,
        dummy: &Dummy,
    ) -> Result<Option<Dummy>, ApplicationError> {
        self.call("create_dummy", correlation_id, json!({"dummy": dummy}))
            .await
    }

    pub async fn update_dummy(
        &self,
        correlation_id: Option<&str>,
        dummy: &Dummy,
    ) -> Result<Option<Dummy>, ApplicationError> {
        self.call("update_dummy", correlation_id, json!({"dummy": dummy}))
            .await
    }

    pub async fn delete_dummy(
        &self,
        correlation_id: Option<&str>,
        dummy_id: &str,
    ) -> Result<Option<Dummy>, ApplicationError> {
        self.call("delete_dummy", correlation_id, json!({"dummy_id": dummy_id}))
            .await
    }
}
