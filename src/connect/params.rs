use std::fmt;
use std::ops::Deref;
use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_lambda::config::Credentials;

use crate::config::ConfigParams;
use crate::errors::ApplicationError;

const EMPTY_ARN: &str = "arn:aws::::";

/// Parameters to authenticate against AWS and address one resource,
/// composed from the `connection` and `credential` configuration sections.
///
/// The resource ARN is composed from its parts unless set explicitly:
/// `arn:<partition>:<service>:<region>:<account>[:<resource_type>]:<resource>`.
#[derive(Clone, Default, PartialEq)]
pub struct AwsConnectionParams {
    values: ConfigParams,
}

impl AwsConnectionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tuples(tuples: &[(&str, &str)]) -> Self {
        AwsConnectionParams {
            values: ConfigParams::from_tuples(tuples),
        }
    }

    /// Merges every credential section and then every connection section.
    pub fn from_config(config: &ConfigParams) -> Self {
        let mut result = AwsConnectionParams::new();
        for credential in config.get_many_sections("credentials", "credential") {
            result.append(&credential);
        }
        for connection in config.get_many_sections("connections", "connection") {
            result.append(&connection);
        }
        result
    }

    pub fn append(&mut self, values: &ConfigParams) {
        self.values.append(values);
    }

    pub fn put(&mut self, key: &str, value: impl ToString) {
        self.values.put(key, value);
    }

    fn get_or_empty(&self, key: &str) -> String {
        self.values.get_as_nullable_string(key).unwrap_or_default()
    }

    fn get_non_empty(&self, key: &str) -> Option<String> {
        self.values
            .get_as_nullable_string(key)
            .filter(|v| !v.is_empty())
    }

    pub fn partition(&self) -> String {
        self.get_non_empty("partition")
            .unwrap_or_else(|| "aws".to_string())
    }

    pub fn set_partition(&mut self, value: &str) {
        self.put("partition", value);
    }

    pub fn service(&self) -> String {
        self.get_non_empty("service")
            .or_else(|| self.get_non_empty("protocol"))
            .unwrap_or_default()
    }

    pub fn set_service(&mut self, value: &str) {
        self.put("service", value);
    }

    pub fn region(&self) -> String {
        self.get_or_empty("region")
    }

    pub fn set_region(&mut self, value: &str) {
        self.put("region", value);
    }

    pub fn account(&self) -> String {
        self.get_or_empty("account")
    }

    pub fn set_account(&mut self, value: &str) {
        self.put("account", value);
    }

    pub fn resource_type(&self) -> String {
        self.get_or_empty("resource_type")
    }

    pub fn set_resource_type(&mut self, value: &str) {
        self.put("resource_type", value);
    }

    pub fn resource(&self) -> String {
        self.get_or_empty("resource")
    }

    pub fn set_resource(&mut self, value: &str) {
        self.put("resource", value);
    }

    pub fn arn(&self) -> String {
        if let Some(arn) = self.get_non_empty("arn") {
            return arn;
        }

        let mut arn = format!(
            "arn:{}:{}:{}:{}",
            self.partition(),
            self.service(),
            self.region(),
            self.account()
        );
        let resource_type = self.resource_type();
        if !resource_type.is_empty() {
            arn.push(':');
            arn.push_str(&resource_type);
        }
        arn.push(':');
        arn.push_str(&self.resource());
        arn
    }

    /// Stores the ARN and splits it into partition, service, region,
    /// account, resource type and resource.
    pub fn set_arn(&mut self, value: &str) {
        self.put("arn", value);
        if value.is_empty() {
            return;
        }

        let tokens: Vec<&str> = value.split(':').collect();
        let token = |i: usize| tokens.get(i).copied().unwrap_or("");

        self.set_partition(token(1));
        self.set_service(token(2));
        self.set_region(token(3));
        self.set_account(token(4));
        if tokens.len() > 6 {
            self.set_resource_type(token(5));
            self.set_resource(token(6));
        } else {
            match token(5).split_once('/') {
                Some((resource_type, resource)) if !resource_type.is_empty() => {
                    self.set_resource_type(resource_type);
                    self.set_resource(resource);
                }
                _ => {
                    self.set_resource_type("");
                    self.set_resource(token(5));
                }
            }
        }
    }

    pub fn access_id(&self) -> String {
        self.values
            .get_as_nullable_string("access_id")
            .or_else(|| self.values.get_as_nullable_string("client_id"))
            .unwrap_or_default()
    }

    pub fn set_access_id(&mut self, value: &str) {
        self.put("access_id", value);
    }

    pub fn access_key(&self) -> String {
        self.values
            .get_as_nullable_string("access_key")
            .or_else(|| self.values.get_as_nullable_string("client_key"))
            .or_else(|| self.values.get_as_nullable_string("secret_key"))
            .unwrap_or_default()
    }

    pub fn set_access_key(&mut self, value: &str) {
        self.put("access_key", value);
    }

    /// Service endpoint override, e.g. a local emulator.
    pub fn endpoint(&self) -> Option<String> {
        self.get_non_empty("endpoint")
    }

    pub fn set_endpoint(&mut self, value: &str) {
        self.put("endpoint", value);
    }

    pub fn validate(&self, correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        if self.arn() == EMPTY_ARN {
            return Err(ApplicationError::config(
                correlation_id,
                "NO_AWS_CONNECTION",
                "AWS connection is not set",
            ));
        }
        if self.access_id().is_empty() {
            return Err(ApplicationError::config(
                correlation_id,
                "NO_ACCESS_ID",
                "No access_id is configured in AWS credential",
            ));
        }
        if self.access_key().is_empty() {
            return Err(ApplicationError::config(
                correlation_id,
                "NO_ACCESS_KEY",
                "No access_key is configured in AWS credential",
            ));
        }
        Ok(())
    }

    /// Shared SDK configuration with static credentials, the region, a
    /// connect timeout and the optional endpoint override.
    pub async fn to_sdk_config(&self, connect_timeout: Duration) -> SdkConfig {
        let credentials = Credentials::new(
            self.access_id(),
            self.access_key(),
            None,
            None,
            "pip-services-aws",
        );
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region()))
            .credentials_provider(credentials)
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(connect_timeout)
                    .build(),
            );
        if let Some(endpoint) = self.endpoint() {
            loader = loader.endpoint_url(endpoint);
        }
        loader.load().await
    }
}

impl Deref for AwsConnectionParams {
    type Target = ConfigParams;

    fn deref(&self) -> &ConfigParams {
        &self.values
    }
}

impl fmt::Debug for AwsConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AwsConnectionParams").field(&self.values).finish()
    }
}
