use tracing::debug;

use crate::config::ConfigParams;
use crate::connect::AwsConnectionParams;
use crate::errors::ApplicationError;

/// Resolves the configured AWS connection and credential into one
/// validated [`AwsConnectionParams`].
#[derive(Clone, Default, Debug)]
pub struct AwsConnectionResolver {
    connections: Vec<ConfigParams>,
    credentials: Vec<ConfigParams>,
}

impl AwsConnectionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, config: &ConfigParams) {
        self.connections = config.get_many_sections("connections", "connection");
        self.credentials = config.get_many_sections("credentials", "credential");
    }

    /// Takes the first connection, then the first credential, and
    /// normalizes the ARN before validating the result.
    pub fn resolve(
        &self,
        correlation_id: Option<&str>,
    ) -> Result<AwsConnectionParams, ApplicationError> {
        let mut connection = AwsConnectionParams::new();
        if let Some(params) = self.connections.first() {
            connection.append(params);
        }
        if let Some(params) = self.credentials.first() {
            connection.append(params);
        }

        let arn = connection.arn();
        connection.set_arn(&arn);
        connection.validate(correlation_id)?;

        debug!(
            correlation_id = correlation_id.unwrap_or_default(),
            "Resolved AWS connection to {}", arn
        );
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_connection_and_credential() {
        let mut resolver = AwsConnectionResolver::new();
        resolver.configure(&ConfigParams::from_tuples(&[
            ("connection.arn", "arn:aws:lambda:us-east-1:12342342332:function:dummies"),
            ("credential.access_id", "id"),
            ("credential.access_key", "key"),
        ]));

        let connection = resolver.resolve(Some("123")).unwrap();
        assert_eq!(connection.region(), "us-east-1");
        assert_eq!(connection.resource(), "dummies");
        assert_eq!(connection.access_id(), "id");
    }

    #[test]
    fn test_resolve_uses_first_connection_only() {
        let mut resolver = AwsConnectionResolver::new();
        resolver.configure(&ConfigParams::from_tuples(&[
            ("connections.primary.region", "us-east-1"),
            (
                "connections.secondary.arn",
                "arn:aws:lambda:eu-west-1:12342342332:function:dummies",
            ),
            ("credential.access_id", "id"),
            ("credential.access_key", "key"),
        ]));

        let connection = resolver.resolve(None).unwrap();
        assert_eq!(connection.region(), "us-east-1");
        assert!(!connection.arn().contains("dummies"));
    }

    #[test]
    fn test_resolve_without_connection_fails() {
        let resolver = AwsConnectionResolver::new();
        let err = resolver.resolve(None).unwrap_err();
        assert_eq!(err.code, "NO_AWS_CONNECTION");
    }
}
