use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::errors::ApplicationError;
use crate::validate::Schema;

/// Argument bag of a command or action: the parsed JSON request object.
pub type Parameters = Map<String, Value>;

/// A named operation exposed by a commandable component.
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(
        &self,
        correlation_id: Option<&str>,
        args: Parameters,
    ) -> Result<Value, ApplicationError>;
}

type CommandFn =
    dyn Fn(Option<String>, Parameters) -> BoxFuture<'static, Result<Value, ApplicationError>>
        + Send
        + Sync;

/// Command backed by an async closure. Arguments are checked against the
/// schema, when one is set, before the closure runs.
pub struct ClosureCommand {
    name: String,
    schema: Option<Arc<dyn Schema>>,
    function: Box<CommandFn>,
}

impl ClosureCommand {
    pub fn new<F, Fut>(name: &str, schema: Option<Arc<dyn Schema>>, function: F) -> Self
    where
        F: Fn(Option<String>, Parameters) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApplicationError>> + Send + 'static,
    {
        ClosureCommand {
            name: name.to_string(),
            schema,
            function: Box::new(move |correlation_id, args| -> BoxFuture<'static, _> {
                Box::pin(function(correlation_id, args))
            }),
        }
    }
}

#[async_trait]
impl Command for ClosureCommand {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        correlation_id: Option<&str>,
        args: Parameters,
    ) -> Result<Value, ApplicationError> {
        if let Some(schema) = &self.schema {
            schema.validate_and_return_error(correlation_id, &Value::Object(args.clone()), false)?;
        }

        (self.function)(correlation_id.map(str::to_string), args).await
    }
}

/// Ordered set of commands.
#[derive(Clone, Default)]
pub struct CommandSet {
    commands: Vec<Arc<dyn Command>>,
}

impl CommandSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_command(&mut self, command: impl Command + 'static) {
        self.commands.push(Arc::new(command));
    }

    pub fn add_command_set(&mut self, other: &CommandSet) {
        self.commands.extend(other.commands.iter().cloned());
    }

    pub fn get_commands(&self) -> &[Arc<dyn Command>] {
        &self.commands
    }

    pub fn find_command(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.iter().find(|c| c.name() == name).cloned()
    }
}

/// Component that exposes its operations as a command set.
pub trait Commandable: Send + Sync {
    fn get_command_set(&self) -> CommandSet;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{ObjectSchema, TypeCode};
    use serde_json::json;

    fn echo_command() -> ClosureCommand {
        ClosureCommand::new(
            "echo",
            Some(Arc::new(
                ObjectSchema::new().with_required_property("text", TypeCode::String),
            )),
            |correlation_id, args| async move {
                Ok(json!({
                    "correlation_id": correlation_id,
                    "text": args.get("text").cloned().unwrap_or(Value::Null),
                }))
            },
        )
    }

    #[tokio::test]
    async fn test_closure_command_executes() {
        let command = echo_command();
        let mut args = Parameters::new();
        args.insert("text".to_string(), json!("hi"));

        let result = command.execute(Some("123"), args).await.unwrap();
        assert_eq!(result, json!({"correlation_id": "123", "text": "hi"}));
    }

    #[tokio::test]
    async fn test_closure_command_validates_args() {
        let command = echo_command();
        let err = command.execute(None, Parameters::new()).await.unwrap_err();
        assert_eq!(err.code, "INVALID_DATA");
    }

    #[test]
    fn test_command_set_lookup_keeps_order() {
        let mut set = CommandSet::new();
        set.add_command(echo_command());
        set.add_command(ClosureCommand::new("noop", None, |_, _| async { Ok(Value::Null) }));

        let names: Vec<&str> = set.get_commands().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["echo", "noop"]);
        assert!(set.find_command("noop").is_some());
        assert!(set.find_command("missing").is_none());
    }
}
