use std::sync::Arc;

use serde_json::Value;

use crate::commands::{CommandSet, Commandable};
use crate::count::CompositeCounters;
use crate::errors::ApplicationError;
use crate::instrument::instrument;
use crate::refer::Descriptor;
use crate::services::{ActionRegistry, LambdaService, Registerable, RegistrationContext};

/// Registers every command of `command_set` as an action of the same name.
/// Handlers drop `correlation_id` from the arguments, pass it separately
/// and are instrumented as `<owner>.<command>`.
pub fn register_command_set(
    registry: &mut ActionRegistry,
    counters: &CompositeCounters,
    owner: &str,
    command_set: &CommandSet,
) -> Result<(), ApplicationError> {
    for command in command_set.get_commands() {
        let name = command.name().to_string();
        let method = format!("{}.{}", owner, name);
        let command = command.clone();
        let counters = counters.clone();

        registry.register_action(&name, None, move |mut params| {
            let command = command.clone();
            let counters = counters.clone();
            let method = method.clone();
            async move {
                let correlation_id = params
                    .remove("correlation_id")
                    .and_then(|value| match value {
                        Value::String(id) => Some(id),
                        _ => None,
                    });

                let timing = instrument(&counters, correlation_id.as_deref(), &method);
                let result = command.execute(correlation_id.as_deref(), params).await;
                timing.end(result)
            }
        })?;
    }
    Ok(())
}

/// Registers the command set of the `controller` dependency.
pub struct CommandableRegistration;

impl Registerable for CommandableRegistration {
    fn register(&self, context: &mut RegistrationContext<'_>) -> Result<(), ApplicationError> {
        let controller: Arc<dyn Commandable> =
            context.dependency_resolver.get_one_required("controller")?;
        let command_set = controller.get_command_set();
        register_command_set(context.registry, context.counters, context.name, &command_set)
    }
}

/// Lambda service exposing a controller's commands as `<name>.<command>`
/// actions. The controller is put into references as `Arc<dyn Commandable>`.
pub type CommandableLambdaService = LambdaService<CommandableRegistration>;

impl LambdaService<CommandableRegistration> {
    pub fn commandable(name: &str, controller: Descriptor) -> Self {
        LambdaService::new(name, CommandableRegistration).with_dependency("controller", controller)
    }
}
