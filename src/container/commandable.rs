use crate::container::LambdaFunction;
use crate::refer::Descriptor;
use crate::services::CommandableRegistration;

/// Lambda function exposing each command of its `controller` dependency
/// as an action named after the command, with no prefix. Instrumented as
/// `<function name>.<command>`.
pub type CommandableLambdaFunction = LambdaFunction<CommandableRegistration>;

impl LambdaFunction<CommandableRegistration> {
    pub fn commandable(name: &str, description: &str, controller: Descriptor) -> Self {
        LambdaFunction::new(name, description, CommandableRegistration)
            .with_dependency("controller", controller)
    }
}
