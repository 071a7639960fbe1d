pub mod commandable;
pub mod convert;
pub mod lambda;

pub use commandable::CommandableLambdaClient;
pub use convert::convert_command_result;
pub use lambda::LambdaClient;
