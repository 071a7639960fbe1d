pub mod commandable;
pub mod lambda;

pub use commandable::CommandableLambdaFunction;
pub use lambda::LambdaFunction;
pub use crate::services::Registerable;
