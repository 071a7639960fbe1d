use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::commands::Parameters;
use crate::count::CompositeCounters;
use crate::errors::ApplicationError;
use crate::refer::DependencyResolver;
use crate::validate::Schema;

pub mod commandable;
pub mod lambda;
pub mod registry;

pub use commandable::{register_command_set, CommandableLambdaService, CommandableRegistration};
pub use lambda::LambdaService;
pub use registry::{apply_interceptors, apply_validation, ActionRegistry};

pub type ActionResult = BoxFuture<'static, Result<Value, ApplicationError>>;

/// Handler of one action: receives the whole request object.
pub type ActionHandler = Arc<dyn Fn(Parameters) -> ActionResult + Send + Sync>;

/// Cross-cutting wrapper around action handlers. Receives the request and
/// the continuation; may call it, post-process its result or skip it.
pub type Interceptor = Arc<dyn Fn(Parameters, ActionHandler) -> ActionResult + Send + Sync>;

/// Boxes an async closure into an [`ActionHandler`].
pub fn action_handler<F, Fut>(handler: F) -> ActionHandler
where
    F: Fn(Parameters) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ApplicationError>> + Send + 'static,
{
    Arc::new(move |params| -> ActionResult { Box::pin(handler(params)) })
}

/// Boxes an async closure into an [`Interceptor`].
pub fn interceptor<F, Fut>(interceptor: F) -> Interceptor
where
    F: Fn(Parameters, ActionHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ApplicationError>> + Send + 'static,
{
    Arc::new(move |params, next| -> ActionResult { Box::pin(interceptor(params, next)) })
}

/// A registered action: the command it answers to, its schema and the
/// fully wrapped handler.
#[derive(Clone)]
pub struct LambdaAction {
    pub cmd: String,
    pub schema: Option<Arc<dyn Schema>>,
    pub action: ActionHandler,
}

impl fmt::Debug for LambdaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LambdaAction")
            .field("cmd", &self.cmd)
            .field("schema", &self.schema.is_some())
            .finish()
    }
}

/// Component that exposes actions to be hosted by a Lambda function.
pub trait LambdaActions: Send + Sync {
    fn get_actions(&self) -> Vec<LambdaAction>;
}

/// What a component's registration step works with: its registry and
/// the dependencies and counters wired by `set_references`.
pub struct RegistrationContext<'a> {
    pub name: &'a str,
    pub registry: &'a mut ActionRegistry,
    pub dependency_resolver: &'a DependencyResolver,
    pub counters: &'a CompositeCounters,
}

/// Registration step of a service or function: adds its actions and
/// interceptors once its dependencies are wired.
pub trait Registerable: Send + Sync {
    fn register(&self, context: &mut RegistrationContext<'_>) -> Result<(), ApplicationError>;
}
