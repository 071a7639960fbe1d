use serde_json::Value;
use tracing::debug;

use crate::commands::Parameters;
use crate::config::ConfigParams;
use crate::count::CompositeCounters;
use crate::errors::ApplicationError;
use crate::instrument::{instrument, InstrumentTiming};
use crate::refer::{DependencyResolver, Descriptor, References};
use crate::services::{ActionRegistry, LambdaAction, LambdaActions, Registerable, RegistrationContext};

/// Set of actions named `<name>.<action>` that a Lambda function hosts
/// next to its own actions, or that is called directly with [`act`](Self::act).
///
/// ### Configuration parameters
///
/// - `dependencies.*`: overrides for dependency locators
pub struct LambdaService<R: Registerable> {
    name: String,
    registration: R,
    registry: ActionRegistry,
    dependency_resolver: DependencyResolver,
    counters: CompositeCounters,
    registered: bool,
    opened: bool,
}

impl<R: Registerable> LambdaService<R> {
    pub fn new(name: &str, registration: R) -> Self {
        LambdaService {
            name: name.to_string(),
            registration,
            registry: ActionRegistry::with_prefix(name),
            dependency_resolver: DependencyResolver::new(),
            counters: CompositeCounters::new(),
            registered: false,
            opened: false,
        }
    }

    /// Default locator of a named dependency.
    pub fn with_dependency(mut self, name: &str, locator: Descriptor) -> Self {
        self.dependency_resolver.put(name, locator);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registration(&self) -> &R {
        &self.registration
    }

    pub fn configure(&mut self, config: &ConfigParams) -> Result<(), ApplicationError> {
        self.dependency_resolver.configure(config)
    }

    /// Wires counters and dependencies, then registers the actions anew.
    pub fn set_references(&mut self, references: &References) -> Result<(), ApplicationError> {
        self.counters.set_references(references);
        self.dependency_resolver.set_references(references);
        self.register()
    }

    fn register(&mut self) -> Result<(), ApplicationError> {
        self.registry.clear();
        self.registered = false;

        let mut context = RegistrationContext {
            name: &self.name,
            registry: &mut self.registry,
            dependency_resolver: &self.dependency_resolver,
            counters: &self.counters,
        };
        if let Err(err) = self.registration.register(&mut context) {
            self.registry.clear();
            return Err(err);
        }

        self.registered = true;
        debug!("Registered {} actions of {} service", self.registry.len(), self.name);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub async fn open(&mut self, correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        if self.opened {
            return Ok(());
        }
        if !self.registered {
            self.register()?;
        }
        self.opened = true;
        debug!(
            correlation_id = correlation_id.unwrap_or_default(),
            "Opened {} service", self.name
        );
        Ok(())
    }

    /// Drops all actions and interceptors.
    pub async fn close(&mut self, correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        if !self.opened {
            return Ok(());
        }
        self.opened = false;
        self.registered = false;
        self.registry.clear();
        debug!(
            correlation_id = correlation_id.unwrap_or_default(),
            "Closed {} service", self.name
        );
        Ok(())
    }

    pub fn instrument(&self, correlation_id: Option<&str>, name: &str) -> InstrumentTiming {
        instrument(&self.counters, correlation_id, name)
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Calls an action directly, e.g. from tests.
    pub async fn act(&self, params: Parameters) -> Result<Value, ApplicationError> {
        self.registry.dispatch(params).await
    }
}

impl<R: Registerable> LambdaActions for LambdaService<R> {
    fn get_actions(&self) -> Vec<LambdaAction> {
        self.registry.get_actions().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::interceptor;
    use serde_json::json;
    use std::sync::Arc;

    struct EchoRegistration;

    impl Registerable for EchoRegistration {
        fn register(&self, context: &mut RegistrationContext<'_>) -> Result<(), ApplicationError> {
            let greeting: Arc<String> = context.dependency_resolver.get_one_required("greeting")?;
            context.registry.register_interceptor(interceptor(|mut params, next| {
                params.insert("intercepted".to_string(), json!(true));
                next(params)
            }));
            context.registry.register_action("echo", None, move |params| {
                let greeting = greeting.clone();
                async move { Ok(json!({"greeting": greeting.as_str(), "params": params})) }
            })
        }
    }

    fn references() -> References {
        References::new().with(
            Descriptor::new("test", "greeting", "default", "default", "1.0"),
            Arc::new("hello".to_string()),
        )
    }

    fn service() -> LambdaService<EchoRegistration> {
        LambdaService::new("echo_service", EchoRegistration)
            .with_dependency("greeting", Descriptor::new("test", "greeting", "*", "*", "*"))
    }

    #[tokio::test]
    async fn test_actions_are_prefixed_and_intercepted() {
        let mut service = service();
        service.set_references(&references()).unwrap();
        service.open(None).await.unwrap();

        let cmds: Vec<String> = service.get_actions().into_iter().map(|a| a.cmd).collect();
        assert_eq!(cmds, vec!["echo_service.echo"]);

        let mut params = Parameters::new();
        params.insert("cmd".to_string(), json!("echo_service.echo"));
        let result = service.act(params).await.unwrap();
        assert_eq!(result["greeting"], "hello");
        assert_eq!(result["params"]["intercepted"], true);
    }

    #[tokio::test]
    async fn test_missing_dependency_leaves_no_actions() {
        let mut service = service();
        let err = service.set_references(&References::new()).unwrap_err();
        assert_eq!(err.code, "REF_ERROR");
        assert!(service.get_actions().is_empty());

        let err = service.open(None).await.unwrap_err();
        assert_eq!(err.code, "REF_ERROR");
        assert!(!service.is_open());
    }

    #[tokio::test]
    async fn test_open_and_close_are_idempotent() {
        let mut service = service();
        service.set_references(&references()).unwrap();

        service.open(None).await.unwrap();
        service.open(None).await.unwrap();
        assert_eq!(service.get_actions().len(), 1);

        service.close(None).await.unwrap();
        service.close(None).await.unwrap();
        assert!(!service.is_open());
        assert!(service.get_actions().is_empty());
    }
}
