use std::env;
use std::path::Path;
use std::sync::Arc;

use lambda_runtime::{Error, LambdaEvent};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::commands::Parameters;
use crate::config::ConfigParams;
use crate::count::CompositeCounters;
use crate::errors::ApplicationError;
use crate::instrument::{instrument, InstrumentTiming};
use crate::refer::{DependencyResolver, Descriptor, References};
use crate::services::{ActionRegistry, LambdaAction, LambdaActions, Registerable, RegistrationContext};

pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "./config/config.json";

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
enum Lifecycle {
    Created,
    Opened,
    Closed,
}

struct FunctionState {
    lifecycle: Lifecycle,
    config: ConfigParams,
    references: References,
    registry: Arc<ActionRegistry>,
    dependency_resolver: DependencyResolver,
    counters: CompositeCounters,
    registered: bool,
}

/// Lambda function container: hosts the actions added by its registration
/// step plus the actions of every Lambda service found in its references
/// (`*:service:lambda:*:*`), and routes invocations to them by `cmd`.
///
/// The first invocation runs the function when it was not started
/// explicitly: configuration is read from the JSON file named by
/// `CONFIG_PATH` (default `./config/config.json`, optional) merged with
/// the environment.
///
/// ### Configuration parameters
///
/// - `dependencies.*`: overrides for dependency locators
pub struct LambdaFunction<R: Registerable> {
    name: String,
    description: String,
    config_path: Option<String>,
    registration: R,
    state: Mutex<FunctionState>,
}

impl<R: Registerable> LambdaFunction<R> {
    pub fn new(name: &str, description: &str, registration: R) -> Self {
        LambdaFunction {
            name: name.to_string(),
            description: description.to_string(),
            config_path: None,
            registration,
            state: Mutex::new(FunctionState {
                lifecycle: Lifecycle::Created,
                config: ConfigParams::new(),
                references: References::new(),
                registry: Arc::new(ActionRegistry::new()),
                dependency_resolver: DependencyResolver::new(),
                counters: CompositeCounters::new(),
                registered: false,
            }),
        }
    }

    /// Default locator of a named dependency.
    pub fn with_dependency(mut self, name: &str, locator: Descriptor) -> Self {
        self.state.get_mut().dependency_resolver.put(name, locator);
        self
    }

    /// Configuration file read by [`run`](Self::run) unless `CONFIG_PATH` is set.
    pub fn with_config_path(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn configure(&mut self, config: &ConfigParams) -> Result<(), ApplicationError> {
        configure_state(self.state.get_mut(), config)
    }

    /// Wires counters and dependencies, then registers the actions anew.
    pub fn set_references(&mut self, references: &References) -> Result<(), ApplicationError> {
        let state = self.state.get_mut();
        state.counters.set_references(references);
        state.dependency_resolver.set_references(references);
        state.references = references.clone();

        let name = self.name.clone();
        register(&name, &self.registration, state)
    }

    pub async fn is_open(&self) -> bool {
        self.state.lock().await.lifecycle == Lifecycle::Opened
    }

    pub async fn open(&self, correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        let mut state = self.state.lock().await;
        self.open_state(&mut state, correlation_id)
    }

    /// Discards all actions. A closed function cannot be opened again.
    pub async fn close(&self, correlation_id: Option<&str>) -> Result<(), ApplicationError> {
        let mut state = self.state.lock().await;
        if state.lifecycle == Lifecycle::Closed {
            return Ok(());
        }

        state.lifecycle = Lifecycle::Closed;
        state.registry = Arc::new(ActionRegistry::new());
        state.registered = false;
        info!(
            correlation_id = correlation_id.unwrap_or_default(),
            "Function {} closed", self.name
        );
        Ok(())
    }

    /// Reads the configuration, applies it and opens the function.
    /// Does nothing when the function is already open.
    pub async fn run(&self) -> Result<(), ApplicationError> {
        let mut state = self.state.lock().await;
        self.run_state(&mut state)
    }

    pub async fn get_actions(&self) -> Vec<LambdaAction> {
        self.state.lock().await.registry.get_actions().to_vec()
    }

    pub async fn instrument(&self, correlation_id: Option<&str>, name: &str) -> InstrumentTiming {
        let counters = self.state.lock().await.counters.clone();
        instrument(&counters, correlation_id, name)
    }

    /// Calls an action the way an invocation does and returns the result
    /// serialized to JSON.
    pub async fn act(&self, params: Parameters) -> Result<String, ApplicationError> {
        let result = self.execute(params).await?;
        Ok(serde_json::to_string(&result)?)
    }

    /// Entry point for `lambda_runtime`. Failures are logged and returned
    /// as the JSON-serialized error.
    pub async fn handler(&self, event: LambdaEvent<Value>) -> Result<Value, Error> {
        debug!(
            request_id = event.context.request_id.as_str(),
            "Handling lambda invocation"
        );

        let params = match event.payload {
            Value::Object(params) => params,
            _ => Parameters::new(),
        };

        self.execute(params).await.map_err(|err| {
            error!(
                correlation_id = err.correlation_id.as_deref().unwrap_or_default(),
                "Invocation of {} failed: {}", self.name, err
            );
            err.to_json().into()
        })
    }

    async fn execute(&self, params: Parameters) -> Result<Value, ApplicationError> {
        let registry = {
            let mut state = self.state.lock().await;
            if state.lifecycle != Lifecycle::Opened {
                self.run_state(&mut state)?;
            }
            state.registry.clone()
        };
        registry.dispatch(params).await
    }

    fn run_state(&self, state: &mut FunctionState) -> Result<(), ApplicationError> {
        if state.lifecycle == Lifecycle::Opened {
            return Ok(());
        }
        self.check_not_closed(state, Some(&self.name))?;

        let config = self.read_config()?.merge(&state.config);
        configure_state(state, &config)?;
        // dependency locators may have changed
        state.registered = false;
        self.open_state(state, Some(&self.name))
    }

    fn open_state(
        &self,
        state: &mut FunctionState,
        correlation_id: Option<&str>,
    ) -> Result<(), ApplicationError> {
        if state.lifecycle == Lifecycle::Opened {
            return Ok(());
        }
        self.check_not_closed(state, correlation_id)?;

        if !state.registered {
            register(&self.name, &self.registration, state)?;
        }
        state.lifecycle = Lifecycle::Opened;
        info!(
            correlation_id = correlation_id.unwrap_or_default(),
            "Function {} started with {} actions",
            self.name,
            state.registry.len()
        );
        Ok(())
    }

    fn check_not_closed(
        &self,
        state: &FunctionState,
        correlation_id: Option<&str>,
    ) -> Result<(), ApplicationError> {
        if state.lifecycle == Lifecycle::Closed {
            return Err(ApplicationError::invalid_state(
                correlation_id,
                "NOT_OPENED",
                format!("Function {} was closed", self.name),
            ));
        }
        Ok(())
    }

    fn read_config(&self) -> Result<ConfigParams, ApplicationError> {
        let path = env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|path| !path.is_empty())
            .or_else(|| self.config_path.clone());

        let file_config = match path {
            Some(path) => ConfigParams::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                ConfigParams::from_file(DEFAULT_CONFIG_PATH)?
            }
            None => ConfigParams::new(),
        };
        Ok(file_config.merge(&ConfigParams::from_env()))
    }
}

fn configure_state(state: &mut FunctionState, config: &ConfigParams) -> Result<(), ApplicationError> {
    state.dependency_resolver.configure(config)?;
    state.config = state.config.merge(config);
    Ok(())
}

fn register<R: Registerable>(
    name: &str,
    registration: &R,
    state: &mut FunctionState,
) -> Result<(), ApplicationError> {
    state.registry = Arc::new(ActionRegistry::new());
    state.registered = false;

    let mut registry = ActionRegistry::new();
    let mut context = RegistrationContext {
        name,
        registry: &mut registry,
        dependency_resolver: &state.dependency_resolver,
        counters: &state.counters,
    };
    registration.register(&mut context)?;

    let services: Vec<Arc<dyn LambdaActions>> = state
        .references
        .get_optional(&Descriptor::new("*", "service", "lambda", "*", "*"));
    for service in services {
        for action in service.get_actions() {
            registry.add_action(action)?;
        }
    }

    debug!("Registered {} actions of {} function", registry.len(), name);
    state.registry = Arc::new(registry);
    state.registered = true;
    Ok(())
}
