use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::commands::Parameters;
use crate::errors::ApplicationError;
use crate::services::{action_handler, ActionHandler, ActionResult, Interceptor, LambdaAction};
use crate::validate::Schema;

/// Table of actions keyed by command, kept in registration order.
///
/// Handlers are wrapped when they are registered: validation first, then
/// the interceptors registered so far, the first of them outermost.
/// Registering a command twice is a configuration error.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    prefix: Option<String>,
    actions: Vec<LambdaAction>,
    index: HashMap<String, usize>,
    interceptors: Vec<Interceptor>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose commands are named `<prefix>.<name>`.
    pub fn with_prefix(prefix: &str) -> Self {
        ActionRegistry {
            prefix: Some(prefix.to_string()).filter(|p| !p.is_empty()),
            ..Self::default()
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn generate_action_cmd(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.to_string(),
        }
    }

    pub fn register_action<F, Fut>(
        &mut self,
        name: &str,
        schema: Option<Arc<dyn Schema>>,
        handler: F,
    ) -> Result<(), ApplicationError>
    where
        F: Fn(Parameters) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ApplicationError>> + Send + 'static,
    {
        self.register_action_handler(name, schema, action_handler(handler))
    }

    pub fn register_action_handler(
        &mut self,
        name: &str,
        schema: Option<Arc<dyn Schema>>,
        handler: ActionHandler,
    ) -> Result<(), ApplicationError> {
        let cmd = self.checked_cmd(name)?;
        let action = apply_interceptors(&self.interceptors, apply_validation(schema.clone(), handler));
        self.push(LambdaAction { cmd, schema, action });
        Ok(())
    }

    /// Like [`register_action_handler`](Self::register_action_handler), with
    /// `authorize` placed right around the validated handler and inside
    /// the interceptor chain.
    pub fn register_action_with_auth(
        &mut self,
        name: &str,
        schema: Option<Arc<dyn Schema>>,
        authorize: Interceptor,
        handler: ActionHandler,
    ) -> Result<(), ApplicationError> {
        let cmd = self.checked_cmd(name)?;
        let validated = apply_validation(schema.clone(), handler);
        let authorized: ActionHandler =
            Arc::new(move |params| authorize(params, validated.clone()));
        let action = apply_interceptors(&self.interceptors, authorized);
        self.push(LambdaAction { cmd, schema, action });
        Ok(())
    }

    /// Applies to actions registered after this call.
    pub fn register_interceptor(&mut self, interceptor: Interceptor) {
        self.interceptors.push(interceptor);
    }

    /// Adds an already wrapped action as is, e.g. one hosted from a service.
    pub fn add_action(&mut self, action: LambdaAction) -> Result<(), ApplicationError> {
        if action.cmd.is_empty() {
            return Err(ApplicationError::config(None, "NO_COMMAND", "Missing action name"));
        }
        self.check_duplicate(&action.cmd)?;
        self.push(action);
        Ok(())
    }

    fn checked_cmd(&self, name: &str) -> Result<String, ApplicationError> {
        if name.is_empty() {
            return Err(ApplicationError::config(None, "NO_COMMAND", "Missing action name"));
        }
        let cmd = self.generate_action_cmd(name);
        self.check_duplicate(&cmd)?;
        Ok(cmd)
    }

    fn check_duplicate(&self, cmd: &str) -> Result<(), ApplicationError> {
        if self.index.contains_key(cmd) {
            return Err(ApplicationError::config(
                None,
                "DUPLICATE_ACTION",
                format!("Action {} is already registered", cmd),
            )
            .with_details("command", cmd));
        }
        Ok(())
    }

    fn push(&mut self, action: LambdaAction) {
        self.index.insert(action.cmd.clone(), self.actions.len());
        self.actions.push(action);
    }

    pub fn get_actions(&self) -> &[LambdaAction] {
        &self.actions
    }

    pub fn find(&self, cmd: &str) -> Option<&LambdaAction> {
        self.index.get(cmd).map(|&i| &self.actions[i])
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Drops all actions and interceptors.
    pub fn clear(&mut self) {
        self.actions.clear();
        self.index.clear();
        self.interceptors.clear();
    }

    /// Runs the action selected by the request's `cmd` with the whole
    /// request as its parameters.
    pub async fn dispatch(&self, params: Parameters) -> Result<Value, ApplicationError> {
        let correlation_id = params
            .get("correlation_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let cmd = params
            .get("cmd")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if cmd.is_empty() {
            return Err(ApplicationError::bad_request(
                correlation_id.as_deref(),
                "NO_COMMAND",
                "Cmd parameter is missing",
            ));
        }

        let Some(action) = self.find(&cmd) else {
            return Err(ApplicationError::bad_request(
                correlation_id.as_deref(),
                "NO_ACTION",
                format!("Action {} was not found", cmd),
            )
            .with_details("command", &cmd));
        };

        let handler = action.action.clone();
        handler(params).await
    }
}

/// Wraps `handler` so requests failing `schema` are rejected before it runs.
pub fn apply_validation(schema: Option<Arc<dyn Schema>>, handler: ActionHandler) -> ActionHandler {
    let Some(schema) = schema else {
        return handler;
    };

    Arc::new(move |params: Parameters| -> ActionResult {
        let correlation_id = params.get("correlation_id").and_then(Value::as_str);
        let value = Value::Object(params.clone());
        match schema.validate_and_return_error(correlation_id, &value, false) {
            Ok(()) => handler(params),
            Err(err) => Box::pin(async move { Err(err) }),
        }
    })
}

/// Composes `[i1, .., iN]` around `handler` as `i1(p, i2(p, .. iN(p, handler)))`.
pub fn apply_interceptors(interceptors: &[Interceptor], handler: ActionHandler) -> ActionHandler {
    interceptors
        .iter()
        .rev()
        .fold(handler, |next: ActionHandler, interceptor| -> ActionHandler {
            let interceptor = interceptor.clone();
            Arc::new(move |params| interceptor(params, next.clone()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::interceptor;
    use crate::validate::{ObjectSchema, TypeCode};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn params(value: Value) -> Parameters {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Interceptor {
        let log = log.clone();
        interceptor(move |params, next| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("{} before", name));
                let result = next(params).await;
                log.lock().unwrap().push(format!("{} after", name));
                result
            }
        })
    }

    #[tokio::test]
    async fn test_dispatch_selects_action() {
        let mut registry = ActionRegistry::with_prefix("dummies");
        registry
            .register_action("one", None, |_| async { Ok(json!(1)) })
            .unwrap();
        registry
            .register_action("two", None, |_| async { Ok(json!(2)) })
            .unwrap();

        let cmds: Vec<&str> = registry.get_actions().iter().map(|a| a.cmd.as_str()).collect();
        assert_eq!(cmds, vec!["dummies.one", "dummies.two"]);

        let result = registry
            .dispatch(params(json!({"cmd": "dummies.two"})))
            .await
            .unwrap();
        assert_eq!(result, json!(2));
    }

    #[tokio::test]
    async fn test_missing_and_unknown_command() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ActionRegistry::new();
        let counter = calls.clone();
        registry
            .register_action("one", None, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(Value::Null) }
            })
            .unwrap();

        let err = registry
            .dispatch(params(json!({"correlation_id": "123"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, "NO_COMMAND");
        assert_eq!(err.correlation_id.as_deref(), Some("123"));

        let err = registry.dispatch(params(json!({"cmd": ""}))).await.unwrap_err();
        assert_eq!(err.code, "NO_COMMAND");

        let err = registry
            .dispatch(params(json!({"cmd": "three"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, "NO_ACTION");
        assert_eq!(err.details.get("command").map(String::as_str), Some("three"));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_interceptor_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ActionRegistry::new();
        registry.register_interceptor(recording(&log, "A"));
        registry.register_interceptor(recording(&log, "B"));

        let handler_log = log.clone();
        registry
            .register_action("x", None, move |_| {
                handler_log.lock().unwrap().push("X".to_string());
                async { Ok(Value::Null) }
            })
            .unwrap();

        registry.dispatch(params(json!({"cmd": "x"}))).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["A before", "B before", "X", "B after", "A after"]
        );
    }

    #[tokio::test]
    async fn test_interceptor_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ActionRegistry::new();
        registry.register_interceptor(interceptor(|params, _next| async move {
            Err(ApplicationError::unauthorized(
                params.get("correlation_id").and_then(Value::as_str),
                "DENIED",
                "Access denied",
            ))
        }));
        let inner_calls = calls.clone();
        registry.register_interceptor(interceptor(move |params, next| {
            inner_calls.fetch_add(1, Ordering::SeqCst);
            next(params)
        }));
        let counter = calls.clone();
        registry
            .register_action("x", None, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(Value::Null) }
            })
            .unwrap();

        let err = registry.dispatch(params(json!({"cmd": "x"}))).await.unwrap_err();
        assert_eq!(err.code, "DENIED");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_interceptors_snapshot_at_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ActionRegistry::new();
        registry
            .register_action("early", None, |_| async { Ok(Value::Null) })
            .unwrap();
        registry.register_interceptor(recording(&log, "A"));

        registry.dispatch(params(json!({"cmd": "early"}))).await.unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_before_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ActionRegistry::new();
        let counter = calls.clone();
        registry
            .register_action(
                "create",
                Some(Arc::new(
                    ObjectSchema::new().with_required_property("key", TypeCode::String),
                )),
                move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(Value::Null) }
                },
            )
            .unwrap();

        let err = registry
            .dispatch(params(json!({"cmd": "create", "correlation_id": "123", "key": 5})))
            .await
            .unwrap_err();
        assert_eq!(err.code, "INVALID_DATA");
        assert_eq!(err.correlation_id.as_deref(), Some("123"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        registry
            .dispatch(params(json!({"cmd": "create", "key": "k"})))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_runs_inside_interceptors_after_validation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ActionRegistry::new();
        registry.register_interceptor(recording(&log, "trace"));

        let auth_log = log.clone();
        let authorize = interceptor(move |params, next| {
            auth_log.lock().unwrap().push("auth".to_string());
            next(params)
        });
        registry
            .register_action_with_auth(
                "secure",
                Some(Arc::new(
                    ObjectSchema::new().with_required_property("id", TypeCode::String),
                )),
                authorize,
                action_handler(|_| async { Ok(json!("ok")) }),
            )
            .unwrap();

        let result = registry
            .dispatch(params(json!({"cmd": "secure", "id": "1"})))
            .await
            .unwrap();
        assert_eq!(result, json!("ok"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["trace before", "auth", "trace after"]
        );

        // validation failures still pass through the authorization step
        log.lock().unwrap().clear();
        let err = registry
            .dispatch(params(json!({"cmd": "secure"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, "INVALID_DATA");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["trace before", "auth", "trace after"]
        );
    }

    #[test]
    fn test_registration_errors() {
        let mut registry = ActionRegistry::with_prefix("dummies");
        let err = registry
            .register_action("", None, |_| async { Ok(Value::Null) })
            .unwrap_err();
        assert_eq!(err.code, "NO_COMMAND");

        registry
            .register_action("get", None, |_| async { Ok(Value::Null) })
            .unwrap();
        let err = registry
            .register_action("get", None, |_| async { Ok(Value::Null) })
            .unwrap_err();
        assert_eq!(err.code, "DUPLICATE_ACTION");
        assert_eq!(err.details.get("command").map(String::as_str), Some("dummies.get"));
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.find("dummies.get").is_none());
    }
}
