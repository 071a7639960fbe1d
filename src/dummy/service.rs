use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::commands::Parameters;
use crate::container::LambdaFunction;
use crate::count::CompositeCounters;
use crate::dummy::commands::dummy_arg;
use crate::dummy::{controller_descriptor, dummy_schema, DummyController, FilterParams, PagingParams};
use crate::errors::ApplicationError;
use crate::instrument::instrument;
use crate::services::{LambdaService, Registerable, RegistrationContext};
use crate::validate::{FilterParamsSchema, ObjectSchema, PagingParamsSchema, Schema, TypeCode};

/// Hand-written actions over the `controller` dependency, shared by
/// [`DummyLambdaService`] and [`DummyLambdaFunction`].
pub struct DummyRegistration;

pub type DummyLambdaService = LambdaService<DummyRegistration>;
pub type DummyLambdaFunction = LambdaFunction<DummyRegistration>;

impl LambdaService<DummyRegistration> {
    /// Service named `dummies`: its actions are `dummies.<action>`.
    pub fn dummies() -> Self {
        LambdaService::new("dummies", DummyRegistration)
            .with_dependency("controller", controller_descriptor())
    }
}

impl LambdaFunction<DummyRegistration> {
    pub fn dummies() -> Self {
        LambdaFunction::new("dummies", "Dummy lambda function", DummyRegistration)
            .with_dependency("controller", controller_descriptor())
    }
}

fn correlation_id_of(params: &Parameters) -> Option<String> {
    params
        .get("correlation_id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn id_schema() -> Arc<dyn Schema> {
    Arc::new(
        ObjectSchema::new()
            .allow_undefined(true)
            .with_required_property("dummy_id", TypeCode::String),
    )
}

fn dummy_body_schema() -> Arc<dyn Schema> {
    Arc::new(
        ObjectSchema::new()
            .allow_undefined(true)
            .with_required_property("dummy", dummy_schema()),
    )
}

/// Registers `name` running `action` against the controller, instrumented
/// as `<owner>.<name>`.
fn register_action<F, T>(
    context: &mut RegistrationContext<'_>,
    controller: &DummyController,
    name: &str,
    schema: Arc<dyn Schema>,
    action: F,
) -> Result<(), ApplicationError>
where
    F: Fn(&DummyController, Option<&str>, &Parameters) -> Result<T, ApplicationError>
        + Send
        + Sync
        + 'static,
    T: Serialize,
{
    let controller = controller.clone();
    let counters: CompositeCounters = context.counters.clone();
    let method = format!("{}.{}", context.name, name);

    context.registry.register_action(name, Some(schema), move |params| {
        let correlation_id = correlation_id_of(&params);
        let timing = instrument(&counters, correlation_id.as_deref(), &method);
        let result = action(&controller, correlation_id.as_deref(), &params)
            .and_then(|value| serde_json::to_value(value).map_err(ApplicationError::from));
        futures::future::ready(timing.end(result))
    })
}

impl Registerable for DummyRegistration {
    fn register(&self, context: &mut RegistrationContext<'_>) -> Result<(), ApplicationError> {
        let controller: DummyController = context.dependency_resolver.get_one_required("controller")?;

        register_action(
            context,
            &controller,
            "get_dummies",
            Arc::new(
                ObjectSchema::new()
                    .allow_undefined(true)
                    .with_optional_property("filter", FilterParamsSchema)
                    .with_optional_property("paging", PagingParamsSchema),
            ),
            |controller, correlation_id, params| {
                Ok(controller.get_page_by_filter(
                    correlation_id,
                    &FilterParams::from_value(params.get("filter")),
                    &PagingParams::from_value(params.get("paging")),
                ))
            },
        )?;

        register_action(
            context,
            &controller,
            "get_dummy_by_id",
            id_schema(),
            |controller, correlation_id, params| {
                let id = params.get("dummy_id").and_then(Value::as_str).unwrap_or_default();
                Ok(controller.get_one_by_id(correlation_id, id))
            },
        )?;

        register_action(
            context,
            &controller,
            "create_dummy",
            dummy_body_schema(),
            |controller, correlation_id, params| {
                let dummy = dummy_arg(correlation_id, params)?;
                Ok(controller.create(correlation_id, dummy))
            },
        )?;

        register_action(
            context,
            &controller,
            "update_dummy",
            dummy_body_schema(),
            |controller, correlation_id, params| {
                let dummy = dummy_arg(correlation_id, params)?;
                Ok(controller.update(correlation_id, dummy))
            },
        )?;

        register_action(
            context,
            &controller,
            "delete_dummy",
            id_schema(),
            |controller, correlation_id, params| {
                let id = params.get("dummy_id").and_then(Value::as_str).unwrap_or_default();
                Ok(controller.delete_by_id(correlation_id, id))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::dummy_references;
    use serde_json::json;

    fn params(value: Value) -> Parameters {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[tokio::test]
    async fn test_service_actions_are_prefixed() {
        let mut service = DummyLambdaService::dummies();
        service.set_references(&dummy_references(DummyController::new())).unwrap();
        service.open(None).await.unwrap();

        let cmds: Vec<String> = service.registry().get_actions().iter().map(|a| a.cmd.clone()).collect();
        assert_eq!(
            cmds,
            vec![
                "dummies.get_dummies",
                "dummies.get_dummy_by_id",
                "dummies.create_dummy",
                "dummies.update_dummy",
                "dummies.delete_dummy"
            ]
        );

        let created = service
            .act(params(json!({
                "cmd": "dummies.create_dummy",
                "dummy": {"key": "K1", "content": "C1"}
            })))
            .await
            .unwrap();
        assert_eq!(created["key"], "K1");

        let err = service
            .act(params(json!({"cmd": "dummies.get_dummy_by_id", "correlation_id": "123"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, "INVALID_DATA");
        assert_eq!(err.correlation_id.as_deref(), Some("123"));
    }
}
