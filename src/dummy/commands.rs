use std::sync::Arc;

use serde_json::Value;

use crate::commands::{ClosureCommand, CommandSet, Parameters};
use crate::dummy::{dummy_schema, Dummy, DummyController, FilterParams, PagingParams};
use crate::errors::ApplicationError;
use crate::validate::{FilterParamsSchema, ObjectSchema, PagingParamsSchema, TypeCode};

/// Commands of [`DummyController`]: `get_dummies`, `get_dummy_by_id`,
/// `create_dummy`, `update_dummy` and `delete_dummy`.
pub struct DummyCommandSet {
    commands: CommandSet,
}

impl DummyCommandSet {
    pub fn new(controller: DummyController) -> Self {
        let mut commands = CommandSet::new();
        commands.add_command(get_page_by_filter_command(controller.clone()));
        commands.add_command(get_one_by_id_command(controller.clone()));
        commands.add_command(create_command(controller.clone()));
        commands.add_command(update_command(controller.clone()));
        commands.add_command(delete_by_id_command(controller));
        DummyCommandSet { commands }
    }
}

impl From<DummyCommandSet> for CommandSet {
    fn from(set: DummyCommandSet) -> Self {
        set.commands
    }
}

fn get_page_by_filter_command(controller: DummyController) -> ClosureCommand {
    ClosureCommand::new(
        "get_dummies",
        Some(Arc::new(
            ObjectSchema::new()
                .allow_undefined(true)
                .with_optional_property("filter", FilterParamsSchema)
                .with_optional_property("paging", PagingParamsSchema),
        )),
        move |correlation_id, args| {
            let controller = controller.clone();
            async move {
                let filter = FilterParams::from_value(args.get("filter"));
                let paging = PagingParams::from_value(args.get("paging"));
                let page = controller.get_page_by_filter(correlation_id.as_deref(), &filter, &paging);
                serde_json::to_value(page).map_err(ApplicationError::from)
            }
        },
    )
}

fn get_one_by_id_command(controller: DummyController) -> ClosureCommand {
    ClosureCommand::new(
        "get_dummy_by_id",
        Some(Arc::new(
            ObjectSchema::new()
                .allow_undefined(true)
                .with_required_property("dummy_id", TypeCode::String),
        )),
        move |correlation_id, args| {
            let controller = controller.clone();
            async move {
                let id = args.get("dummy_id").and_then(Value::as_str).unwrap_or_default();
                let dummy = controller.get_one_by_id(correlation_id.as_deref(), id);
                serde_json::to_value(dummy).map_err(ApplicationError::from)
            }
        },
    )
}

fn create_command(controller: DummyController) -> ClosureCommand {
    ClosureCommand::new(
        "create_dummy",
        Some(Arc::new(
            ObjectSchema::new()
                .allow_undefined(true)
                .with_required_property("dummy", dummy_schema()),
        )),
        move |correlation_id, args| {
            let controller = controller.clone();
            async move {
                let dummy = dummy_arg(correlation_id.as_deref(), &args)?;
                let dummy = controller.create(correlation_id.as_deref(), dummy);
                serde_json::to_value(dummy).map_err(ApplicationError::from)
            }
        },
    )
}

fn update_command(controller: DummyController) -> ClosureCommand {
    ClosureCommand::new(
        "update_dummy",
        Some(Arc::new(
            ObjectSchema::new()
                .allow_undefined(true)
                .with_required_property("dummy", dummy_schema()),
        )),
        move |correlation_id, args| {
            let controller = controller.clone();
            async move {
                let dummy = dummy_arg(correlation_id.as_deref(), &args)?;
                let dummy = controller.update(correlation_id.as_deref(), dummy);
                serde_json::to_value(dummy).map_err(ApplicationError::from)
            }
        },
    )
}

fn delete_by_id_command(controller: DummyController) -> ClosureCommand {
    ClosureCommand::new(
        "delete_dummy",
        Some(Arc::new(
            ObjectSchema::new()
                .allow_undefined(true)
                .with_required_property("dummy_id", TypeCode::String),
        )),
        move |correlation_id, args| {
            let controller = controller.clone();
            async move {
                let id = args.get("dummy_id").and_then(Value::as_str).unwrap_or_default();
                let dummy = controller.delete_by_id(correlation_id.as_deref(), id);
                serde_json::to_value(dummy).map_err(ApplicationError::from)
            }
        },
    )
}

/// Reads the `dummy` argument.
pub(crate) fn dummy_arg(
    correlation_id: Option<&str>,
    args: &Parameters,
) -> Result<Dummy, ApplicationError> {
    let value = args.get("dummy").cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
        ApplicationError::bad_request(correlation_id, "INVALID_DATA", "Invalid dummy")
            .with_cause(e)
    })
}
