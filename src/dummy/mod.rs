//! Sample in-memory `Dummy` component used by the binary and the tests to
//! exercise services, functions and clients end to end.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commands::Commandable;
use crate::refer::{Descriptor, References};
use crate::validate::{ObjectSchema, TypeCode};

pub mod client;
pub mod commands;
pub mod controller;
pub mod service;

pub use client::DummyLambdaClient;
pub use commands::DummyCommandSet;
pub use controller::DummyController;
pub use service::{DummyLambdaFunction, DummyLambdaService, DummyRegistration};

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
pub struct Dummy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub key: String,
    #[serde(default)]
    pub content: String,
}

impl Dummy {
    pub fn new(key: &str, content: &str) -> Self {
        Dummy {
            id: None,
            key: key.to_string(),
            content: content.to_string(),
        }
    }
}

pub fn dummy_schema() -> ObjectSchema {
    ObjectSchema::new()
        .with_optional_property("id", TypeCode::String)
        .with_required_property("key", TypeCode::String)
        .with_optional_property("content", TypeCode::String)
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct DataPage<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    pub data: Vec<T>,
}

/// Scalar filter values by name.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
pub struct FilterParams(BTreeMap<String, String>);

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    /// Reads a filter map; non-scalar values are skipped.
    pub fn from_value(value: Option<&Value>) -> Self {
        let mut filter = FilterParams::new();
        if let Some(Value::Object(map)) = value {
            for (key, item) in map {
                let text = match item {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => continue,
                };
                filter.0.insert(key.clone(), text);
            }
        }
        filter
    }

    pub fn get_as_nullable_string(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Default)]
pub struct PagingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<i64>,
    #[serde(default)]
    pub total: bool,
}

impl PagingParams {
    pub fn new(skip: Option<i64>, take: Option<i64>, total: bool) -> Self {
        PagingParams { skip, take, total }
    }

    pub fn from_value(value: Option<&Value>) -> Self {
        value
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    pub fn get_skip(&self, min_skip: i64) -> i64 {
        self.skip.unwrap_or(min_skip).max(min_skip)
    }

    pub fn get_take(&self, max_take: i64) -> i64 {
        self.take.map_or(max_take, |take| take.clamp(0, max_take))
    }
}

/// Locator the dummy services and functions resolve their controller with.
pub fn controller_descriptor() -> Descriptor {
    Descriptor::new("pip-services-dummies", "controller", "default", "*", "*")
}

/// References holding `controller` both as itself and as a commandable
/// component.
pub fn dummy_references(controller: DummyController) -> References {
    let locator = Descriptor::new("pip-services-dummies", "controller", "default", "default", "1.0");
    let commandable: Arc<dyn Commandable> = Arc::new(controller.clone());
    References::new()
        .with(locator.clone(), controller)
        .with(locator, commandable)
}
