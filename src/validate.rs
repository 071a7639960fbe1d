use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use serde_json::Value;

use crate::errors::ApplicationError;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ValidationResultType {
    Warning,
    Error,
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ValidationResult {
    pub path: String,
    pub kind: ValidationResultType,
    pub code: String,
    pub message: String,
}

impl ValidationResult {
    fn error(path: &str, code: &str, message: String) -> Self {
        ValidationResult {
            path: path.to_string(),
            kind: ValidationResultType::Error,
            code: code.to_string(),
            message,
        }
    }

    fn warning(path: &str, code: &str, message: String) -> Self {
        ValidationResult {
            path: path.to_string(),
            kind: ValidationResultType::Warning,
            code: code.to_string(),
            message,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum TypeCode {
    String,
    Integer,
    Float,
    Boolean,
    Map,
    Array,
    Any,
}

impl TypeCode {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            TypeCode::String => value.is_string(),
            TypeCode::Integer => value.is_i64() || value.is_u64(),
            TypeCode::Float => value.is_number(),
            TypeCode::Boolean => value.is_boolean(),
            TypeCode::Map => value.is_object(),
            TypeCode::Array => value.is_array(),
            TypeCode::Any => true,
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Validation descriptor attached to an action or command.
pub trait Schema: Send + Sync {
    fn validate_at(&self, path: &str, value: &Value, results: &mut Vec<ValidationResult>);

    fn validate(&self, value: &Value) -> Vec<ValidationResult> {
        let mut results = Vec::new();
        self.validate_at("", value, &mut results);
        results
    }

    /// Errors fail validation; warnings fail it only when `strict`.
    fn validate_and_return_error(
        &self,
        correlation_id: Option<&str>,
        value: &Value,
        strict: bool,
    ) -> Result<(), ApplicationError> {
        let failures: Vec<ValidationResult> = self
            .validate(value)
            .into_iter()
            .filter(|r| strict || r.kind == ValidationResultType::Error)
            .collect();

        if failures.is_empty() {
            return Ok(());
        }

        let message = format!(
            "Validation failed: {}",
            failures.iter().map(|r| r.message.as_str()).join(", ")
        );
        let mut err = ApplicationError::bad_request(correlation_id, "INVALID_DATA", message);
        for failure in &failures {
            err = err.with_details(&failure.path, &failure.code);
        }
        Err(err)
    }
}

#[derive(Clone)]
pub enum PropertyType {
    Type(TypeCode),
    Schema(Arc<dyn Schema>),
}

impl From<TypeCode> for PropertyType {
    fn from(code: TypeCode) -> Self {
        PropertyType::Type(code)
    }
}

impl<S: Schema + 'static> From<S> for PropertyType {
    fn from(schema: S) -> Self {
        PropertyType::Schema(Arc::new(schema))
    }
}

#[derive(Clone)]
struct PropertySchema {
    name: String,
    required: bool,
    value_type: PropertyType,
}

/// Schema for JSON objects with named properties.
#[derive(Clone, Default)]
pub struct ObjectSchema {
    properties: Vec<PropertySchema>,
    allow_undefined: bool,
}

impl ObjectSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unknown properties are accepted silently instead of producing warnings.
    pub fn allow_undefined(mut self, allow: bool) -> Self {
        self.allow_undefined = allow;
        self
    }

    pub fn with_required_property(mut self, name: &str, value_type: impl Into<PropertyType>) -> Self {
        self.properties.push(PropertySchema {
            name: name.to_string(),
            required: true,
            value_type: value_type.into(),
        });
        self
    }

    pub fn with_optional_property(mut self, name: &str, value_type: impl Into<PropertyType>) -> Self {
        self.properties.push(PropertySchema {
            name: name.to_string(),
            required: false,
            value_type: value_type.into(),
        });
        self
    }
}

fn child_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

impl Schema for ObjectSchema {
    fn validate_at(&self, path: &str, value: &Value, results: &mut Vec<ValidationResult>) {
        let Some(object) = value.as_object() else {
            results.push(ValidationResult::error(
                path,
                "TYPE_MISMATCH",
                format!("Expected {} to be an object", display_path(path)),
            ));
            return;
        };

        for property in &self.properties {
            let property_path = child_path(path, &property.name);
            match object.get(&property.name) {
                None | Some(Value::Null) => {
                    if property.required {
                        results.push(ValidationResult::error(
                            &property_path,
                            "VALUE_IS_NULL",
                            format!("{} must not be null", property_path),
                        ));
                    }
                }
                Some(item) => match &property.value_type {
                    PropertyType::Type(code) => {
                        if !code.accepts(item) {
                            results.push(ValidationResult::error(
                                &property_path,
                                "TYPE_MISMATCH",
                                format!("Expected {} to have type {}", property_path, code),
                            ));
                        }
                    }
                    PropertyType::Schema(schema) => {
                        schema.validate_at(&property_path, item, results)
                    }
                },
            }
        }

        if !self.allow_undefined {
            for name in object.keys() {
                if !self.properties.iter().any(|p| &p.name == name) {
                    let property_path = child_path(path, name);
                    results.push(ValidationResult::warning(
                        &property_path,
                        "UNEXPECTED_PROPERTY",
                        format!("Found unexpected property {}", property_path),
                    ));
                }
            }
        }
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "value"
    } else {
        path
    }
}

/// Map of scalar filter values keyed by string.
#[derive(Clone, Copy, Default)]
pub struct FilterParamsSchema;

impl Schema for FilterParamsSchema {
    fn validate_at(&self, path: &str, value: &Value, results: &mut Vec<ValidationResult>) {
        let Some(object) = value.as_object() else {
            results.push(ValidationResult::error(
                path,
                "TYPE_MISMATCH",
                format!("Expected {} to be a map", display_path(path)),
            ));
            return;
        };

        for (name, item) in object {
            if item.is_object() || item.is_array() {
                let property_path = child_path(path, name);
                results.push(ValidationResult::error(
                    &property_path,
                    "TYPE_MISMATCH",
                    format!("Expected {} to be a scalar value", property_path),
                ));
            }
        }
    }
}

/// `{ skip, take, total }` paging block.
#[derive(Clone, Copy, Default)]
pub struct PagingParamsSchema;

impl Schema for PagingParamsSchema {
    fn validate_at(&self, path: &str, value: &Value, results: &mut Vec<ValidationResult>) {
        ObjectSchema::new()
            .with_optional_property("skip", TypeCode::Integer)
            .with_optional_property("take", TypeCode::Integer)
            .with_optional_property("total", TypeCode::Boolean)
            .validate_at(path, value, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dummy_schema() -> ObjectSchema {
        ObjectSchema::new()
            .with_optional_property("id", TypeCode::String)
            .with_required_property("key", TypeCode::String)
            .with_optional_property("content", TypeCode::String)
    }

    #[test]
    fn test_required_and_type_checks() {
        let schema = ObjectSchema::new()
            .allow_undefined(true)
            .with_required_property("dummy", dummy_schema());

        assert!(schema
            .validate_and_return_error(None, &json!({"dummy": {"key": "k"}}), false)
            .is_ok());

        let err = schema
            .validate_and_return_error(Some("123"), &json!({"dummy": {"key": 5}}), false)
            .unwrap_err();
        assert_eq!(err.code, "INVALID_DATA");
        assert_eq!(err.correlation_id.as_deref(), Some("123"));
        assert_eq!(err.details.get("dummy.key").map(String::as_str), Some("TYPE_MISMATCH"));

        let err = schema
            .validate_and_return_error(None, &json!({"cmd": "x"}), false)
            .unwrap_err();
        assert_eq!(err.details.get("dummy").map(String::as_str), Some("VALUE_IS_NULL"));
    }

    #[test]
    fn test_unexpected_properties_are_warnings() {
        let schema = dummy_schema();
        let value = json!({"key": "k", "extra": 1});

        assert!(schema.validate_and_return_error(None, &value, false).is_ok());
        assert!(schema.validate_and_return_error(None, &value, true).is_err());
    }

    #[test]
    fn test_paging_and_filter_schemas() {
        let schema = ObjectSchema::new()
            .allow_undefined(true)
            .with_optional_property("filter", FilterParamsSchema)
            .with_optional_property("paging", PagingParamsSchema);

        let ok = json!({"filter": {"key": "k"}, "paging": {"skip": 0, "take": 5}});
        assert!(schema.validate(&ok).is_empty());

        let bad = json!({"filter": {"key": ["k"]}, "paging": {"take": "five"}});
        assert_eq!(schema.validate(&bad).len(), 2);
    }
}
