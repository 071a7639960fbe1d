use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::errors::ApplicationError;

/// Flat configuration map with dotted keys, e.g. `connection.region`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigParams {
    values: BTreeMap<String, String>,
}

impl ConfigParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tuples(tuples: &[(&str, &str)]) -> Self {
        let mut config = ConfigParams::new();
        for (key, value) in tuples {
            config.put(key, value);
        }
        config
    }

    /// Flattens a JSON document: nested objects become dotted keys,
    /// array items are keyed by their index.
    pub fn from_value(value: &Value) -> Self {
        let mut config = ConfigParams::new();
        flatten_into(&mut config.values, "", value);
        config
    }

    /// Environment variables, lower-cased, with `__` standing for the
    /// section separator: `CONNECTION__REGION` becomes `connection.region`.
    /// Variables that are not valid unicode are skipped.
    pub fn from_env() -> Self {
        let mut config = ConfigParams::new();
        for (key, value) in env::vars_os() {
            let (Some(key), Some(value)) = (key.to_str(), value.to_str()) else {
                warn!("Skipping non-unicode environment variable {:?}", key);
                continue;
            };
            config.put(&key.to_lowercase().replace("__", "."), value);
        }
        config
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ApplicationError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ApplicationError::config(
                None,
                "READ_CONFIG_FAILED",
                format!("Failed reading configuration {}", path.display()),
            )
            .with_details("path", path.display())
            .with_cause(e)
        })?;
        let value: Value = serde_json::from_str(&content).map_err(|e| {
            ApplicationError::config(
                None,
                "READ_CONFIG_FAILED",
                format!("Failed parsing configuration {}", path.display()),
            )
            .with_details("path", path.display())
            .with_cause(e)
        })?;
        Ok(Self::from_value(&value))
    }

    pub fn put(&mut self, key: &str, value: impl ToString) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Values from `other` override values already present.
    pub fn append(&mut self, other: &ConfigParams) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn merge(&self, other: &ConfigParams) -> ConfigParams {
        let mut result = self.clone();
        result.append(other);
        result
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get_as_nullable_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    pub fn get_as_string(&self, key: &str) -> String {
        self.get_as_nullable_string(key).unwrap_or_default()
    }

    pub fn get_as_string_with_default(&self, key: &str, default: &str) -> String {
        self.get_as_nullable_string(key)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_as_nullable_integer(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(|v| v.trim().parse::<i64>().ok())
    }

    pub fn get_as_integer_with_default(&self, key: &str, default: i64) -> i64 {
        self.get_as_nullable_integer(key).unwrap_or(default)
    }

    pub fn get_as_boolean_with_default(&self, key: &str, default: bool) -> bool {
        match self.values.get(key).map(|v| v.trim().to_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "t" | "y") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "f" | "n") => false,
            _ => default,
        }
    }

    /// Keys under `<name>.` with the prefix stripped.
    pub fn get_section(&self, name: &str) -> ConfigParams {
        let prefix = format!("{}.", name);
        let values = self
            .values
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&prefix)
                    .map(|rest| (rest.to_string(), v.clone()))
            })
            .collect();
        ConfigParams { values }
    }

    /// Distinct first segments of all dotted keys, in key order.
    pub fn get_section_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for key in self.values.keys() {
            if let Some((section, _)) = key.split_once('.') {
                if names.last().map(String::as_str) != Some(section) {
                    names.push(section.to_string());
                }
            }
        }
        names
    }

    /// Collects either every `<plural>.<name>` section or the single
    /// `<singular>` section, the way connections and credentials are laid out.
    pub fn get_many_sections(&self, plural: &str, singular: &str) -> Vec<ConfigParams> {
        let many = self.get_section(plural);
        if !many.is_empty() {
            return many
                .get_section_names()
                .iter()
                .map(|name| many.get_section(name))
                .filter(|section| !section.is_empty())
                .collect();
        }

        let single = self.get_section(singular);
        if single.is_empty() {
            Vec::new()
        } else {
            vec![single]
        }
    }
}

fn flatten_into(values: &mut BTreeMap<String, String>, prefix: &str, value: &Value) {
    let key_for = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", prefix, name)
        }
    };

    match value {
        Value::Object(map) => {
            for (name, item) in map {
                flatten_into(values, &key_for(name), item);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(values, &key_for(&index.to_string()), item);
            }
        }
        Value::Null => {}
        Value::String(s) => {
            values.insert(prefix.to_string(), s.clone());
        }
        other => {
            values.insert(prefix.to_string(), other.to_string());
        }
    }
}

impl fmt::Debug for ConfigParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // credentials must not leak into logs
        let redacted: BTreeMap<&str, &str> = self
            .values
            .iter()
            .map(|(k, v)| {
                let secret = k.ends_with("access_key")
                    || k.ends_with("secret_key")
                    || k.ends_with("client_key");
                (k.as_str(), if secret { "***" } else { v.as_str() })
            })
            .collect();
        f.debug_map().entries(redacted).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_flattens_nested_sections() {
        let config = ConfigParams::from_value(&json!({
            "connection": { "region": "us-east-1", "port": 8080 },
            "options": { "connect_timeout": 1000, "enabled": true },
            "list": ["a", "b"]
        }));

        assert_eq!(config.get_as_string("connection.region"), "us-east-1");
        assert_eq!(config.get_as_integer_with_default("connection.port", 0), 8080);
        assert_eq!(
            config.get_as_integer_with_default("options.connect_timeout", 10000),
            1000
        );
        assert!(config.get_as_boolean_with_default("options.enabled", false));
        assert_eq!(config.get_as_string("list.1"), "b");
    }

    #[test]
    fn test_sections() {
        let config = ConfigParams::from_tuples(&[
            ("connection.region", "us-east-1"),
            ("connection.arn", "arn:aws:lambda:us-east-1:1:function:f"),
            ("credential.access_id", "id"),
            ("group", "g"),
        ]);

        let connection = config.get_section("connection");
        assert_eq!(connection.len(), 2);
        assert_eq!(connection.get_as_string("region"), "us-east-1");
        assert_eq!(config.get_section_names(), vec!["connection", "credential"]);
        assert_eq!(config.get_many_sections("connections", "connection").len(), 1);
    }

    #[test]
    fn test_many_sections_prefers_plural() {
        let config = ConfigParams::from_tuples(&[
            ("connections.primary.region", "us-east-1"),
            ("connections.secondary.region", "eu-west-1"),
            ("connection.region", "ignored"),
        ]);

        let sections = config.get_many_sections("connections", "connection");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].get_as_string("region"), "eu-west-1");
    }

    #[test]
    fn test_defaults_on_missing_or_malformed_values() {
        let config = ConfigParams::from_tuples(&[("options.connect_timeout", "soon")]);
        assert_eq!(
            config.get_as_integer_with_default("options.connect_timeout", 10000),
            10000
        );
        assert_eq!(config.get_as_string_with_default("stream", "default"), "default");
    }

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("CONNECTION__REGION", Some("eu-central-1")),
                ("CREDENTIAL__ACCESS_ID", Some("AKIA")),
            ],
            || {
                let config = ConfigParams::from_env();
                assert_eq!(config.get_as_string("connection.region"), "eu-central-1");
                assert_eq!(config.get_as_string("credential.access_id"), "AKIA");
            },
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_from_env_skips_non_unicode_values() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        temp_env::with_vars(
            [
                ("CONNECTION__REGION", Some(OsStr::new("eu-central-1"))),
                ("CONNECTION__BROKEN", Some(OsStr::from_bytes(&[0x66, 0xff, 0x6f]))),
            ],
            || {
                let config = ConfigParams::from_env();
                assert_eq!(config.get_as_string("connection.region"), "eu-central-1");
                assert!(!config.contains_key("connection.broken"));
            },
        );
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = ConfigParams::from_tuples(&[("credential.access_key", "SECRET")]);
        let printed = format!("{:?}", config);
        assert!(!printed.contains("SECRET"));
    }

    #[test]
    fn test_from_file_missing() {
        let err = ConfigParams::from_file("./does/not/exist.json").unwrap_err();
        assert_eq!(err.code, "READ_CONFIG_FAILED");
    }
}
