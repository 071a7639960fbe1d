use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::ConfigParams;
use crate::errors::ApplicationError;

/// Component locator in `group:type:kind:name:version` form. `None`
/// fields (written `*`) match anything.
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct Descriptor {
    group: Option<String>,
    kind_type: Option<String>,
    kind: Option<String>,
    name: Option<String>,
    version: Option<String>,
}

fn field(value: &str) -> Option<String> {
    if value.is_empty() || value == "*" {
        None
    } else {
        Some(value.to_string())
    }
}

impl Descriptor {
    pub fn new(group: &str, kind_type: &str, kind: &str, name: &str, version: &str) -> Self {
        Descriptor {
            group: field(group),
            kind_type: field(kind_type),
            kind: field(kind),
            name: field(name),
            version: field(version),
        }
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn kind_type(&self) -> Option<&str> {
        self.kind_type.as_deref()
    }

    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Wildcards on either side match.
    pub fn matches(&self, other: &Descriptor) -> bool {
        fn eq(a: &Option<String>, b: &Option<String>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        eq(&self.group, &other.group)
            && eq(&self.kind_type, &other.kind_type)
            && eq(&self.kind, &other.kind)
            && eq(&self.name, &other.name)
            && eq(&self.version, &other.version)
    }
}

impl FromStr for Descriptor {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, ApplicationError> {
        let tokens: Vec<&str> = s.split(':').collect();
        if tokens.len() != 5 {
            return Err(ApplicationError::config(
                None,
                "BAD_DESCRIPTOR",
                format!("Descriptor {} is in wrong format", s),
            )
            .with_details("descriptor", s));
        }
        Ok(Descriptor::new(
            tokens[0], tokens[1], tokens[2], tokens[3], tokens[4],
        ))
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "*".to_string());
        write!(
            f,
            "{}:{}:{}:{}:{}",
            show(&self.group),
            show(&self.kind_type),
            show(&self.kind),
            show(&self.name),
            show(&self.version)
        )
    }
}

/// Registry of components by locator. Components are stored type-erased
/// and retrieved by the exact type they were put with, typically an
/// `Arc<dyn Trait>`.
#[derive(Clone, Default)]
pub struct References {
    entries: Vec<(Descriptor, Arc<dyn Any + Send + Sync>)>,
}

impl References {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Any + Send + Sync>(&mut self, locator: Descriptor, component: T) {
        self.entries.push((locator, Arc::new(component)));
    }

    pub fn with<T: Any + Send + Sync>(mut self, locator: Descriptor, component: T) -> Self {
        self.put(locator, component);
        self
    }

    pub fn get_optional<T: Any + Clone>(&self, locator: &Descriptor) -> Vec<T> {
        self.entries
            .iter()
            .filter(|(descriptor, _)| locator.matches(descriptor))
            .filter_map(|(_, component)| component.downcast_ref::<T>().cloned())
            .collect()
    }

    pub fn get_one_optional<T: Any + Clone>(&self, locator: &Descriptor) -> Option<T> {
        self.get_optional(locator).into_iter().next()
    }

    pub fn get_one_required<T: Any + Clone>(&self, locator: &Descriptor) -> Result<T, ApplicationError> {
        self.get_one_optional(locator).ok_or_else(|| {
            ApplicationError::config(
                None,
                "REF_ERROR",
                format!("Failed to obtain reference to {}", locator),
            )
            .with_details("locator", locator)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for References {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(d, _)| d.to_string()))
            .finish()
    }
}

/// Resolves named dependencies (e.g. `controller`) to components.
/// Default locators are set in code and can be overridden with
/// `dependencies.<name>` configuration keys.
#[derive(Clone, Default, Debug)]
pub struct DependencyResolver {
    dependencies: HashMap<String, Descriptor>,
    references: References,
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, name: &str, locator: Descriptor) {
        self.dependencies.insert(name.to_string(), locator);
    }

    pub fn configure(&mut self, config: &ConfigParams) -> Result<(), ApplicationError> {
        let dependencies = config.get_section("dependencies");
        for (name, value) in dependencies.iter() {
            let locator = value.parse::<Descriptor>()?;
            self.dependencies.insert(name.to_string(), locator);
        }
        Ok(())
    }

    pub fn set_references(&mut self, references: &References) {
        self.references = references.clone();
    }

    pub fn locator(&self, name: &str) -> Option<&Descriptor> {
        self.dependencies.get(name)
    }

    pub fn get_one_optional<T: Any + Clone>(&self, name: &str) -> Option<T> {
        self.locator(name)
            .and_then(|locator| self.references.get_one_optional(locator))
    }

    pub fn get_one_required<T: Any + Clone>(&self, name: &str) -> Result<T, ApplicationError> {
        let locator = self.locator(name).ok_or_else(|| {
            ApplicationError::config(
                None,
                "REF_ERROR",
                format!("Cannot resolve unknown dependency {}", name),
            )
            .with_details("dependency", name)
        })?;
        self.references
            .get_one_required(locator)
            .map_err(|err| err.with_details("dependency", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Hello;

    impl Greeter for Hello {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_descriptor_parse_and_match() {
        let locator: Descriptor = "pip-services-dummies:controller:default:*:*".parse().unwrap();
        let concrete = Descriptor::new("pip-services-dummies", "controller", "default", "default", "1.0");
        assert!(locator.matches(&concrete));
        assert!(!Descriptor::new("other", "controller", "*", "*", "*").matches(&concrete));
        assert_eq!(locator.to_string(), "pip-services-dummies:controller:default:*:*");
        assert!("a:b:c".parse::<Descriptor>().is_err());
    }

    #[test]
    fn test_references_downcast_trait_objects() {
        let greeter: Arc<dyn Greeter> = Arc::new(Hello);
        let references = References::new()
            .with(Descriptor::new("g", "greeter", "default", "default", "1.0"), greeter)
            .with(Descriptor::new("g", "number", "default", "default", "1.0"), 42u32);

        let found: Arc<dyn Greeter> = references
            .get_one_required(&Descriptor::new("g", "greeter", "*", "*", "*"))
            .unwrap();
        assert_eq!(found.greet(), "hello");

        // stored under a different type
        let missing = references
            .get_one_optional::<Arc<dyn Greeter>>(&Descriptor::new("g", "number", "*", "*", "*"));
        assert!(missing.is_none());
    }

    #[test]
    fn test_dependency_resolver_override_from_config() {
        let mut resolver = DependencyResolver::new();
        resolver.put("controller", Descriptor::new("g", "controller", "default", "*", "*"));
        resolver
            .configure(&ConfigParams::from_tuples(&[(
                "dependencies.controller",
                "g:controller:memory:*:1.0",
            )]))
            .unwrap();

        let references = References::new().with(
            Descriptor::new("g", "controller", "memory", "default", "1.0"),
            7u32,
        );
        resolver.set_references(&references);
        assert_eq!(resolver.get_one_required::<u32>("controller").unwrap(), 7);

        let err = resolver.get_one_required::<u32>("logger").unwrap_err();
        assert_eq!(err.code, "REF_ERROR");
    }
}
