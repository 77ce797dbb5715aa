// Service container
//
// Definitions are collected in a `ContainerBuilder`, validated once by
// `compile()` and frozen into a `Container`. Shared services are created on
// first access and cached for the lifetime of the container.

use crate::logging::{debug, trace};
use crate::{Controller, Error};
use bolge_events::EventSubscriber;
use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use std::any::{Any, TypeId, type_name};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// A type-erased service or parameter value
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Builds a service from its resolved constructor arguments
pub type ServiceFactory =
    Arc<dyn Fn(&ResolvedArguments) -> Result<ServiceInstance, Error> + Send + Sync>;

/// A constructor argument of a service definition
#[derive(Clone)]
pub enum Argument {
    /// Literal value, passed as `Arc<serde_json::Value>`
    Value(Value),
    /// Reference to another service; must exist
    Service(String),
    /// Reference to another service; null when missing
    OptionalService(String),
    /// Reference to a container parameter
    Parameter(String),
    /// Pre-built object handed over by the host
    Instance(ServiceInstance),
}

impl Argument {
    /// Interpret a value read from a service file.
    ///
    /// `@id` references a service, `@?id` references it optionally and
    /// `%name%` references a parameter. `@@` and `%%` escape a literal
    /// `@` or `%`.
    pub fn parse(value: Value) -> Self {
        match value {
            Value::String(s) => Self::parse_str(s),
            other => Argument::Value(other),
        }
    }

    fn parse_str(s: String) -> Self {
        if let Some(rest) = s.strip_prefix("@@") {
            return Argument::Value(Value::String(format!("@{}", rest)));
        }
        if let Some(id) = s.strip_prefix("@?") {
            return Argument::OptionalService(id.to_string());
        }
        if let Some(id) = s.strip_prefix('@') {
            return Argument::Service(id.to_string());
        }
        if s.len() > 2 && s.starts_with('%') && s.ends_with('%') {
            let name = &s[1..s.len() - 1];
            if !name.contains('%') {
                return Argument::Parameter(name.to_string());
            }
        }
        Argument::Value(Value::String(s.replace("%%", "%")))
    }

    pub fn instance<T: Any + Send + Sync>(value: T) -> Self {
        Argument::Instance(Arc::new(value))
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(v) => write!(f, "Value({})", v),
            Argument::Service(id) => write!(f, "Service(@{})", id),
            Argument::OptionalService(id) => write!(f, "OptionalService(@?{})", id),
            Argument::Parameter(name) => write!(f, "Parameter(%{}%)", name),
            Argument::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

/// A tag attached to a service definition
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub attributes: Map<String, Value>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// How to build one service
#[derive(Clone)]
pub struct ServiceDefinition {
    class: Option<String>,
    factory: Option<ServiceFactory>,
    arguments: Vec<Argument>,
    public: bool,
    shared: bool,
    tags: Vec<Tag>,
}

impl ServiceDefinition {
    /// A private, shared definition with no class
    pub fn new() -> Self {
        Self {
            class: None,
            factory: None,
            arguments: Vec::new(),
            public: false,
            shared: true,
            tags: Vec::new(),
        }
    }

    /// A definition built by the catalog factory registered for `class`
    pub fn for_class(class: impl Into<String>) -> Self {
        Self::new().with_class(class)
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Build with `factory` instead of looking the class up in the catalog
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ResolvedArguments) -> Result<ServiceInstance, Error> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn with_argument(mut self, argument: Argument) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_arguments(mut self, arguments: impl IntoIterator<Item = Argument>) -> Self {
        self.arguments.extend(arguments);
        self
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn with_shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn set_public(&mut self, public: bool) {
        self.public = public;
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|tag| tag.name == name)
    }

    pub fn add_tag(&mut self, tag: Tag) {
        self.tags.push(tag);
    }
}

impl Default for ServiceDefinition {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("class", &self.class)
            .field("factory", &self.factory.is_some())
            .field("arguments", &self.arguments)
            .field("public", &self.public)
            .field("shared", &self.shared)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Constructor arguments after references have been resolved
pub struct ResolvedArguments {
    id: String,
    values: Vec<Option<ServiceInstance>>,
}

impl ResolvedArguments {
    pub fn new(id: impl Into<String>, values: Vec<Option<ServiceInstance>>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }

    /// Id of the service being built
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument `index` as a `T`. Fails when absent, null or of another type.
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, Error> {
        self.optional(index)?
            .ok_or_else(|| self.error(index, "is missing"))
    }

    /// Like [`get`](Self::get), but a missing optional reference or a JSON
    /// null yields `None`.
    pub fn optional<T: Any + Send + Sync>(&self, index: usize) -> Result<Option<Arc<T>>, Error> {
        match self.values.get(index) {
            None | Some(None) => Ok(None),
            Some(Some(instance)) => {
                if instance
                    .downcast_ref::<Value>()
                    .is_some_and(Value::is_null)
                    && TypeId::of::<T>() != TypeId::of::<Value>()
                {
                    return Ok(None);
                }
                instance
                    .clone()
                    .downcast::<T>()
                    .map(Some)
                    .map_err(|_| self.error(index, &format!("is not a {}", type_name::<T>())))
            }
        }
    }

    pub fn value(&self, index: usize) -> Result<Arc<Value>, Error> {
        self.get::<Value>(index)
    }

    pub fn str(&self, index: usize) -> Result<String, Error> {
        self.value(index)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.error(index, "is not a string"))
    }

    pub fn bool(&self, index: usize) -> Result<bool, Error> {
        self.value(index)?
            .as_bool()
            .ok_or_else(|| self.error(index, "is not a boolean"))
    }

    pub fn is_null(&self, index: usize) -> bool {
        match self.values.get(index) {
            None | Some(None) => true,
            Some(Some(instance)) => instance
                .downcast_ref::<Value>()
                .is_some_and(Value::is_null),
        }
    }

    fn error(&self, index: usize, problem: &str) -> Error {
        Error::ServiceCreation {
            id: self.id.clone(),
            message: format!("argument #{} {}", index, problem),
        }
    }
}

/// Class names a service file may use, mapped to their factories
#[derive(Clone, Default)]
pub struct ServiceCatalog {
    factories: HashMap<String, ServiceFactory>,
}

impl ServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class whose instances are stored as `T`
    pub fn register_class<T, F>(&mut self, class: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&ResolvedArguments) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.register_factory(
            class,
            Arc::new(move |args: &ResolvedArguments| {
                factory(args).map(|value| Arc::new(value) as ServiceInstance)
            }),
        );
    }

    /// Register a controller class. Instances are stored as `Arc<dyn Controller>`.
    pub fn register_controller<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&ResolvedArguments) -> Result<Arc<dyn Controller>, Error> + Send + Sync + 'static,
    {
        self.register_class(class, factory);
    }

    /// Register an event subscriber class. Instances are stored as `Arc<dyn EventSubscriber>`.
    pub fn register_subscriber<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&ResolvedArguments) -> Result<Arc<dyn EventSubscriber>, Error>
            + Send
            + Sync
            + 'static,
    {
        self.register_class(class, factory);
    }

    pub fn register_factory(&mut self, class: impl Into<String>, factory: ServiceFactory) {
        let class = class.into();
        trace!(class = %class, "Registering service class");
        self.factories.insert(class, factory);
    }

    pub fn get(&self, class: &str) -> Option<&ServiceFactory> {
        self.factories.get(class)
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(class)
    }

    /// Add all classes of `other`, replacing same-named ones
    pub fn extend(&mut self, other: ServiceCatalog) {
        self.factories.extend(other.factories);
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ServiceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut classes: Vec<&String> = self.factories.keys().collect();
        classes.sort();
        f.debug_struct("ServiceCatalog")
            .field("classes", &classes)
            .finish()
    }
}

/// Mutable container configuration
#[derive(Default)]
pub struct ContainerBuilder {
    definitions: BTreeMap<String, ServiceDefinition>,
    aliases: BTreeMap<String, String>,
    parameters: HashMap<String, ServiceInstance>,
    catalog: ServiceCatalog,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: ServiceCatalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    /// Add or replace a service definition
    pub fn register(&mut self, id: impl Into<String>, definition: ServiceDefinition) {
        let id = id.into();
        trace!(service = %id, "Registering service definition");
        self.aliases.remove(&id);
        self.definitions.insert(id, definition);
    }

    /// Register an already built, public service
    pub fn set<T: Any + Send + Sync>(&mut self, id: impl Into<String>, instance: T) {
        let instance: ServiceInstance = Arc::new(instance);
        self.register(
            id,
            ServiceDefinition::new()
                .with_public(true)
                .with_factory(move |_| Ok(instance.clone())),
        );
    }

    pub fn set_alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        let alias = alias.into();
        self.definitions.remove(&alias);
        self.aliases.insert(alias, target.into());
    }

    pub fn set_parameter<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.parameters.insert(name.into(), Arc::new(value));
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn has_definition(&self, id: &str) -> bool {
        self.definitions.contains_key(id) || self.aliases.contains_key(id)
    }

    pub fn definition(&self, id: &str) -> Option<&ServiceDefinition> {
        self.definitions.get(id)
    }

    pub fn definition_mut(&mut self, id: &str) -> Option<&mut ServiceDefinition> {
        self.definitions.get_mut(id)
    }

    pub fn definitions_mut(&mut self) -> impl Iterator<Item = (&String, &mut ServiceDefinition)> {
        self.definitions.iter_mut()
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut ServiceCatalog {
        &mut self.catalog
    }

    fn resolve_alias<'a>(&'a self, id: &'a str) -> Result<&'a str, Error> {
        let mut current = id;
        let mut hops = 0;
        while let Some(target) = self.aliases.get(current) {
            hops += 1;
            if hops > self.aliases.len() {
                return Err(Error::CircularReference(format!("alias \"{}\"", id)));
            }
            current = target;
        }
        Ok(current)
    }

    /// Validate every definition and freeze the configuration.
    ///
    /// Fails on aliases or references to unknown services, unknown
    /// parameters, classes missing from the catalog and reference cycles.
    pub fn compile(self) -> Result<Container, Error> {
        let mut aliases = HashMap::new();
        for alias in self.aliases.keys() {
            let target = self.resolve_alias(alias)?;
            if !self.definitions.contains_key(target) {
                return Err(Error::ServiceNotFound(format!(
                    "{} (alias \"{}\")",
                    target, alias
                )));
            }
            aliases.insert(alias.clone(), target.to_string());
        }

        let mut services = HashMap::new();
        for (id, definition) in &self.definitions {
            let factory = match &definition.factory {
                Some(factory) => factory.clone(),
                None => {
                    let class = definition.class.as_deref().unwrap_or(id);
                    self.catalog.get(class).cloned().ok_or_else(|| {
                        Error::DependencyInjection(format!(
                            "service \"{}\" uses unknown class \"{}\"",
                            id, class
                        ))
                    })?
                }
            };

            let mut arguments = Vec::with_capacity(definition.arguments.len());
            for argument in &definition.arguments {
                let argument = match argument {
                    Argument::Service(target) => {
                        let target = self.resolve_alias(target)?;
                        if !self.definitions.contains_key(target) {
                            return Err(Error::ServiceNotFound(format!(
                                "{} (required by \"{}\")",
                                target, id
                            )));
                        }
                        Argument::Service(target.to_string())
                    }
                    Argument::OptionalService(target) => {
                        Argument::OptionalService(self.resolve_alias(target)?.to_string())
                    }
                    Argument::Parameter(name) => {
                        if !self.parameters.contains_key(name) {
                            return Err(Error::ParameterNotFound(format!(
                                "{} (required by \"{}\")",
                                name, id
                            )));
                        }
                        argument.clone()
                    }
                    other => other.clone(),
                };
                arguments.push(argument);
            }

            services.insert(
                id.clone(),
                CompiledService {
                    factory,
                    arguments,
                    public: definition.public,
                    shared: definition.shared,
                    tags: definition.tags.clone(),
                    instance: OnceCell::new(),
                },
            );
        }

        detect_cycles(&services)?;

        debug!(
            services = services.len(),
            aliases = aliases.len(),
            parameters = self.parameters.len(),
            "Service container compiled"
        );

        Ok(Container {
            inner: Arc::new(ContainerInner {
                services,
                aliases,
                parameters: self.parameters,
            }),
        })
    }
}

impl fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("definitions", &self.definitions)
            .field("aliases", &self.aliases)
            .field("parameters", &self.parameters.keys().collect::<Vec<_>>())
            .field("catalog", &self.catalog)
            .finish()
    }
}

fn dependencies(service: &CompiledService) -> impl Iterator<Item = &str> {
    service.arguments.iter().filter_map(|argument| match argument {
        Argument::Service(id) | Argument::OptionalService(id) => Some(id.as_str()),
        _ => None,
    })
}

fn detect_cycles(services: &HashMap<String, CompiledService>) -> Result<(), Error> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        id: &'a str,
        services: &'a HashMap<String, CompiledService>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), Error> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|p| *p == id).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(id);
                return Err(Error::CircularReference(cycle.join(" -> ")));
            }
            None => {}
        }

        let Some(service) = services.get(id) else {
            return Ok(());
        };

        marks.insert(id, Mark::Visiting);
        path.push(id);
        for dependency in dependencies(service) {
            visit(dependency, services, marks, path)?;
        }
        path.pop();
        marks.insert(id, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut ids: Vec<&String> = services.keys().collect();
    ids.sort();
    for id in ids {
        visit(id, services, &mut marks, &mut Vec::new())?;
    }
    Ok(())
}

struct CompiledService {
    factory: ServiceFactory,
    arguments: Vec<Argument>,
    public: bool,
    shared: bool,
    tags: Vec<Tag>,
    instance: OnceCell<ServiceInstance>,
}

struct ContainerInner {
    services: HashMap<String, CompiledService>,
    aliases: HashMap<String, String>,
    parameters: HashMap<String, ServiceInstance>,
}

/// Frozen service container. Cheap to clone.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    fn lookup(&self, id: &str) -> Option<(&str, &CompiledService)> {
        let id = self.inner.aliases.get(id).map(String::as_str).unwrap_or(id);
        self.inner.services.get_key_value(id).map(|(k, s)| (k.as_str(), s))
    }

    /// Whether a public service (or alias) with this id exists
    pub fn has(&self, id: &str) -> bool {
        self.lookup(id).is_some_and(|(_, service)| service.public)
    }

    /// Fetch a public service without downcasting
    pub fn get_service(&self, id: &str) -> Result<ServiceInstance, Error> {
        match self.lookup(id) {
            Some((_, service)) if service.public => self.instantiate(id),
            _ => {
                debug!(service = id, "Service not found in container");
                Err(Error::ServiceNotFound(id.to_string()))
            }
        }
    }

    /// Fetch a public service as a `T`
    pub fn get<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>, Error> {
        self.get_service(id)?.downcast::<T>().map_err(|_| {
            Error::DependencyInjection(format!(
                "service \"{}\" is not a {}",
                id,
                type_name::<T>()
            ))
        })
    }

    fn instantiate(&self, id: &str) -> Result<ServiceInstance, Error> {
        let (id, service) = self
            .lookup(id)
            .ok_or_else(|| Error::ServiceNotFound(id.to_string()))?;

        if service.shared {
            service
                .instance
                .get_or_try_init(|| self.build(id, service))
                .cloned()
        } else {
            self.build(id, service)
        }
    }

    fn build(&self, id: &str, service: &CompiledService) -> Result<ServiceInstance, Error> {
        trace!(service = id, "Instantiating service");

        let mut values = Vec::with_capacity(service.arguments.len());
        for argument in &service.arguments {
            let value = match argument {
                Argument::Value(value) => Some(Arc::new(value.clone()) as ServiceInstance),
                Argument::Service(target) => Some(self.instantiate(target)?),
                Argument::OptionalService(target) => {
                    if self.lookup(target).is_some() {
                        Some(self.instantiate(target)?)
                    } else {
                        None
                    }
                }
                Argument::Parameter(name) => self.inner.parameters.get(name).cloned(),
                Argument::Instance(instance) => Some(instance.clone()),
            };
            values.push(value);
        }

        let arguments = ResolvedArguments::new(id, values);
        (service.factory)(&arguments).map_err(|err| match err {
            err @ Error::ServiceCreation { .. } => err,
            other => Error::ServiceCreation {
                id: id.to_string(),
                message: other.to_string(),
            },
        })
    }

    /// A parameter as a `T`
    pub fn parameter<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, Error> {
        let value = self
            .inner
            .parameters
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ParameterNotFound(name.to_string()))?;

        value.downcast::<T>().map_err(|_| {
            Error::DependencyInjection(format!(
                "parameter \"{}\" is not a {}",
                name,
                type_name::<T>()
            ))
        })
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.inner.parameters.contains_key(name)
    }

    /// Ids of public services and aliases, sorted
    pub fn service_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .inner
            .services
            .iter()
            .filter(|(_, service)| service.public)
            .map(|(id, _)| id.as_str())
            .chain(self.inner.aliases.keys().map(String::as_str))
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Services carrying `tag`, with the tag attributes, sorted by id
    pub fn tagged(&self, tag: &str) -> Vec<(String, Tag)> {
        let mut tagged: Vec<(String, Tag)> = self
            .inner
            .services
            .iter()
            .flat_map(|(id, service)| {
                service
                    .tags
                    .iter()
                    .filter(|t| t.name == tag)
                    .map(move |t| (id.clone(), t.clone()))
            })
            .collect();
        tagged.sort_by(|a, b| a.0.cmp(&b.0));
        tagged
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.service_ids())
            .finish()
    }
}
