// Container assembly: core services, plugin services, ORM and parameters

use crate::error::Result;
use bolge_config::{FileLocator, Settings, YamlServiceLoader};
use bolge_core::{
    Argument, Container, ContainerBuilder, Controller, DefaultController, Error, RouteTable,
    ServiceCatalog, ServiceDefinition,
};
use bolge_events::{EventDispatcher, EventSubscriber};
use bolge_orm::{ConnectionParams, EntityManager, OrmEventManager, OrmSetup, TablePrefix};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Service file shipped with the bootstrap, loaded before the plugin's own.
pub const CORE_SERVICES: &str = include_str!("../config/services.yaml");

pub const EVENT_DISPATCHER: &str = "event_dispatcher";
pub const ORM_SETUP: &str = "doctrine.setup";
pub const ENTITY_MANAGER: &str = "doctrine.orm.entity_manager";
pub const SETTINGS_PARAMETER: &str = "core.settings";
pub const SETTINGS_ARRAY_PARAMETER: &str = "core.settings.array";
pub const ROUTES_PARAMETER: &str = "routes";

/// Services with this tag are attached to the event dispatcher after compilation.
pub const SUBSCRIBER_TAG: &str = "event_subscriber";

/// Directory of entity mapping files, relative to the plugin directory.
pub const ENTITY_DIR: &str = "App/Entity";

/// Classes the core service file and the ORM registration refer to
pub fn core_catalog() -> ServiceCatalog {
    let mut catalog = ServiceCatalog::new();

    catalog.register_class("bolge_events::EventDispatcher", |_| Ok(EventDispatcher::new()));
    catalog.register_controller("bolge_core::DefaultController", |_| {
        Ok(Arc::new(DefaultController::new()) as Arc<dyn Controller>)
    });

    catalog.register_class("bolge_orm::OrmSetup", |args| {
        let paths = args.value(0)?;
        let paths: Vec<String> = serde_json::from_value((*paths).clone())
            .map_err(|e| Error::DependencyInjection(format!("entity paths: {}", e)))?;
        Ok(OrmSetup::yaml_metadata_configuration(paths, args.bool(1)?))
    });

    catalog.register_class("bolge_orm::EntityManager", |args| {
        let params: ConnectionParams = serde_json::from_value((*args.value(0)?).clone())
            .map_err(|e| Error::DependencyInjection(format!("connection parameters: {}", e)))?;
        let setup = args.get::<OrmSetup>(1)?;
        let events = args.get::<OrmEventManager>(2)?;
        EntityManager::create(params, &setup, (*events).clone())
            .map_err(|e| Error::Internal(e.to_string()))
    });

    catalog
}

/// Builds the compiled container of one boot.
///
/// Core services come first, then the plugin's `config/services.yaml`;
/// later definitions replace earlier ones. When connection parameters are
/// given, the metadata configuration and the entity manager are registered
/// as well. Every definition ends up public.
#[derive(Debug)]
pub struct ContainerAssembler {
    dir: PathBuf,
    catalog: ServiceCatalog,
    connection: Option<ConnectionParams>,
    table_prefix: String,
}

impl ContainerAssembler {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            catalog: core_catalog(),
            connection: None,
            table_prefix: String::new(),
        }
    }

    /// Add host classes on top of the core ones
    pub fn with_catalog(mut self, catalog: ServiceCatalog) -> Self {
        self.catalog.extend(catalog);
        self
    }

    pub fn with_connection(mut self, connection: Option<ConnectionParams>) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Load, configure and compile
    pub fn assemble(self, settings: &Settings, routes: &RouteTable) -> Result<Container> {
        let mut builder = ContainerBuilder::with_catalog(self.catalog.clone());
        let config_dir = self.dir.join("config");

        let core = YamlServiceLoader::new(FileLocator::new(&config_dir));
        core.load_str(&mut builder, CORE_SERVICES, "core services.yaml")?;
        YamlServiceLoader::new(FileLocator::new(&config_dir)).load(&mut builder, "services.yaml")?;

        match &self.connection {
            Some(params) => self.register_orm(&mut builder, params),
            None => debug!("No database parameters, skipping entity manager"),
        }

        for (_, definition) in builder.definitions_mut() {
            definition.set_public(true);
        }

        builder.set_parameter(SETTINGS_PARAMETER, settings.clone());
        builder.set_parameter(SETTINGS_ARRAY_PARAMETER, settings.to_array());
        builder.set_parameter(ROUTES_PARAMETER, routes.clone());

        let container = builder.compile()?;
        info!(services = container.service_ids().len(), "Service container compiled");
        Ok(container)
    }

    fn register_orm(&self, builder: &mut ContainerBuilder, params: &ConnectionParams) {
        let entity_dir = entity_dir(&self.dir);
        debug!(
            entity_dir = %entity_dir.display(),
            table_prefix = %self.table_prefix,
            "Registering entity manager"
        );

        builder.register(
            ORM_SETUP,
            ServiceDefinition::for_class("bolge_orm::OrmSetup").with_arguments([
                Argument::Value(json!([entity_dir.to_string_lossy()])),
                Argument::Value(Value::Bool(true)),
            ]),
        );

        let events = OrmEventManager::new()
            .with_listener(Arc::new(TablePrefix::new(self.table_prefix.clone())));
        builder.register(
            ENTITY_MANAGER,
            ServiceDefinition::for_class("bolge_orm::EntityManager").with_arguments([
                Argument::Value(connection_value(params)),
                Argument::Service(ORM_SETUP.to_string()),
                Argument::instance(events),
            ]),
        );
    }
}

fn entity_dir(dir: &Path) -> PathBuf {
    dir.join(ENTITY_DIR)
}

fn connection_value(params: &ConnectionParams) -> Value {
    json!({
        "driver": params.driver,
        "user": params.user,
        "password": params.password,
        "dbname": params.dbname,
        "host": params.host,
    })
}

/// Attach tagged subscriber services and host subscribers to the container's
/// event dispatcher, in that order.
pub fn wire_subscribers(
    container: &Container,
    extra: &[Arc<dyn EventSubscriber>],
) -> Result<Arc<EventDispatcher>> {
    let dispatcher = container.get::<EventDispatcher>(EVENT_DISPATCHER)?;

    for (id, _) in container.tagged(SUBSCRIBER_TAG) {
        let subscriber = container.get::<Arc<dyn EventSubscriber>>(&id)?;
        debug!(service = %id, "Attaching event subscriber");
        dispatcher.add_subscriber(Arc::clone(&*subscriber));
    }

    for subscriber in extra {
        dispatcher.add_subscriber(Arc::clone(subscriber));
    }

    Ok(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_services_parse() {
        let mut builder = ContainerBuilder::with_catalog(core_catalog());
        YamlServiceLoader::new(FileLocator::new("."))
            .load_str(&mut builder, CORE_SERVICES, "core")
            .unwrap();
        let container = builder.compile().unwrap();

        let dispatcher = container.get::<EventDispatcher>(EVENT_DISPATCHER).unwrap();
        let aliased = container
            .get::<EventDispatcher>("Symfony\\Component\\EventDispatcher\\EventDispatcherInterface")
            .unwrap();
        assert!(Arc::ptr_eq(&dispatcher, &aliased));
        assert!(container.get::<Arc<dyn Controller>>("bolge.default_controller").is_ok());
    }

    #[test]
    fn test_connection_value_round_trips() {
        let params = ConnectionParams::new("pdo_mysql", "wp", "secret", "wordpress", "localhost");
        let back: ConnectionParams = serde_json::from_value(connection_value(&params)).unwrap();
        assert_eq!(back.dbname, "wordpress");
        assert_eq!(back.password, "secret");
    }
}
