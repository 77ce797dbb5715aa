// The bootstrap context a host drives

use crate::dispatcher::RequestDispatcher;
use crate::error::{BootError, Result};
use crate::services::{ContainerAssembler, ENTITY_MANAGER, wire_subscribers};
use bolge_config::{Environment, FileLocator, Settings, YamlRouteLoader};
use bolge_core::{
    ActivateEvent, BootEvent, Container, Controller, HttpRequest, HttpResponse, ResolvedArguments,
    RouteTable, ServiceCatalog,
};
use bolge_events::{EventDispatcher, EventSubscriber};
use bolge_orm::{ConnectionParams, EntityManager, OrmResult, SchemaTool};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything one `boot()` produced
struct Booted {
    container: Container,
    dispatcher: Arc<EventDispatcher>,
    request: HttpRequest,
    response: Option<HttpResponse>,
}

/// Bootstrap context of a plugin.
///
/// Configure it (`set_dir_path` is required, the rest optional), then call
/// [`boot`](Self::boot) once per request. Each boot reloads `.env`,
/// settings, routes and services from the plugin directory and compiles a
/// fresh container.
///
/// ```rust,ignore
/// let mut core = BolgeCore::new();
/// core.set_dir_path("/var/www/wp-content/plugins/shop");
/// core.set_table_prefix("wp_");
/// core.set_db_connection_params("pdo_mysql", "wp", "secret", "wordpress", "localhost");
///
/// core.boot(HttpRequest::get("/shop/cart")).await?;
/// if let Some(response) = core.response() {
///     // hand it to the host
/// }
/// ```
#[derive(Default)]
pub struct BolgeCore {
    dir_path: PathBuf,
    table_prefix: String,
    connection: Option<ConnectionParams>,
    catalog: ServiceCatalog,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
    environment: Environment,
    booted: Option<Booted>,
}

impl BolgeCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_dir_path(&mut self, dir_path: impl Into<PathBuf>) {
        self.dir_path = dir_path.into();
    }

    pub fn dir_path(&self) -> &Path {
        &self.dir_path
    }

    /// Prefix prepended to every mapped table name
    pub fn set_table_prefix(&mut self, prefix: impl Into<String>) {
        self.table_prefix = prefix.into();
    }

    pub fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    /// Database connection. Without it no entity manager is registered.
    pub fn set_db_connection_params(
        &mut self,
        driver: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        dbname: impl Into<String>,
        host: impl Into<String>,
    ) {
        self.connection = Some(ConnectionParams::new(driver, user, password, dbname, host));
    }

    pub fn db_connection_params(&self) -> Option<&ConnectionParams> {
        self.connection.as_ref()
    }

    /// Classes service files may name, in addition to the core ones
    pub fn catalog_mut(&mut self) -> &mut ServiceCatalog {
        &mut self.catalog
    }

    pub fn register_class<T, F>(&mut self, class: impl Into<String>, factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&ResolvedArguments) -> bolge_core::Result<T> + Send + Sync + 'static,
    {
        self.catalog.register_class(class, factory);
    }

    pub fn register_controller<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&ResolvedArguments) -> bolge_core::Result<Arc<dyn Controller>> + Send + Sync + 'static,
    {
        self.catalog.register_controller(class, factory);
    }

    pub fn register_subscriber<F>(&mut self, class: impl Into<String>, factory: F)
    where
        F: Fn(&ResolvedArguments) -> bolge_core::Result<Arc<dyn EventSubscriber>>
            + Send
            + Sync
            + 'static,
    {
        self.catalog.register_subscriber(class, factory);
    }

    /// Subscriber attached to the container's event dispatcher on every boot,
    /// after the tagged ones
    pub fn add_subscriber(&mut self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Load `<dir>/.env` if it exists. Variables already set in the process win.
    pub fn load_environment_variables(&mut self) -> Result<&Environment> {
        self.environment = Environment::load(&self.dir_path)?;
        Ok(&self.environment)
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    fn settings_path(&self) -> PathBuf {
        self.dir_path.join("config").join("settings.yaml")
    }

    /// `config/settings.yaml` as a settings tree
    pub fn get_settings(&self) -> Result<Settings> {
        Ok(Settings::load(self.settings_path())?)
    }

    /// `config/settings.yaml` as a plain map
    pub fn get_settings_array(&self) -> Result<Map<String, Value>> {
        Ok(self.get_settings()?.to_array())
    }

    /// `config/routes.yaml` as a route table
    pub fn get_routes(&self) -> Result<RouteTable> {
        let loader = YamlRouteLoader::new(FileLocator::new(self.dir_path.join("config")));
        Ok(loader.load("routes.yaml")?)
    }

    /// Handle one request.
    ///
    /// Configuration, container and lifecycle event failures are returned
    /// as errors. A request that no route or controller handles is not an
    /// error: the response is just `None`. The boot event fires in both
    /// cases.
    pub async fn boot(&mut self, request: HttpRequest) -> Result<()> {
        info!(method = %request.method, path = %request.path, dir = %self.dir_path.display(), "Booting");
        self.booted = None;
        self.load_environment_variables()?;

        let routes = self.get_routes()?;
        let settings = self.get_settings()?;

        let container = ContainerAssembler::new(&self.dir_path)
            .with_catalog(self.catalog.clone())
            .with_connection(self.connection.clone())
            .with_table_prefix(self.table_prefix.clone())
            .assemble(&settings, &routes)?;
        let dispatcher = wire_subscribers(&container, &self.subscribers)?;

        let outcome = RequestDispatcher::new(&container, Arc::clone(&dispatcher), self.environment.is_dev())?
            .dispatch(&request)
            .await?;
        let response = outcome.into_response();

        // A boot whose event fan-out fails leaves the context unbooted
        let event = BootEvent::new(request, response);
        dispatcher.dispatch(&event).await?;

        let (request, response) = event.into_parts();
        debug!(handled = response.is_some(), "Boot finished");
        self.booted = Some(Booted {
            container,
            dispatcher,
            request,
            response,
        });
        Ok(())
    }

    /// Response of the last boot, if any route answered
    pub fn response(&self) -> Option<&HttpResponse> {
        self.booted.as_ref().and_then(|b| b.response.as_ref())
    }

    pub fn take_response(&mut self) -> Option<HttpResponse> {
        self.booted.as_mut().and_then(|b| b.response.take())
    }

    /// Request of the last boot
    pub fn request(&self) -> Option<&HttpRequest> {
        self.booted.as_ref().map(|b| &b.request)
    }

    /// Container compiled by the last boot
    pub fn container(&self) -> Option<&Container> {
        self.booted.as_ref().map(|b| &b.container)
    }

    pub fn is_booted(&self) -> bool {
        self.booted.is_some()
    }

    /// Bring the database schema up to date with the entity mappings, then
    /// fire the activation event. Returns the executed statements.
    ///
    /// Needs a prior boot with database parameters set. Statements run one
    /// by one without a transaction.
    pub async fn plugin_activate(&self) -> Result<Vec<String>> {
        let booted = self.booted.as_ref().ok_or(BootError::NotBooted)?;
        let em = booted.container.get::<EntityManager>(ENTITY_MANAGER)?;

        let metadata = em
            .all_class_names()?
            .iter()
            .map(|class| em.class_metadata(class))
            .collect::<OrmResult<Vec<_>>>()?;

        let executed = SchemaTool::new(&em).update_schema(&metadata).await?;
        booted.dispatcher.dispatch(&ActivateEvent::new()).await?;

        info!(entities = metadata.len(), statements = executed.len(), "Plugin activated");
        Ok(executed)
    }
}

impl fmt::Debug for BolgeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BolgeCore")
            .field("dir_path", &self.dir_path)
            .field("table_prefix", &self.table_prefix)
            .field("connection", &self.connection)
            .field("subscribers", &self.subscribers.len())
            .field("booted", &self.booted.is_some())
            .finish()
    }
}
