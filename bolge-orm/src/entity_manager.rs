//! Entity manager: connection, mapping driver and metadata listeners.

use crate::config::{ConnectionParams, OrmSetup};
use crate::listener::OrmEventManager;
use crate::metadata::{EntityMetadata, MetadataDriver};
use crate::{OrmError, OrmResult};
use sea_orm::{DatabaseConnection, DbBackend};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Entry point to the mapped entities of one database.
///
/// The connection is opened on first use and shared afterwards.
pub struct EntityManager {
    params: ConnectionParams,
    backend: DbBackend,
    dev_mode: bool,
    driver: Arc<dyn MetadataDriver>,
    events: OrmEventManager,
    connection: OnceCell<DatabaseConnection>,
}

impl EntityManager {
    /// Create an entity manager. Fails if the parameters cannot form a
    /// connection URL; nothing is connected yet.
    pub fn create(params: ConnectionParams, setup: &OrmSetup, events: OrmEventManager) -> OrmResult<Self> {
        Self::with_driver(params, Arc::new(setup.driver()), setup.is_dev_mode(), events)
    }

    /// Create an entity manager over a custom metadata driver.
    pub fn with_driver(
        params: ConnectionParams,
        driver: Arc<dyn MetadataDriver>,
        dev_mode: bool,
        events: OrmEventManager,
    ) -> OrmResult<Self> {
        let backend = params.backend()?;
        params.database_url()?;

        debug!(driver = %params.driver, dbname = %params.dbname, "Entity manager created");
        Ok(Self {
            params,
            backend,
            dev_mode,
            driver,
            events,
            connection: OnceCell::new(),
        })
    }

    /// The database connection, opened on first call.
    pub async fn connection(&self) -> OrmResult<&DatabaseConnection> {
        self.connection
            .get_or_try_init(|| async {
                info!(backend = ?self.backend, "Connecting to database");
                let options = self.params.to_connect_options()?;
                sea_orm::Database::connect(options)
                    .await
                    .map_err(|e| OrmError::Connection(e.to_string()))
            })
            .await
    }

    /// Whether a connection has been opened.
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    /// Metadata of one class, after every listener has run.
    pub fn class_metadata(&self, class_name: &str) -> OrmResult<EntityMetadata> {
        let mut metadata = self.driver.load_metadata(class_name)?;
        self.events.dispatch_load_class_metadata(&mut metadata);
        Ok(metadata)
    }

    /// Every mapped class name.
    pub fn all_class_names(&self) -> OrmResult<Vec<String>> {
        self.driver.all_class_names()
    }

    /// Metadata of every mapped class.
    pub fn all_metadata(&self) -> OrmResult<Vec<EntityMetadata>> {
        self.all_class_names()?
            .iter()
            .map(|class| self.class_metadata(class))
            .collect()
    }

    pub fn backend(&self) -> DbBackend {
        self.backend
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn event_manager(&self) -> &OrmEventManager {
        &self.events
    }

    pub fn is_dev_mode(&self) -> bool {
        self.dev_mode
    }
}

impl fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityManager")
            .field("params", &self.params)
            .field("backend", &self.backend)
            .field("dev_mode", &self.dev_mode)
            .field("events", &self.events)
            .field("connected", &self.is_connected())
            .finish()
    }
}
