//! Connection parameters and metadata configuration.

use crate::metadata::YamlDriver;
use crate::{OrmError, OrmResult};
use sea_orm::{ConnectOptions, DbBackend};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Database connection parameters as a host application provides them.
///
/// `driver` accepts PDO-style names (`pdo_mysql`, `pdo_pgsql`, `pdo_sqlite`)
/// as well as plain backend names. For SQLite, `dbname` is the database
/// file path; an empty name or `:memory:` opens an in-memory database.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Driver name.
    pub driver: String,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Database name.
    pub dbname: String,
    /// Host, optionally with `:port`.
    pub host: String,
}

impl ConnectionParams {
    /// Create connection parameters.
    pub fn new(
        driver: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        dbname: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            driver: driver.into(),
            user: user.into(),
            password: password.into(),
            dbname: dbname.into(),
            host: host.into(),
        }
    }

    /// Backend selected by the driver name.
    pub fn backend(&self) -> OrmResult<DbBackend> {
        match self.driver.to_ascii_lowercase().as_str() {
            "pdo_mysql" | "mysqli" | "mysql" | "mariadb" => Ok(DbBackend::MySql),
            "pdo_pgsql" | "pgsql" | "postgres" | "postgresql" => Ok(DbBackend::Postgres),
            "pdo_sqlite" | "sqlite" | "sqlite3" => Ok(DbBackend::Sqlite),
            other => Err(OrmError::Config(format!("unsupported driver \"{}\"", other))),
        }
    }

    fn is_memory_sqlite(&self) -> bool {
        self.dbname.is_empty() || self.dbname == ":memory:"
    }

    /// Connection URL for SQLx.
    pub fn database_url(&self) -> OrmResult<String> {
        let backend = self.backend()?;
        if backend == DbBackend::Sqlite {
            return Ok(if self.is_memory_sqlite() {
                "sqlite::memory:".to_string()
            } else {
                format!("sqlite://{}?mode=rwc", self.dbname)
            });
        }

        if self.host.is_empty() {
            return Err(OrmError::Config("database host is empty".to_string()));
        }
        if self.dbname.is_empty() {
            return Err(OrmError::Config("database name is empty".to_string()));
        }

        let scheme = match backend {
            DbBackend::Postgres => "postgres",
            _ => "mysql",
        };
        let credentials = if self.password.is_empty() {
            urlencoding::encode(&self.user).into_owned()
        } else {
            format!(
                "{}:{}",
                urlencoding::encode(&self.user),
                urlencoding::encode(&self.password)
            )
        };

        Ok(format!(
            "{}://{}@{}/{}",
            scheme,
            credentials,
            self.host,
            urlencoding::encode(&self.dbname)
        ))
    }

    /// Convert to SeaORM ConnectOptions.
    pub fn to_connect_options(&self) -> OrmResult<ConnectOptions> {
        let mut options = ConnectOptions::new(self.database_url()?);
        options.sqlx_logging(false);

        // Every pooled connection to :memory: would be a separate database
        if self.backend()? == DbBackend::Sqlite && self.is_memory_sqlite() {
            options.max_connections(1).min_connections(1);
        }

        Ok(options)
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("driver", &self.driver)
            .field("user", &self.user)
            .field("password", &"***")
            .field("dbname", &self.dbname)
            .field("host", &self.host)
            .finish()
    }
}

/// Metadata configuration: where entity mappings live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrmSetup {
    entity_paths: Vec<PathBuf>,
    dev_mode: bool,
}

impl OrmSetup {
    /// Configuration reading YAML mappings from `paths`.
    pub fn yaml_metadata_configuration<I, P>(paths: I, dev_mode: bool) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            entity_paths: paths.into_iter().map(Into::into).collect(),
            dev_mode,
        }
    }

    /// Directories scanned for mapping files.
    pub fn entity_paths(&self) -> &[PathBuf] {
        &self.entity_paths
    }

    /// Whether dev mode is on.
    pub fn is_dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Metadata driver over the entity paths.
    pub fn driver(&self) -> YamlDriver {
        YamlDriver::new(self.entity_paths.clone())
    }
}
