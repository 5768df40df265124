//! Resolution of named connections.
//!
//! A [`ConnectionManager`] turns a connection name into a live
//! [`Connection`], connecting through the [`Connector`] registered for the
//! configured driver. Each name is connected at most once and cached; there
//! is no pooling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use tracing::info;

use crate::config::{ConnectionConfig, DatabaseConfig};
use crate::connection::Connection;
use crate::error::{Error, Result};

/// Opens connections for one driver.
pub trait Connector: Send + Sync {
    /// Connects using `config`, registering the connection under `name`.
    ///
    /// # Errors
    ///
    /// Returns a driver or connection error if the database is unreachable.
    fn connect(&self, name: &str, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;
}

/// Resolves and caches named connections.
pub struct ConnectionManager {
    config: DatabaseConfig,
    connectors: HashMap<String, Arc<dyn Connector>>,
    resolved: Mutex<IndexMap<String, Arc<dyn Connection>>>,
}

impl ConnectionManager {
    /// Creates a manager for `config` with no connectors registered.
    #[must_use]
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            connectors: HashMap::new(),
            resolved: Mutex::new(IndexMap::new()),
        }
    }

    /// Creates a manager around an already open connection, which becomes the
    /// default.
    #[must_use]
    pub fn from_connection(connection: Arc<dyn Connection>) -> Self {
        let name = connection.name().to_string();
        let config = DatabaseConfig::single(
            name.clone(),
            ConnectionConfig::new(connection.dialect().to_string(), String::new()),
        );
        let manager = Self::new(config);
        manager.insert(name, connection);
        manager
    }

    /// Registers the connector for `driver`.
    #[must_use]
    pub fn with_connector(mut self, driver: impl Into<String>, connector: impl Connector + 'static) -> Self {
        self.connectors.insert(driver.into(), Arc::new(connector));
        self
    }

    /// Registers an already open connection under `name`.
    pub fn insert(&self, name: impl Into<String>, connection: Arc<dyn Connection>) {
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), connection);
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Returns the name of the default connection.
    #[must_use]
    pub fn default_name(&self) -> &str {
        &self.config.default
    }

    /// Returns the default connection.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::connection`].
    pub fn default_connection(&self) -> Result<Arc<dyn Connection>> {
        self.connection(&self.config.default)
    }

    /// Returns the connection named `name`, connecting on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownConnection`] if `name` is neither configured
    /// nor registered, [`Error::UnknownDriver`] if no connector handles its
    /// driver, or the connector's error.
    pub fn connection(&self, name: &str) -> Result<Arc<dyn Connection>> {
        let mut resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(connection) = resolved.get(name) {
            return Ok(Arc::clone(connection));
        }

        let config = self.config.connection(name)?;
        let connector = self
            .connectors
            .get(&config.driver)
            .ok_or_else(|| Error::UnknownDriver(config.driver.clone()))?;

        info!(connection = name, driver = %config.driver, "Connecting");
        let connection = connector.connect(name, config)?;
        resolved.insert(name.to_string(), Arc::clone(&connection));
        Ok(connection)
    }

    /// Returns the connection named `name`, or the default one.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::connection`].
    pub fn connection_or_default(&self, name: Option<&str>) -> Result<Arc<dyn Connection>> {
        self.connection(name.unwrap_or(&self.config.default))
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let resolved: Vec<String> = self
            .resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("drivers", &self.connectors.keys().collect::<Vec<_>>())
            .field("resolved", &resolved)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::testing::FakeConnection;

    struct CountingConnector(Arc<AtomicUsize>);

    impl Connector for CountingConnector {
        fn connect(&self, _name: &str, _config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FakeConnection::with_rows(Vec::new())))
        }
    }

    #[test]
    fn test_connections_are_cached() {
        let connects = Arc::new(AtomicUsize::new(0));
        let manager = ConnectionManager::new(DatabaseConfig::sqlite_memory())
            .with_connector("sqlite", CountingConnector(Arc::clone(&connects)));

        manager.default_connection().unwrap();
        manager.connection("sqlite").unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_connection_and_driver() {
        let manager = ConnectionManager::new(DatabaseConfig::sqlite_memory());

        assert!(matches!(
            manager.connection("other"),
            Err(Error::UnknownConnection(_))
        ));
        assert!(matches!(
            manager.default_connection(),
            Err(Error::UnknownDriver(driver)) if driver == "sqlite"
        ));
    }

    #[test]
    fn test_from_connection() {
        let manager = ConnectionManager::from_connection(Arc::new(FakeConnection::with_rows(Vec::new())));
        assert_eq!(manager.default_name(), "fake");
        assert_eq!(manager.connection_or_default(None).unwrap().name(), "fake");
    }
}
