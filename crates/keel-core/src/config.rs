//! Database configuration.
//!
//! Configuration is plain data deserialized with serde. Loading it from a
//! file or the environment is left to the application.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings for one named connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver name used to pick a connector (`sqlite`, `postgres`).
    pub driver: String,
    /// Connection string understood by the driver.
    pub url: String,
    /// Optional user name.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,
}

impl ConnectionConfig {
    /// Creates a configuration for `driver` at `url`.
    pub fn new(driver: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            url: url.into(),
            username: None,
            password: None,
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

/// All configured connections plus the name of the default one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Name of the connection used when none is requested.
    pub default: String,
    /// Connection settings by name.
    pub connections: IndexMap<String, ConnectionConfig>,
}

impl DatabaseConfig {
    /// Creates a configuration with a single default connection.
    pub fn single(name: impl Into<String>, config: ConnectionConfig) -> Self {
        let name = name.into();
        let mut connections = IndexMap::new();
        connections.insert(name.clone(), config);
        Self {
            default: name,
            connections,
        }
    }

    /// Creates a configuration whose default connection is an in-memory
    /// SQLite database.
    #[must_use]
    pub fn sqlite_memory() -> Self {
        Self::single("sqlite", ConnectionConfig::new("sqlite", "sqlite::memory:"))
    }

    /// Adds or replaces a named connection.
    #[must_use]
    pub fn with_connection(mut self, name: impl Into<String>, config: ConnectionConfig) -> Self {
        self.connections.insert(name.into(), config);
        self
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the JSON is malformed or the default
    /// connection is not among the configured ones.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        if !config.connections.contains_key(&config.default) {
            return Err(Error::Config(format!(
                "default connection '{}' is not configured",
                config.default
            )));
        }
        Ok(config)
    }

    /// Returns the settings for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownConnection`] if `name` is not configured.
    pub fn connection(&self, name: &str) -> Result<&ConnectionConfig> {
        self.connections
            .get(name)
            .ok_or_else(|| Error::UnknownConnection(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let config = DatabaseConfig::from_json(
            r#"{
                "default": "main",
                "connections": {
                    "main": { "driver": "sqlite", "url": "sqlite::memory:" },
                    "reports": { "driver": "postgres", "url": "postgres://localhost/reports",
                                 "username": "app", "password": "secret" }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.default, "main");
        assert_eq!(config.connection("main").unwrap().driver, "sqlite");
        let reports = config.connection("reports").unwrap();
        assert_eq!(reports.username.as_deref(), Some("app"));
    }

    #[test]
    fn test_default_must_exist() {
        let result = DatabaseConfig::from_json(r#"{"default": "x", "connections": {}}"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_connection() {
        let config = DatabaseConfig::sqlite_memory();
        assert!(matches!(
            config.connection("nope"),
            Err(Error::UnknownConnection(name)) if name == "nope"
        ));
    }
}
