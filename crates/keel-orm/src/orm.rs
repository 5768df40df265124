//! The entry point tying models to connections.

use std::fmt;
use std::sync::Arc;

use keel_core::{Connection, ConnectionManager, Row, Value};

use crate::error::{OrmError, Result};
use crate::model::Model;
use crate::query::{load_relations, ModelQuery};
use crate::registry::Registry;
use crate::schema::ModelSchema;
use crate::tracker::ChangeTracker;
use crate::validation::{ValidationEngine, ValidationResult};

/// Registered models, the connections they live on and an optional
/// validation engine.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use keel_core::{row, Connection, ConnectionManager};
/// use keel_orm::{ModelSchema, Orm};
/// use keel_sqlite::SqliteConnection;
///
/// let conn = SqliteConnection::memory().unwrap();
/// conn.statement("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
///
/// let mut orm = Orm::new(ConnectionManager::from_connection(Arc::new(conn)));
/// orm.register(ModelSchema::new("User").field("name")).unwrap();
///
/// let user = orm.make_with("User", row! { "name" => "Ada" }).unwrap();
/// assert!(orm.save(&user).unwrap());
///
/// let found = orm.find("User", user.id().unwrap()).unwrap().unwrap();
/// assert_eq!(found.get("name"), user.get("name"));
/// ```
pub struct Orm {
    registry: Registry,
    connections: ConnectionManager,
    validator: Option<Box<dyn ValidationEngine>>,
}

impl Orm {
    /// Creates an ORM with an empty registry and no validator.
    #[must_use]
    pub fn new(connections: ConnectionManager) -> Self {
        Self {
            registry: Registry::new(),
            connections,
            validator: None,
        }
    }

    /// Replaces the registry.
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Validates models with `validator` before saving them.
    #[must_use]
    pub fn with_validator(mut self, validator: impl ValidationEngine + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    /// Registers a model schema.
    ///
    /// # Errors
    ///
    /// See [`Registry::register`].
    pub fn register(&mut self, schema: ModelSchema) -> Result<Arc<ModelSchema>> {
        self.registry.register(schema)
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the connection manager.
    #[must_use]
    pub const fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Returns the connection `schema` lives on.
    ///
    /// # Errors
    ///
    /// Returns [`keel_core::Error::UnknownConnection`] if it is not
    /// configured.
    pub fn connection_for(&self, schema: &ModelSchema) -> Result<Arc<dyn Connection>> {
        Ok(self
            .connections
            .connection_or_default(schema.connection_name())?)
    }

    /// Starts a query over `model`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownModel`] if it is not registered.
    pub fn query(&self, model: &str) -> Result<ModelQuery<'_>> {
        Ok(self.query_schema(self.registry.get(model)?))
    }

    pub(crate) fn query_schema(&self, schema: Arc<ModelSchema>) -> ModelQuery<'_> {
        ModelQuery::new(self, schema)
    }

    /// Creates a new, empty instance of `model`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownModel`] if it is not registered.
    pub fn make(&self, model: &str) -> Result<Model> {
        Ok(Model::new(&self.registry.get(model)?))
    }

    /// Creates a new instance of `model` filled with `values`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownModel`] if it is not registered.
    pub fn make_with(&self, model: &str, values: Row) -> Result<Model> {
        let instance = self.make(model)?;
        instance.fill(values);
        Ok(instance)
    }

    /// Finds an instance of `model` by primary key.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownModel`] or query errors.
    pub fn find(&self, model: &str, id: impl Into<Value>) -> Result<Option<Model>> {
        self.query(model)?.find(id)
    }

    /// Saves `model` and its loaded relations.
    ///
    /// Returns `false` if validation failed.
    ///
    /// # Errors
    ///
    /// See [`ChangeTracker::save`].
    pub fn save(&self, model: &Model) -> Result<bool> {
        ChangeTracker::new(self).save(model)
    }

    /// Deletes `model` by primary key.
    ///
    /// # Errors
    ///
    /// See [`ModelQuery::delete`].
    pub fn delete(&self, model: &Model) -> Result<bool> {
        self.query_schema(model.schema()).delete(model)
    }

    /// Eager-loads `relations` onto instances that are already loaded.
    ///
    /// Every instance must be of the same model.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownRelation`] or query errors.
    pub fn load(&self, models: &[Model], relations: &[&str]) -> Result<()> {
        let Some(first) = models.first() else {
            return Ok(());
        };
        let with: Vec<String> = relations.iter().map(ToString::to_string).collect();
        load_relations(self, &first.schema(), models, &with)
    }

    /// Validates `model` and stores the result on it.
    ///
    /// Without a validator or declared rules the result is always valid.
    pub fn validate(&self, model: &Model) -> ValidationResult {
        model.normalize();
        let result = self.run_validation(model).unwrap_or_default();
        model.set_validation(result.clone());
        result
    }

    /// Validates `model` and fails if it is invalid.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::Validation`] with the collected messages.
    pub fn assert_valid(&self, model: &Model) -> Result<()> {
        let result = self.validate(model);
        if result.invalid() {
            return Err(OrmError::Validation {
                model: model.model_name(),
                result,
            });
        }
        Ok(())
    }

    pub(crate) fn run_validation(&self, model: &Model) -> Option<ValidationResult> {
        let validator = self.validator.as_ref()?;
        let schema = model.schema();
        if schema.rules().is_empty() {
            return None;
        }
        let attributes = model.attributes();
        Some(validator.validate(schema.name(), &attributes, schema.rules()))
    }
}

impl fmt::Debug for Orm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orm")
            .field("registry", &self.registry)
            .field("connections", &self.connections)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}
