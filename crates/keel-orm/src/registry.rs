//! Registered model schemas and resolved relation keys.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{OrmError, Result};
use crate::naming::{NamingStrategy, SnakeCaseNaming};
use crate::schema::{ModelSchema, RelationKind, RelationSpec};

/// A relation with every key resolved to a column name.
#[derive(Debug, Clone)]
pub struct ResolvedRelation {
    /// Relation name on the owner.
    pub name: String,
    /// Relation kind.
    pub kind: RelationKind,
    /// Owner schema.
    pub owner: Arc<ModelSchema>,
    /// Target schema.
    pub target: Arc<ModelSchema>,
    /// Intermediate schema for through relations.
    pub through: Option<Arc<ModelSchema>>,
    /// `BelongsTo`: owner column. `HasOne`/`HasMany`: target column.
    /// Through: target column referencing the intermediate.
    pub foreign_key: String,
    /// `BelongsTo`: target column. Others: owner column.
    pub local_key: String,
    /// Through: intermediate column referencing the owner.
    pub first_key: String,
    /// Delete a replaced `HasOne` target on update.
    pub destroy_dependent: bool,
}

impl ResolvedRelation {
    /// Returns the intermediate schema of a through relation.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnsupportedRelation`] for direct relations.
    pub fn through_schema(&self) -> Result<&Arc<ModelSchema>> {
        self.through.as_ref().ok_or_else(|| OrmError::UnsupportedRelation {
            relation: self.name.clone(),
            operation: "through joins",
        })
    }
}

/// Model schemas by name.
///
/// Schemas are resolved once at registration: the table name is derived
/// from the naming strategy and relation declarations are checked against
/// the fields.
#[derive(Clone)]
pub struct Registry {
    naming: Arc<dyn NamingStrategy>,
    models: HashMap<String, Arc<ModelSchema>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates a registry with [`SnakeCaseNaming`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_naming(SnakeCaseNaming)
    }

    /// Creates a registry with a custom naming strategy.
    pub fn with_naming(naming: impl NamingStrategy + 'static) -> Self {
        Self {
            naming: Arc::new(naming),
            models: HashMap::new(),
        }
    }

    /// Registers a model schema, replacing any schema of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::InvalidRelationField`] if a relation shares its
    /// name with a readonly, computed or ignored field.
    pub fn register(&mut self, mut schema: ModelSchema) -> Result<Arc<ModelSchema>> {
        for relation in schema.relations() {
            if schema
                .field_def_for(&relation.name)
                .is_some_and(|field| !field.is_mapped())
            {
                return Err(OrmError::InvalidRelationField {
                    model: schema.name().to_string(),
                    relation: relation.name.clone(),
                });
            }
        }

        if !schema.has_table() {
            let table = self.naming_for(&schema).table_name(schema.name());
            schema.set_table(table);
        }

        debug!(model = schema.name(), table = schema.table_name(), "Registered model");
        let schema = Arc::new(schema);
        self.models.insert(schema.name().to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Returns a registered schema.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownModel`] if `name` is not registered.
    pub fn get(&self, name: &str) -> Result<Arc<ModelSchema>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownModel(name.to_string()))
    }

    /// Returns whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Resolves the keys of relation `name` on `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownRelation`] if the owner declares no such
    /// relation, or [`OrmError::UnknownModel`] if its target or
    /// intermediate model is not registered.
    pub fn relation(&self, owner: &Arc<ModelSchema>, name: &str) -> Result<ResolvedRelation> {
        let spec = owner
            .relation_spec(name)
            .ok_or_else(|| OrmError::UnknownRelation {
                model: owner.name().to_string(),
                relation: name.to_string(),
            })?;
        self.resolve(owner, spec)
    }

    /// Resolves every relation declared on `owner`.
    ///
    /// # Errors
    ///
    /// See [`Registry::relation`].
    pub fn relations(&self, owner: &Arc<ModelSchema>) -> Result<Vec<ResolvedRelation>> {
        owner
            .relations()
            .map(|spec| self.resolve(owner, spec))
            .collect()
    }

    fn resolve(&self, owner: &Arc<ModelSchema>, spec: &RelationSpec) -> Result<ResolvedRelation> {
        let target = self.get(&spec.target)?;
        let naming = self.naming_for(owner);
        let through = spec.through.as_deref().map(|name| self.get(name)).transpose()?;

        let (foreign_key, local_key, first_key) = match (spec.kind, &through) {
            (RelationKind::BelongsTo, _) => (
                spec.foreign_key.clone().unwrap_or_else(|| {
                    naming.foreign_key(target.name(), target.primary_key_name())
                }),
                spec.local_key
                    .clone()
                    .unwrap_or_else(|| target.primary_key_name().to_string()),
                String::new(),
            ),
            (RelationKind::HasOne | RelationKind::HasMany, _) => (
                spec.foreign_key.clone().unwrap_or_else(|| {
                    naming.foreign_key(owner.name(), owner.primary_key_name())
                }),
                spec.local_key
                    .clone()
                    .unwrap_or_else(|| owner.primary_key_name().to_string()),
                String::new(),
            ),
            (RelationKind::HasOneThrough | RelationKind::HasManyThrough, Some(through)) => (
                spec.second_key.clone().unwrap_or_else(|| {
                    naming.foreign_key(through.name(), through.primary_key_name())
                }),
                spec.local_key
                    .clone()
                    .unwrap_or_else(|| owner.primary_key_name().to_string()),
                spec.first_key.clone().unwrap_or_else(|| {
                    naming.foreign_key(owner.name(), owner.primary_key_name())
                }),
            ),
            (RelationKind::HasOneThrough | RelationKind::HasManyThrough, None) => {
                return Err(OrmError::UnsupportedRelation {
                    relation: spec.name.clone(),
                    operation: "resolution without an intermediate model",
                });
            }
        };

        Ok(ResolvedRelation {
            name: spec.name.clone(),
            kind: spec.kind,
            owner: Arc::clone(owner),
            target,
            through,
            foreign_key,
            local_key,
            first_key,
            destroy_dependent: spec.destroy_dependent,
        })
    }

    fn naming_for<'a>(&'a self, schema: &'a ModelSchema) -> &'a dyn NamingStrategy {
        schema
            .naming_override()
            .map_or(self.naming.as_ref(), |naming| naming.as_ref())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.models.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("models", &names).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                ModelSchema::new("Country")
                    .field("name")
                    .relation(RelationSpec::has_many("users", "User"))
                    .relation(RelationSpec::has_many_through("posts", "BlogPost", "User")),
            )
            .unwrap();
        registry
            .register(
                ModelSchema::new("User")
                    .field("country_id")
                    .relation(RelationSpec::belongs_to("country", "Country")),
            )
            .unwrap();
        registry
            .register(ModelSchema::new("BlogPost").table("posts").field("user_id"))
            .unwrap();
        registry
    }

    #[test]
    fn test_tables_are_derived_unless_set() {
        let registry = registry();
        assert_eq!(registry.get("Country").unwrap().table_name(), "countries");
        assert_eq!(registry.get("BlogPost").unwrap().table_name(), "posts");
        assert!(matches!(registry.get("Nope"), Err(OrmError::UnknownModel(_))));
    }

    #[test]
    fn test_relation_keys() {
        let registry = registry();
        let country = registry.get("Country").unwrap();
        let user = registry.get("User").unwrap();

        let belongs = registry.relation(&user, "country").unwrap();
        assert_eq!(belongs.foreign_key, "country_id");
        assert_eq!(belongs.local_key, "id");

        let has_many = registry.relation(&country, "users").unwrap();
        assert_eq!(has_many.foreign_key, "country_id");
        assert_eq!(has_many.local_key, "id");

        let through = registry.relation(&country, "posts").unwrap();
        assert_eq!(through.first_key, "country_id");
        assert_eq!(through.foreign_key, "user_id");
        assert_eq!(through.through_schema().unwrap().name(), "User");
    }

    #[test]
    fn test_unknown_relation() {
        let registry = registry();
        let user = registry.get("User").unwrap();
        assert!(matches!(
            registry.relation(&user, "posts"),
            Err(OrmError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_relation_on_readonly_field_is_rejected() {
        let mut registry = Registry::new();
        let result = registry.register(
            ModelSchema::new("Post")
                .field_def(FieldDef::new("author").readonly())
                .relation(RelationSpec::belongs_to("author", "User")),
        );
        assert!(matches!(result, Err(OrmError::InvalidRelationField { .. })));
    }
}
