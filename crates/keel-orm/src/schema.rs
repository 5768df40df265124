//! Per-model metadata.
//!
//! A [`ModelSchema`] is declared once per model type and registered in a
//! [`Registry`](crate::Registry). It lists the model's fields, how they are
//! normalized and validated, and the relations it declares.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use keel_core::{Row, Value};

use crate::naming::NamingStrategy;
use crate::validation::{Rule, RuleSet};

/// Rewrites an attribute value before it is validated and saved.
pub type Transform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Derives a read-only value from the attributes.
pub type Computed = Arc<dyn Fn(&Row) -> Value + Send + Sync>;

/// Common transforms.
pub mod transforms {
    use std::sync::Arc;

    use keel_core::Value;

    use super::Transform;

    /// Trims surrounding whitespace from text.
    #[must_use]
    pub fn trim() -> Transform {
        Arc::new(|value| match value {
            Value::Text(s) => Value::Text(s.trim().to_string()),
            other => other,
        })
    }

    /// Lower-cases text.
    #[must_use]
    pub fn lowercase() -> Transform {
        Arc::new(|value| match value {
            Value::Text(s) => Value::Text(s.to_lowercase()),
            other => other,
        })
    }

    /// Turns empty text into NULL.
    #[must_use]
    pub fn null_if_empty() -> Transform {
        Arc::new(|value| match value {
            Value::Text(s) if s.is_empty() => Value::Null,
            other => other,
        })
    }
}

/// A declared field.
#[derive(Clone)]
pub struct FieldDef {
    name: String,
    readonly: bool,
    ignored: bool,
    computed: Option<Computed>,
    transforms: Vec<Transform>,
}

impl FieldDef {
    /// Creates a persisted field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            readonly: false,
            ignored: false,
            computed: None,
            transforms: Vec::new(),
        }
    }

    /// Marks the field as loaded but never written.
    #[must_use]
    pub const fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Marks the field as neither loaded nor written.
    #[must_use]
    pub const fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Derives the field from the other attributes.
    #[must_use]
    pub fn computed(mut self, compute: impl Fn(&Row) -> Value + Send + Sync + 'static) -> Self {
        self.computed = Some(Arc::new(compute));
        self
    }

    /// Appends a normalization step.
    #[must_use]
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Returns the field (column) name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the field is read from and written to the table.
    #[must_use]
    pub const fn is_mapped(&self) -> bool {
        !self.readonly && !self.ignored && self.computed.is_none()
    }

    /// Returns whether the field is loaded but never written.
    #[must_use]
    pub const fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Returns whether the field is skipped entirely.
    #[must_use]
    pub const fn is_ignored(&self) -> bool {
        self.ignored
    }

    /// Returns the computation for a computed field.
    #[must_use]
    pub fn computation(&self) -> Option<&Computed> {
        self.computed.as_ref()
    }

    /// Applies the transforms in declaration order.
    #[must_use]
    pub fn normalize(&self, value: Value) -> Value {
        self.transforms.iter().fold(value, |value, transform| transform(value))
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("name", &self.name)
            .field("readonly", &self.readonly)
            .field("ignored", &self.ignored)
            .field("computed", &self.computed.is_some())
            .field("transforms", &self.transforms.len())
            .finish()
    }
}

/// Relation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// The owner holds a key referencing one target.
    BelongsTo,
    /// One target holds a key referencing the owner.
    HasOne,
    /// Many targets hold a key referencing the owner.
    HasMany,
    /// One target reached through an intermediate model.
    HasOneThrough,
    /// Many targets reached through an intermediate model.
    HasManyThrough,
}

impl RelationKind {
    /// Returns whether the relation holds at most one model.
    #[must_use]
    pub const fn is_single(self) -> bool {
        matches!(self, Self::BelongsTo | Self::HasOne | Self::HasOneThrough)
    }

    /// Returns whether the relation goes through an intermediate model.
    #[must_use]
    pub const fn is_through(self) -> bool {
        matches!(self, Self::HasOneThrough | Self::HasManyThrough)
    }
}

/// A declared relation.
///
/// Keys left unset are derived by the naming strategy:
///
/// | kind | `foreign_key` | `local_key` |
/// |------|---------------|-------------|
/// | `BelongsTo` | owner column, `<target>_<pk>` | target column, target pk |
/// | `HasOne` / `HasMany` | target column, `<owner>_<pk>` | owner column, owner pk |
///
/// Through relations use `first_key` (intermediate column referencing the
/// owner, `<owner>_<pk>`) and `second_key` (target column referencing the
/// intermediate, `<intermediate>_<pk>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    /// Relation name.
    pub name: String,
    /// Relation kind.
    pub kind: RelationKind,
    /// Target model name.
    pub target: String,
    /// Foreign key override.
    pub foreign_key: Option<String>,
    /// Local key override.
    pub local_key: Option<String>,
    /// Intermediate model for through relations.
    pub through: Option<String>,
    /// Intermediate column referencing the owner.
    pub first_key: Option<String>,
    /// Target column referencing the intermediate.
    pub second_key: Option<String>,
    /// Delete a replaced `HasOne` target on update.
    pub destroy_dependent: bool,
}

impl RelationSpec {
    fn new(name: impl Into<String>, kind: RelationKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            foreign_key: None,
            local_key: None,
            through: None,
            first_key: None,
            second_key: None,
            destroy_dependent: false,
        }
    }

    /// Declares a `BelongsTo` relation.
    pub fn belongs_to(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::BelongsTo, target)
    }

    /// Declares a `HasOne` relation.
    pub fn has_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasOne, target)
    }

    /// Declares a `HasMany` relation.
    pub fn has_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationKind::HasMany, target)
    }

    /// Declares a `HasOneThrough` relation.
    pub fn has_one_through(
        name: impl Into<String>,
        target: impl Into<String>,
        through: impl Into<String>,
    ) -> Self {
        Self {
            through: Some(through.into()),
            ..Self::new(name, RelationKind::HasOneThrough, target)
        }
    }

    /// Declares a `HasManyThrough` relation.
    pub fn has_many_through(
        name: impl Into<String>,
        target: impl Into<String>,
        through: impl Into<String>,
    ) -> Self {
        Self {
            through: Some(through.into()),
            ..Self::new(name, RelationKind::HasManyThrough, target)
        }
    }

    /// Overrides the foreign key.
    #[must_use]
    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    /// Overrides the local key.
    #[must_use]
    pub fn local_key(mut self, key: impl Into<String>) -> Self {
        self.local_key = Some(key.into());
        self
    }

    /// Overrides the intermediate column referencing the owner.
    #[must_use]
    pub fn first_key(mut self, key: impl Into<String>) -> Self {
        self.first_key = Some(key.into());
        self
    }

    /// Overrides the target column referencing the intermediate.
    #[must_use]
    pub fn second_key(mut self, key: impl Into<String>) -> Self {
        self.second_key = Some(key.into());
        self
    }

    /// Deletes the previous target when a `HasOne` relation is replaced.
    #[must_use]
    pub const fn destroy_dependent(mut self) -> Self {
        self.destroy_dependent = true;
        self
    }
}

/// Metadata for one model type.
///
/// # Example
///
/// ```rust
/// use keel_orm::schema::{transforms, FieldDef, ModelSchema, RelationSpec};
/// use keel_orm::validation::Rule;
///
/// let user = ModelSchema::new("User")
///     .field("name")
///     .field_def(FieldDef::new("email").transform(transforms::trim()).transform(transforms::lowercase()))
///     .field_def(FieldDef::new("created_at").readonly())
///     .relation(RelationSpec::has_many("posts", "Post"))
///     .rule("email", Rule::Email);
///
/// let mapped: Vec<&str> = user.mapped_fields().collect();
/// assert_eq!(mapped, vec!["id", "name", "email"]);
/// ```
#[derive(Clone)]
pub struct ModelSchema {
    name: String,
    table: Option<String>,
    primary_key: String,
    connection: Option<String>,
    fields: IndexMap<String, FieldDef>,
    relations: IndexMap<String, RelationSpec>,
    rules: RuleSet,
    naming: Option<Arc<dyn NamingStrategy>>,
}

impl ModelSchema {
    /// Starts a schema for `name` with an `id` primary key.
    pub fn new(name: impl Into<String>) -> Self {
        let mut fields = IndexMap::new();
        fields.insert(String::from("id"), FieldDef::new("id"));
        Self {
            name: name.into(),
            table: None,
            primary_key: String::from("id"),
            connection: None,
            fields,
            relations: IndexMap::new(),
            rules: RuleSet::new(),
            naming: None,
        }
    }

    /// Sets the table. Defaults to the naming strategy's table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Sets the primary key column. Defaults to `id`.
    #[must_use]
    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if self.primary_key == "id" && !self.relations.contains_key("id") {
            self.fields.shift_remove("id");
        }
        self.fields
            .entry(key.clone())
            .or_insert_with(|| FieldDef::new(key.clone()));
        self.primary_key = key;
        self
    }

    /// Runs this model's queries on a named connection.
    #[must_use]
    pub fn connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }

    /// Adds a plain persisted field.
    #[must_use]
    pub fn field(self, name: impl Into<String>) -> Self {
        self.field_def(FieldDef::new(name))
    }

    /// Adds a field definition. Redefining a name replaces the field.
    #[must_use]
    pub fn field_def(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Declares a relation.
    #[must_use]
    pub fn relation(mut self, relation: RelationSpec) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    /// Adds a validation rule.
    #[must_use]
    pub fn rule(mut self, field: impl Into<String>, rule: Rule) -> Self {
        self.rules.push(field, rule);
        self
    }

    /// Uses a naming strategy other than the registry's for this model.
    #[must_use]
    pub fn naming(mut self, naming: impl NamingStrategy + 'static) -> Self {
        self.naming = Some(Arc::new(naming));
        self
    }

    /// Returns the model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the table name. Set for every registered schema.
    #[must_use]
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or_default()
    }

    /// Returns the primary key column.
    #[must_use]
    pub fn primary_key_name(&self) -> &str {
        &self.primary_key
    }

    /// Returns the connection name, if not the default.
    #[must_use]
    pub fn connection_name(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    /// Returns a field definition.
    #[must_use]
    pub fn field_def_for(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name)
    }

    /// Returns every declared field.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.values()
    }

    /// Returns the fields read from and written to the table. Always
    /// includes the primary key.
    pub fn mapped_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .values()
            .filter(|field| field.is_mapped() || field.name == self.primary_key)
            .map(FieldDef::name)
    }

    /// Returns whether `name` is a mapped field.
    #[must_use]
    pub fn is_mapped(&self, name: &str) -> bool {
        name == self.primary_key || self.fields.get(name).is_some_and(FieldDef::is_mapped)
    }

    /// Returns a declared relation.
    #[must_use]
    pub fn relation_spec(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.get(name)
    }

    /// Returns every declared relation.
    pub fn relations(&self) -> impl Iterator<Item = &RelationSpec> {
        self.relations.values()
    }

    /// Returns the validation rules.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub(crate) fn naming_override(&self) -> Option<&Arc<dyn NamingStrategy>> {
        self.naming.as_ref()
    }

    pub(crate) fn set_table(&mut self, table: String) {
        self.table = Some(table);
    }

    pub(crate) fn has_table(&self) -> bool {
        self.table.is_some()
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_fields_skip_unpersisted() {
        let schema = ModelSchema::new("User")
            .field("name")
            .field_def(FieldDef::new("created_at").readonly())
            .field_def(FieldDef::new("password_confirmation").ignored())
            .field_def(FieldDef::new("label").computed(|row| {
                row.get("name").cloned().unwrap_or_default()
            }));

        let mapped: Vec<&str> = schema.mapped_fields().collect();
        assert_eq!(mapped, vec!["id", "name"]);
        assert!(schema.is_mapped("id"));
        assert!(!schema.is_mapped("created_at"));
        assert!(!schema.is_mapped("unknown"));
    }

    #[test]
    fn test_custom_primary_key_replaces_id() {
        let schema = ModelSchema::new("Country").primary_key("code").field("name");
        let mapped: Vec<&str> = schema.mapped_fields().collect();
        assert_eq!(mapped, vec!["code", "name"]);
        assert_eq!(schema.primary_key_name(), "code");
    }

    #[test]
    fn test_transforms_run_in_order() {
        let field = FieldDef::new("email")
            .transform(transforms::trim())
            .transform(transforms::lowercase())
            .transform(transforms::null_if_empty());

        assert_eq!(field.normalize(Value::from("  Ada@Example.COM ")), Value::from("ada@example.com"));
        assert_eq!(field.normalize(Value::from("   ")), Value::Null);
        assert_eq!(field.normalize(Value::Int(3)), Value::Int(3));
    }

    #[test]
    fn test_relation_builders() {
        let relation = RelationSpec::has_one("profile", "Profile")
            .foreign_key("owner_id")
            .destroy_dependent();
        assert_eq!(relation.kind, RelationKind::HasOne);
        assert_eq!(relation.foreign_key.as_deref(), Some("owner_id"));
        assert!(relation.destroy_dependent);

        let through = RelationSpec::has_many_through("posts", "Post", "User");
        assert!(through.kind.is_through());
        assert!(!through.kind.is_single());
        assert_eq!(through.through.as_deref(), Some("User"));
    }
}
