//! Model instances.
//!
//! A [`Model`] is a cheap, clonable handle to one row's worth of state:
//! mapped attributes, the snapshot taken when it was last loaded or saved,
//! auxiliary columns with no declared field, and loaded relations. Clones
//! share state, so the same instance can sit in several relation slots and
//! be recognised there by identity.

mod properties;

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use by_address::ByAddress;
use indexmap::{IndexMap, IndexSet};
use keel_core::{Row, Value};
use tracing::trace;

use crate::error::{OrmError, Result};
use crate::schema::ModelSchema;
use crate::validation::ValidationResult;

/// Where an instance is in its persistence lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistState {
    /// Never written, or deleted.
    New,
    /// A save touching this instance is in progress.
    Persisting,
    /// Matches a stored row.
    Persisted,
}

/// The contents of a loaded relation slot.
#[derive(Debug, Clone)]
pub enum Related {
    /// A to-one relation.
    One(Option<Model>),
    /// A to-many relation.
    Many(Vec<Model>),
}

impl Related {
    /// Iterates over the related instances.
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        let (one, many) = match self {
            Self::One(model) => (model.as_ref(), &[][..]),
            Self::Many(models) => (None, models.as_slice()),
        };
        one.into_iter().chain(many)
    }

    fn same_instances(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::One(None), Self::One(None)) => true,
            (Self::One(Some(a)), Self::One(Some(b))) => a.ptr_eq(b),
            (Self::Many(a), Self::Many(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.ptr_eq(b))
            }
            _ => false,
        }
    }

    fn is_empty(&self) -> bool {
        self.models().next().is_none()
    }
}

impl From<Model> for Related {
    fn from(model: Model) -> Self {
        Self::One(Some(model))
    }
}

impl From<Option<Model>> for Related {
    fn from(model: Option<Model>) -> Self {
        Self::One(model)
    }
}

impl From<Vec<Model>> for Related {
    fn from(models: Vec<Model>) -> Self {
        Self::Many(models)
    }
}

pub(crate) struct ModelData {
    schema: Arc<ModelSchema>,
    attributes: Row,
    original: Option<Row>,
    auxiliary: Row,
    queued: IndexSet<String>,
    relations: IndexMap<String, Related>,
    original_relations: IndexMap<String, Related>,
    state: PersistState,
    validation: Option<ValidationResult>,
}

/// Identity of an instance, shared by all clones of its handle.
pub(crate) type Identity = ByAddress<Rc<RefCell<ModelData>>>;

/// A model instance.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use keel_core::{row, Value};
/// use keel_orm::{Model, ModelSchema};
///
/// let schema = Arc::new(ModelSchema::new("User").field("name").table("users"));
/// let user = Model::hydrate(&schema, row! { "id" => 1, "name" => "Ada", "rank" => 3 });
///
/// assert!(user.exists());
/// assert!(!user.is_dirty());
/// assert_eq!(user.auxiliary("rank"), Some(Value::Int(3)));
///
/// user.set("name", "Grace");
/// assert_eq!(user.dirty().keys().collect::<Vec<_>>(), vec!["name"]);
/// ```
#[derive(Clone)]
pub struct Model(Rc<RefCell<ModelData>>);

impl Model {
    /// Creates an empty, never-saved instance.
    #[must_use]
    pub fn new(schema: &Arc<ModelSchema>) -> Self {
        Self(Rc::new(RefCell::new(ModelData {
            schema: Arc::clone(schema),
            attributes: Row::new(),
            original: None,
            auxiliary: Row::new(),
            queued: IndexSet::new(),
            relations: IndexMap::new(),
            original_relations: IndexMap::new(),
            state: PersistState::New,
            validation: None,
        })))
    }

    /// Builds a persisted instance from a stored row.
    ///
    /// Mapped and readonly columns become attributes; columns of computed or
    /// ignored fields are dropped; anything else is kept as an auxiliary
    /// attribute.
    #[must_use]
    pub fn hydrate(schema: &Arc<ModelSchema>, row: Row) -> Self {
        let model = Self::new(schema);
        {
            let mut guard = model.0.borrow_mut();
            let data = &mut *guard;
            data.absorb(row);
            data.original = Some(data.attributes.clone());
            data.state = PersistState::Persisted;
        }
        model
    }

    /// Returns the schema of this instance.
    #[must_use]
    pub fn schema(&self) -> Arc<ModelSchema> {
        Arc::clone(&self.0.borrow().schema)
    }

    /// Returns the model name.
    #[must_use]
    pub fn model_name(&self) -> String {
        self.0.borrow().schema.name().to_string()
    }

    /// Returns an attribute, a computed field or an auxiliary attribute, in
    /// that order.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        let data = self.0.borrow();
        if let Some(value) = data.attributes.get(name) {
            return Some(value.clone());
        }
        if let Some(compute) = data.schema.field_def_for(name).and_then(|f| f.computation()) {
            return Some(compute(&data.attributes));
        }
        data.auxiliary.get(name).cloned()
    }

    /// Sets a field. Undeclared names are stored as auxiliary attributes.
    ///
    /// Computed and ignored fields are not stored.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> &Self {
        let value = value.into();
        let mut guard = self.0.borrow_mut();
        let data = &mut *guard;
        match data.schema.field_def_for(name) {
            Some(field) if field.computation().is_some() || field.is_ignored() => {
                trace!(model = data.schema.name(), field = name, "Ignoring write to unstored field");
            }
            Some(_) => {
                data.attributes.insert(name.to_string(), value);
            }
            None if name == data.schema.primary_key_name() => {
                data.attributes.insert(name.to_string(), value);
            }
            None => {
                data.auxiliary.insert(name.to_string(), value);
            }
        }
        drop(guard);
        self
    }

    /// Copies `values` onto the instance.
    ///
    /// Mapped fields are assigned; relation names and readonly, computed or
    /// ignored fields are skipped; unknown keys become auxiliary attributes.
    pub fn fill(&self, values: Row) -> &Self {
        let mut guard = self.0.borrow_mut();
        let data = &mut *guard;
        for (name, value) in values {
            if data.schema.relation_spec(&name).is_some() {
                continue;
            }
            if data.schema.is_mapped(&name) {
                data.attributes.insert(name, value);
            } else if data.schema.field_def_for(&name).is_none() {
                data.auxiliary.insert(name, value);
            }
        }
        drop(guard);
        self
    }

    /// Returns the primary key value, if set.
    #[must_use]
    pub fn id(&self) -> Option<Value> {
        let data = self.0.borrow();
        data.attributes
            .get(data.schema.primary_key_name())
            .filter(|value| !value.is_null())
            .cloned()
    }

    /// Returns whether the instance has a primary key value.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.id().is_some()
    }

    /// Returns the persistence state.
    #[must_use]
    pub fn state(&self) -> PersistState {
        self.0.borrow().state
    }

    /// Returns the attributes to write: mapped attributes that differ from
    /// the snapshot, plus queued foreign keys.
    ///
    /// An instance that was never saved is fully dirty.
    #[must_use]
    pub fn dirty(&self) -> Row {
        let data = self.0.borrow();
        let mut dirty: Row = data
            .attributes
            .iter()
            .filter(|(name, _)| data.schema.is_mapped(name))
            .filter(|(name, value)| {
                data.original
                    .as_ref()
                    .map_or(true, |original| {
                        original
                            .get(name.as_str())
                            .map_or(true, |stored| !stored.same_stored(value))
                    })
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for name in &data.queued {
            if let Some(value) = data.auxiliary.get(name) {
                dirty.insert(name.clone(), value.clone());
            }
        }
        trace!(model = data.schema.name(), dirty = dirty.len(), "Computed dirty attributes");
        dirty
    }

    /// Returns whether saving would write anything: dirty attributes,
    /// queued foreign keys or replaced relations.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty() || self.has_replaced_relations()
    }

    fn has_replaced_relations(&self) -> bool {
        let data = self.0.borrow();
        data.relations.iter().any(|(name, current)| {
            data.original_relations
                .get(name)
                .map_or(!current.is_empty(), |original| !current.same_instances(original))
        })
    }

    /// Returns the relation slot `name` as it was last loaded or saved.
    pub(crate) fn original_relation(&self, name: &str) -> Option<Related> {
        self.0.borrow().original_relations.get(name).cloned()
    }

    /// Takes a new snapshot of attributes and relations.
    pub fn sync_original(&self) {
        let mut guard = self.0.borrow_mut();
        let data = &mut *guard;
        data.original = Some(data.attributes.clone());
        data.queued.clear();
        data.original_relations = data.relations.clone();
    }

    /// Returns a copy of the attributes.
    #[must_use]
    pub fn attributes(&self) -> Row {
        self.0.borrow().attributes.clone()
    }

    /// Borrows the attributes.
    pub(crate) fn attributes_ref(&self) -> Ref<'_, Row> {
        Ref::map(self.0.borrow(), |data| &data.attributes)
    }

    /// Returns an auxiliary attribute.
    #[must_use]
    pub fn auxiliary(&self, name: &str) -> Option<Value> {
        self.0.borrow().auxiliary.get(name).cloned()
    }

    /// Removes an auxiliary attribute.
    pub(crate) fn forget_auxiliary(&self, name: &str) -> Option<Value> {
        let mut guard = self.0.borrow_mut();
        let data = &mut *guard;
        data.queued.shift_remove(name);
        data.auxiliary.shift_remove(name)
    }

    /// Sets a foreign key column.
    ///
    /// A mapped column is assigned like any attribute. Otherwise the value
    /// is kept as an auxiliary attribute and queued for the next write if
    /// it changed.
    pub fn set_foreign_key(&self, column: &str, value: Value) {
        let mut guard = self.0.borrow_mut();
        let data = &mut *guard;
        if data.schema.is_mapped(column) {
            data.attributes.insert(column.to_string(), value);
        } else if data.auxiliary.get(column) != Some(&value) || data.original.is_none() {
            data.auxiliary.insert(column.to_string(), value);
            data.queued.insert(column.to_string());
        }
    }

    /// Returns a loaded relation slot.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::RelationNotLoaded`] if the relation was never
    /// loaded or assigned.
    pub fn relation(&self, name: &str) -> Result<Related> {
        let data = self.0.borrow();
        data.relations
            .get(name)
            .cloned()
            .ok_or_else(|| OrmError::RelationNotLoaded {
                model: data.schema.name().to_string(),
                relation: name.to_string(),
            })
    }

    /// Returns a loaded to-one relation.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::RelationNotLoaded`] if it is not loaded, or
    /// [`OrmError::UnsupportedRelation`] if it is a to-many relation.
    pub fn related_one(&self, name: &str) -> Result<Option<Model>> {
        match self.relation(name)? {
            Related::One(model) => Ok(model),
            Related::Many(_) => Err(OrmError::UnsupportedRelation {
                relation: name.to_string(),
                operation: "single-instance access",
            }),
        }
    }

    /// Returns a loaded to-many relation.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::RelationNotLoaded`] if it is not loaded, or
    /// [`OrmError::UnsupportedRelation`] if it is a to-one relation.
    pub fn related_many(&self, name: &str) -> Result<Vec<Model>> {
        match self.relation(name)? {
            Related::Many(models) => Ok(models),
            Related::One(_) => Err(OrmError::UnsupportedRelation {
                relation: name.to_string(),
                operation: "collection access",
            }),
        }
    }

    /// Returns whether relation `name` is loaded.
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.0.borrow().relations.contains_key(name)
    }

    /// Returns the names of the loaded relations.
    #[must_use]
    pub fn loaded_relations(&self) -> Vec<String> {
        self.0.borrow().relations.keys().cloned().collect()
    }

    /// Assigns a relation slot.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::UnknownRelation`] if the schema declares no such
    /// relation, or [`OrmError::UnsupportedRelation`] if the shape does not
    /// match the relation kind.
    pub fn set_related(&self, name: &str, related: impl Into<Related>) -> Result<()> {
        let related = related.into();
        let mut guard = self.0.borrow_mut();
        let data = &mut *guard;
        let spec = data
            .schema
            .relation_spec(name)
            .ok_or_else(|| OrmError::UnknownRelation {
                model: data.schema.name().to_string(),
                relation: name.to_string(),
            })?;
        if spec.kind.is_single() != matches!(related, Related::One(_)) {
            return Err(OrmError::UnsupportedRelation {
                relation: name.to_string(),
                operation: if spec.kind.is_single() {
                    "assigning a collection"
                } else {
                    "assigning a single instance"
                },
            });
        }
        data.relations.insert(name.to_string(), related);
        Ok(())
    }

    /// Stores an eager-loaded relation and marks it as unchanged.
    pub(crate) fn set_loaded(&self, name: &str, related: Related) {
        let mut guard = self.0.borrow_mut();
        let data = &mut *guard;
        data.original_relations.insert(name.to_string(), related.clone());
        data.relations.insert(name.to_string(), related);
    }

    /// Adds `model` to relation slot `name`: assigned to a to-one slot,
    /// appended to a to-many slot unless already present.
    ///
    /// A to-many slot that was never loaded is only started on instances
    /// that do not exist yet, whose stored collection is known to be empty.
    pub(crate) fn attach(&self, name: &str, model: &Self, single: bool) {
        let exists = self.exists();
        let mut guard = self.0.borrow_mut();
        let data = &mut *guard;
        if single {
            data.relations
                .insert(name.to_string(), Related::One(Some(model.clone())));
            return;
        }
        match data.relations.get_mut(name) {
            Some(Related::Many(models)) => {
                if !models.iter().any(|m| m.ptr_eq(model)) {
                    models.push(model.clone());
                }
            }
            Some(Related::One(_)) => {}
            None if !exists => {
                data.relations
                    .insert(name.to_string(), Related::Many(vec![model.clone()]));
            }
            None => {}
        }
    }

    /// Applies each field's transforms to its attribute.
    pub fn normalize(&self) {
        let mut guard = self.0.borrow_mut();
        let data = &mut *guard;
        let schema = Arc::clone(&data.schema);
        for field in schema.fields() {
            if let Some(value) = data.attributes.get_mut(field.name()) {
                *value = field.normalize(std::mem::take(value));
            }
        }
    }

    /// Returns the result of the last validation run, if any.
    #[must_use]
    pub fn validation(&self) -> Option<ValidationResult> {
        self.0.borrow().validation.clone()
    }

    pub(crate) fn set_validation(&self, result: ValidationResult) {
        self.0.borrow_mut().validation = Some(result);
    }

    /// Returns whether both handles point at the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn identity(&self) -> Identity {
        ByAddress(Rc::clone(&self.0))
    }

    pub(crate) fn set_state(&self, state: PersistState) {
        self.0.borrow_mut().state = state;
    }

    /// Merges a row returned by the database into the attributes.
    pub(crate) fn refresh_from(&self, row: Row) {
        self.0.borrow_mut().absorb(row);
    }

    /// Forgets the stored identity after a delete.
    pub(crate) fn mark_deleted(&self) {
        let mut guard = self.0.borrow_mut();
        let data = &mut *guard;
        let key = data.schema.primary_key_name().to_string();
        data.attributes.insert(key, Value::Null);
        data.original = None;
        data.state = PersistState::New;
    }
}

/// Persistence-related state captured before a save, restored if the
/// save's transaction is rolled back.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    attributes: Row,
    original: Option<Row>,
    auxiliary: Row,
    queued: IndexSet<String>,
    original_relations: IndexMap<String, Related>,
    state: PersistState,
}

impl Model {
    pub(crate) fn checkpoint(&self) -> Checkpoint {
        let data = self.0.borrow();
        Checkpoint {
            attributes: data.attributes.clone(),
            original: data.original.clone(),
            auxiliary: data.auxiliary.clone(),
            queued: data.queued.clone(),
            original_relations: data.original_relations.clone(),
            state: data.state,
        }
    }

    pub(crate) fn restore(&self, checkpoint: Checkpoint) {
        let mut data = self.0.borrow_mut();
        data.attributes = checkpoint.attributes;
        data.original = checkpoint.original;
        data.auxiliary = checkpoint.auxiliary;
        data.queued = checkpoint.queued;
        data.original_relations = checkpoint.original_relations;
        data.state = checkpoint.state;
    }
}

impl ModelData {
    fn absorb(&mut self, row: Row) {
        for (column, value) in row {
            match self.schema.field_def_for(&column) {
                Some(field) if field.computation().is_some() || field.is_ignored() => {}
                Some(_) => {
                    self.attributes.insert(column, value);
                }
                None if column == self.schema.primary_key_name() => {
                    self.attributes.insert(column, value);
                }
                None => {
                    self.queued.shift_remove(&column);
                    self.auxiliary.insert(column, value);
                }
            }
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(data) => f
                .debug_struct("Model")
                .field("model", &data.schema.name())
                .field("state", &data.state)
                .field("attributes", &data.attributes)
                .field("relations", &data.relations.keys().collect::<Vec<_>>())
                .finish_non_exhaustive(),
            Err(_) => f.write_str("Model { <borrowed> }"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, RelationSpec};
    use keel_core::row;

    fn schema() -> Arc<ModelSchema> {
        Arc::new(
            ModelSchema::new("User")
                .table("users")
                .field("name")
                .field("email")
                .field_def(FieldDef::new("created_at").readonly())
                .field_def(FieldDef::new("password_confirmation").ignored())
                .field_def(FieldDef::new("display").computed(|row| {
                    Value::from(format!("<{}>", row.get("name").cloned().unwrap_or_default()))
                }))
                .relation(RelationSpec::has_many("posts", "Post"))
                .relation(RelationSpec::belongs_to("team", "Team")),
        )
    }

    #[test]
    fn test_new_instance_is_fully_dirty() {
        let user = Model::new(&schema());
        user.set("name", "Ada").set("email", "ada@example.com");

        assert!(!user.exists());
        assert_eq!(user.state(), PersistState::New);
        assert_eq!(user.dirty().len(), 2);
    }

    #[test]
    fn test_hydrate_sorts_columns() {
        let user = Model::hydrate(
            &schema(),
            row! {
                "id" => 7,
                "name" => "Ada",
                "created_at" => "2024-01-01",
                "password_confirmation" => "secret",
                "team_id" => 3,
            },
        );

        assert_eq!(user.id(), Some(Value::Int(7)));
        assert_eq!(user.get("created_at"), Some(Value::from("2024-01-01")));
        assert_eq!(user.get("password_confirmation"), None);
        assert_eq!(user.auxiliary("team_id"), Some(Value::Int(3)));
        assert_eq!(user.get("display"), Some(Value::from("<Ada>")));
        assert!(!user.is_dirty());
    }

    #[test]
    fn test_dirty_tracks_changes_only() {
        let user = Model::hydrate(&schema(), row! { "id" => 1, "name" => "Ada", "email" => "a@x.io" });
        user.set("name", "Ada");
        assert!(!user.is_dirty());

        user.set("name", "Grace").set("created_at", "now");
        assert_eq!(user.dirty(), row! { "name" => "Grace" });

        user.sync_original();
        assert!(!user.is_dirty());
    }

    #[test]
    fn test_boolean_matches_stored_integer() {
        let schema = Arc::new(ModelSchema::new("User").table("users").field("active"));
        let user = Model::hydrate(&schema, row! { "id" => 1, "active" => 1 });
        user.set("active", true);
        assert!(!user.is_dirty());

        user.set("active", false);
        assert_eq!(user.dirty(), row! { "active" => false });
    }

    #[test]
    fn test_fill_skips_relations_and_unmapped_fields() {
        let user = Model::new(&schema());
        user.fill(row! {
            "name" => "Ada",
            "posts" => "nope",
            "created_at" => "later",
            "nickname" => "countess",
        });

        assert_eq!(user.attributes(), row! { "name" => "Ada" });
        assert_eq!(user.auxiliary("nickname"), Some(Value::from("countess")));
    }

    #[test]
    fn test_queued_foreign_key_is_dirty() {
        let user = Model::hydrate(&schema(), row! { "id" => 1, "team_id" => 2 });
        user.set_foreign_key("team_id", Value::Int(2));
        assert!(!user.is_dirty());

        user.set_foreign_key("team_id", Value::Int(5));
        assert_eq!(user.dirty(), row! { "team_id" => 5 });
    }

    #[test]
    fn test_unloaded_relation_is_an_error() {
        let user = Model::new(&schema());
        assert!(matches!(
            user.relation("posts"),
            Err(OrmError::RelationNotLoaded { .. })
        ));

        user.set_related("posts", Vec::<Model>::new()).unwrap();
        assert!(user.related_many("posts").unwrap().is_empty());
        assert!(matches!(
            user.set_related("team", Vec::<Model>::new()),
            Err(OrmError::UnsupportedRelation { .. })
        ));
        assert!(matches!(
            user.set_related("friends", Vec::<Model>::new()),
            Err(OrmError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_replacing_a_relation_makes_instance_dirty() {
        let schema = schema();
        let team_schema = Arc::new(ModelSchema::new("Team").table("teams"));
        let user = Model::hydrate(&schema, row! { "id" => 1 });
        let team = Model::hydrate(&team_schema, row! { "id" => 3 });

        user.set_loaded("team", Related::One(Some(team.clone())));
        assert!(!user.is_dirty());

        user.set_related("team", Model::hydrate(&team_schema, row! { "id" => 3 })).unwrap();
        assert!(user.is_dirty());

        user.set_related("team", team).unwrap();
        assert!(!user.is_dirty());
    }

    #[test]
    fn test_normalize_runs_field_transforms() {
        let schema = Arc::new(
            ModelSchema::new("User")
                .table("users")
                .field_def(FieldDef::new("email").transform(crate::schema::transforms::trim())),
        );
        let user = Model::new(&schema);
        user.set("email", "  ada@example.com ");
        user.normalize();
        assert_eq!(user.get("email"), Some(Value::from("ada@example.com")));
    }

    #[test]
    fn test_mark_deleted() {
        let user = Model::hydrate(&schema(), row! { "id" => 1, "name" => "Ada" });
        user.mark_deleted();
        assert!(!user.exists());
        assert_eq!(user.state(), PersistState::New);
        assert!(user.is_dirty());
    }
}
