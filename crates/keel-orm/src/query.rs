//! Queries returning models, and cascading writes.

use std::sync::Arc;

use indexmap::IndexMap;
use keel_core::{Connection, QueryBuilder, Value};
use tracing::{debug, trace};

use crate::error::{OrmError, Result};
use crate::model::{Model, PersistState, Related};
use crate::orm::Orm;
use crate::registry::ResolvedRelation;
use crate::relation::strategy;
use crate::schema::{ModelSchema, RelationKind};
use crate::tracker::Journal;

/// A query over one model type.
///
/// Wraps a [`QueryBuilder`] on the model's table, hydrates the rows into
/// [`Model`]s and eager-loads the relations named with [`ModelQuery::with`].
#[derive(Debug, Clone)]
pub struct ModelQuery<'o> {
    orm: &'o Orm,
    schema: Arc<ModelSchema>,
    builder: QueryBuilder,
    with: Vec<String>,
}

impl<'o> ModelQuery<'o> {
    pub(crate) fn new(orm: &'o Orm, schema: Arc<ModelSchema>) -> Self {
        let builder = QueryBuilder::table(schema.table_name());
        Self {
            orm,
            schema,
            builder,
            with: Vec::new(),
        }
    }

    /// Returns the queried model's schema.
    #[must_use]
    pub const fn schema(&self) -> &Arc<ModelSchema> {
        &self.schema
    }

    /// Returns the underlying query builder.
    #[must_use]
    pub const fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    /// Adds `column operator value`.
    ///
    /// # Errors
    ///
    /// Returns [`keel_core::Error::InvalidOperator`] for operators outside
    /// the allow-list.
    pub fn where_(self, column: &str, operator: &str, value: impl Into<Value>) -> Result<Self> {
        self.map_builder(|builder| builder.where_(column, operator, value))
    }

    /// Adds `column = value`.
    #[must_use]
    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.builder = self.builder.where_eq(column, value);
        self
    }

    /// Adds `column IN (values)`.
    #[must_use]
    pub fn where_in<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.builder = self.builder.where_in(column, values);
        self
    }

    /// Adds `column IS NULL`.
    #[must_use]
    pub fn where_null(mut self, column: impl Into<String>) -> Self {
        self.builder = self.builder.where_null(column);
        self
    }

    /// Adds `column IS NOT NULL`.
    #[must_use]
    pub fn where_not_null(mut self, column: impl Into<String>) -> Self {
        self.builder = self.builder.where_not_null(column);
        self
    }

    /// Orders by `column` ascending.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.builder = self.builder.order_by(column);
        self
    }

    /// Orders by `column` descending.
    #[must_use]
    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.builder = self.builder.order_by_desc(column);
        self
    }

    /// Skips the first `offset` rows.
    #[must_use]
    pub fn skip(mut self, offset: u64) -> Self {
        self.builder = self.builder.skip(offset);
        self
    }

    /// Returns at most `limit` rows.
    #[must_use]
    pub fn take(mut self, limit: u64) -> Self {
        self.builder = self.builder.take(limit);
        self
    }

    /// Eager-loads a relation. Dotted names load nested relations, e.g.
    /// `"author.posts"`.
    #[must_use]
    pub fn with(mut self, relation: impl Into<String>) -> Self {
        self.with.push(relation.into());
        self
    }

    /// Rewrites the underlying builder.
    pub(crate) fn map_builder<F>(mut self, f: F) -> Result<Self>
    where
        F: FnOnce(QueryBuilder) -> keel_core::Result<QueryBuilder>,
    {
        self.builder = f(self.builder)?;
        Ok(self)
    }

    /// Returns the connection the model lives on.
    ///
    /// # Errors
    ///
    /// Returns [`keel_core::Error::UnknownConnection`] if the model names a
    /// connection that is not configured.
    pub fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.orm.connection_for(&self.schema)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Runs the query and returns every matching model.
    ///
    /// # Errors
    ///
    /// Returns query errors and relation resolution errors.
    pub fn get(&self) -> Result<Vec<Model>> {
        let conn = self.connection()?;
        let models: Vec<Model> = self
            .builder
            .get(conn.as_ref())?
            .into_iter()
            .map(|row| Model::hydrate(&self.schema, row))
            .collect();
        load_relations(self.orm, &self.schema, &models, &self.with)?;
        Ok(models)
    }

    /// Returns the first matching model, if any.
    ///
    /// # Errors
    ///
    /// Returns query errors and relation resolution errors.
    pub fn first(&self) -> Result<Option<Model>> {
        Ok(self.clone().take(1).get()?.into_iter().next())
    }

    /// Returns the model with primary key `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns query errors and relation resolution errors.
    pub fn find(&self, id: impl Into<Value>) -> Result<Option<Model>> {
        let column = format!("{}.{}", self.schema.table_name(), self.schema.primary_key_name());
        self.clone().where_eq(column, id).first()
    }

    /// Counts matching rows.
    ///
    /// # Errors
    ///
    /// Returns query errors.
    pub fn count(&self) -> Result<i64> {
        let conn = self.connection()?;
        Ok(self.builder.count(conn.as_ref())?)
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Inserts `model` together with its loaded relations.
    ///
    /// `BelongsTo` targets are written first so their keys can be stored on
    /// `model`; `HasOne`, `HasMany` and through targets are written after
    /// it. Instances already being saved higher up are skipped.
    ///
    /// # Errors
    ///
    /// Returns query errors. The instance keeps its previous state.
    pub fn insert(&self, model: &Model) -> Result<()> {
        persist(self.orm, model, true, &Journal::default())
    }

    /// Writes the dirty attributes of `model` and cascades to its loaded
    /// relations.
    ///
    /// A replaced `HasOne` target marked `destroy_dependent` is deleted.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::MissingPrimaryKey`] if `model` has no key, or
    /// query errors.
    pub fn update(&self, model: &Model) -> Result<()> {
        persist(self.orm, model, false, &Journal::default())
    }

    /// Deletes `model` by primary key and resets it to a new instance.
    ///
    /// Returns whether a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::MissingPrimaryKey`] if `model` has no key, or
    /// query errors.
    pub fn delete(&self, model: &Model) -> Result<bool> {
        delete(self.orm, model, &Journal::default())
    }
}

/// Eager-loads `with` onto `models`, one query per relation.
pub(crate) fn load_relations(
    orm: &Orm,
    schema: &Arc<ModelSchema>,
    models: &[Model],
    with: &[String],
) -> Result<()> {
    if models.is_empty() || with.is_empty() {
        return Ok(());
    }

    let mut tree: IndexMap<&str, Vec<String>> = IndexMap::new();
    for name in with {
        match name.split_once('.') {
            Some((head, rest)) => tree.entry(head).or_default().push(rest.to_string()),
            None => {
                tree.entry(name.as_str()).or_default();
            }
        }
    }

    for (name, nested) in tree {
        let relation = orm.registry().relation(schema, name)?;
        let query = nested
            .into_iter()
            .fold(ModelQuery::new(orm, Arc::clone(&relation.target)), ModelQuery::with);
        debug!(
            model = schema.name(),
            relation = name,
            owners = models.len(),
            "Eager loading relation"
        );
        strategy(relation.kind).eager_load(&relation, models, query)?;
    }
    Ok(())
}

/// Inserts or updates depending on whether `model` has a key.
fn upsert(orm: &Orm, model: &Model, journal: &Journal) -> Result<()> {
    persist(orm, model, !model.exists(), journal)
}

/// Writes `model` and its loaded relations, recording every instance it
/// touches in `journal` before changing it.
pub(crate) fn persist(orm: &Orm, model: &Model, inserting: bool, journal: &Journal) -> Result<()> {
    journal.record(model);
    let previous = model.state();
    if previous == PersistState::Persisting {
        trace!(model = %model.model_name(), "Already being saved, skipping");
        return Ok(());
    }

    model.set_state(PersistState::Persisting);
    match write_graph(orm, model, inserting, journal) {
        Ok(()) => {
            model.sync_original();
            model.set_state(PersistState::Persisted);
            Ok(())
        }
        Err(err) => {
            model.set_state(previous);
            Err(err)
        }
    }
}

fn write_graph(orm: &Orm, model: &Model, inserting: bool, journal: &Journal) -> Result<()> {
    let schema = model.schema();
    let relations = orm.registry().relations(&schema)?;
    let conn = orm.connection_for(&schema)?;

    for relation in relations.iter().filter(|r| r.kind == RelationKind::BelongsTo) {
        associate_parent(orm, model, relation, journal)?;
    }

    if !inserting {
        for relation in relations
            .iter()
            .filter(|r| r.kind == RelationKind::HasOne && r.destroy_dependent)
        {
            destroy_replaced(orm, model, relation, journal)?;
        }
    }

    write_row(conn.as_ref(), &schema, model, inserting)?;

    for relation in relations.iter().filter(|r| r.kind != RelationKind::BelongsTo) {
        let Ok(related) = model.relation(&relation.name) else {
            continue;
        };
        let owner_key = model.get(&relation.local_key).unwrap_or_default();
        for target in related.models() {
            journal.record(target);
            if !relation.kind.is_through() {
                target.set_foreign_key(&relation.foreign_key, owner_key.clone());
            }
            upsert(orm, target, journal)?;
        }
    }
    Ok(())
}

/// Saves a loaded `BelongsTo` target and stores its key on `model`.
fn associate_parent(
    orm: &Orm,
    model: &Model,
    relation: &ResolvedRelation,
    journal: &Journal,
) -> Result<()> {
    let Ok(Related::One(parent)) = model.relation(&relation.name) else {
        return Ok(());
    };
    match parent {
        Some(parent) => {
            upsert(orm, &parent, journal)?;
            let key = parent.get(&relation.local_key).unwrap_or_default();
            model.set_foreign_key(&relation.foreign_key, key);
        }
        None => {
            if matches!(model.original_relation(&relation.name), Some(Related::One(Some(_)))) {
                model.set_foreign_key(&relation.foreign_key, Value::Null);
            }
        }
    }
    Ok(())
}

/// Deletes the previous `HasOne` target if the relation was replaced.
fn destroy_replaced(
    orm: &Orm,
    model: &Model,
    relation: &ResolvedRelation,
    journal: &Journal,
) -> Result<()> {
    let Some(Related::One(Some(previous))) = model.original_relation(&relation.name) else {
        return Ok(());
    };
    let replaced = match model.relation(&relation.name) {
        Ok(Related::One(Some(current))) => !current.ptr_eq(&previous),
        Ok(Related::One(None)) => true,
        _ => false,
    };
    if replaced && previous.exists() {
        debug!(
            model = relation.owner.name(),
            relation = %relation.name,
            id = ?previous.id(),
            "Deleting replaced dependent"
        );
        delete(orm, &previous, journal)?;
    }
    Ok(())
}

fn write_row(
    conn: &dyn Connection,
    schema: &ModelSchema,
    model: &Model,
    inserting: bool,
) -> Result<()> {
    let mut values = model.dirty();
    let table = QueryBuilder::table(schema.table_name());
    let primary_key = schema.primary_key_name();

    if inserting {
        if values.get(primary_key).is_some_and(Value::is_null) {
            values.shift_remove(primary_key);
        }
        let stored = table.insert_returning(conn, &[values])?;
        if let Some(row) = stored.into_iter().next() {
            model.refresh_from(row);
        }
        debug!(model = schema.name(), id = ?model.id(), "Inserted model");
        return Ok(());
    }

    let id = model.id().ok_or_else(|| OrmError::MissingPrimaryKey {
        model: schema.name().to_string(),
    })?;
    if values.is_empty() {
        trace!(model = schema.name(), id = %id, "No dirty attributes to write");
        return Ok(());
    }
    table.where_eq(primary_key, id).update(conn, &values)?;
    debug!(model = schema.name(), columns = values.len(), "Updated model");
    Ok(())
}

fn delete(orm: &Orm, model: &Model, journal: &Journal) -> Result<bool> {
    let schema = model.schema();
    let id = model.id().ok_or_else(|| OrmError::MissingPrimaryKey {
        model: schema.name().to_string(),
    })?;
    let conn = orm.connection_for(&schema)?;
    let deleted = QueryBuilder::table(schema.table_name())
        .where_eq(schema.primary_key_name(), id)
        .delete(conn.as_ref())?;
    journal.record(model);
    model.mark_deleted();
    Ok(deleted > 0)
}
