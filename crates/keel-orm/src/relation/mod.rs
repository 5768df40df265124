//! Relation strategies.
//!
//! Each relation kind knows how to match eager-loaded target rows onto a
//! batch of owners, and how to find the relation on a related instance that
//! points back at the owner. Strategies are stateless and looked up by
//! [`strategy`].

mod belongs_to;
mod has_one_or_many;
mod through;

use std::collections::HashMap;

use indexmap::IndexMap;
use keel_core::{Key, Value};

pub use belongs_to::BelongsTo;
pub use has_one_or_many::{HasMany, HasOne};
pub use through::{HasManyThrough, HasOneThrough};

use crate::error::{OrmError, Result};
use crate::model::Model;
use crate::query::ModelQuery;
use crate::registry::{Registry, ResolvedRelation};
use crate::schema::RelationKind;

/// Eager loading and inverse lookup for one relation kind.
pub trait RelationStrategy: Send + Sync {
    /// Loads the relation onto every owner with one query.
    ///
    /// `query` targets the related model and already carries any nested
    /// relations to load.
    ///
    /// # Errors
    ///
    /// Returns query errors, or a relation-specific error when the rows
    /// cannot be matched.
    fn eager_load(
        &self,
        relation: &ResolvedRelation,
        owners: &[Model],
        query: ModelQuery<'_>,
    ) -> Result<()>;

    /// Relation kinds that can point back at an owner of this kind.
    fn inverse_kinds(&self) -> &'static [RelationKind];

    /// Finds the relation on `related` that points back at the owner of
    /// `relation`.
    ///
    /// Candidates target the owner's model with an inverse kind; one using
    /// the same foreign key wins.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::NoInverseRelation`] if there is no candidate.
    fn guess_matching_relation(
        &self,
        registry: &Registry,
        relation: &ResolvedRelation,
        related: &Model,
    ) -> Result<ResolvedRelation> {
        let schema = related.schema();
        let mut candidates: Vec<ResolvedRelation> = schema
            .relations()
            .filter(|spec| {
                spec.target == relation.owner.name() && self.inverse_kinds().contains(&spec.kind)
            })
            .map(|spec| registry.relation(&schema, &spec.name))
            .collect::<Result<_>>()?;

        let index = candidates
            .iter()
            .position(|candidate| candidate.foreign_key == relation.foreign_key)
            .unwrap_or(0);
        if index < candidates.len() {
            Ok(candidates.swap_remove(index))
        } else {
            Err(OrmError::NoInverseRelation {
                model: relation.owner.name().to_string(),
                relation: relation.name.clone(),
                related: schema.name().to_string(),
            })
        }
    }
}

/// Returns the strategy for a relation kind.
#[must_use]
pub fn strategy(kind: RelationKind) -> &'static dyn RelationStrategy {
    match kind {
        RelationKind::BelongsTo => &BelongsTo,
        RelationKind::HasOne => &HasOne,
        RelationKind::HasMany => &HasMany,
        RelationKind::HasOneThrough => &HasOneThrough,
        RelationKind::HasManyThrough => &HasManyThrough,
    }
}

/// Returns the distinct non-null values of `column` across `models`.
fn key_values(models: &[Model], column: &str) -> Vec<Value> {
    let mut keys: IndexMap<Key, Value> = IndexMap::new();
    for model in models {
        if let Some(value) = model.get(column) {
            if let Some(key) = value.key() {
                keys.entry(key).or_insert(value);
            }
        }
    }
    keys.into_values().collect()
}

/// Groups `models` by the value of `column`, keeping query order.
fn group_by(models: Vec<Model>, column: &str) -> HashMap<Key, Vec<Model>> {
    let mut groups: HashMap<Key, Vec<Model>> = HashMap::new();
    for model in models {
        if let Some(key) = model.get(column).and_then(|value| value.key()) {
            groups.entry(key).or_default().push(model);
        }
    }
    groups
}

/// Returns the grouping key of `column` on `model`.
fn key_of(model: &Model, column: &str) -> Option<Key> {
    model.get(column).and_then(|value| value.key())
}
