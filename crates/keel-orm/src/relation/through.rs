use std::collections::HashMap;

use keel_core::{Key, Value};
use tracing::trace;

use super::{group_by, key_of, key_values, RelationStrategy};
use crate::error::{OrmError, Result};
use crate::model::{Model, Related};
use crate::query::ModelQuery;
use crate::registry::ResolvedRelation;
use crate::schema::RelationKind;

/// Column carrying the owner key on joined target rows.
const THROUGH_KEY: &str = "through_key";

/// One target reached through an intermediate model.
#[derive(Debug, Clone, Copy, Default)]
pub struct HasOneThrough;

/// Many targets reached through an intermediate model.
#[derive(Debug, Clone, Copy, Default)]
pub struct HasManyThrough;

/// Joins the intermediate table into the target query and groups the
/// targets by the owner key it carries.
///
/// The query reads
/// `SELECT target.*, mid.first_key AS through_key FROM target
/// INNER JOIN mid ON mid.pk = target.second_key WHERE mid.first_key IN (...)`.
fn load_groups(
    relation: &ResolvedRelation,
    owners: &[Model],
    query: ModelQuery<'_>,
) -> Result<HashMap<Key, Vec<Model>>> {
    let keys = key_values(owners, &relation.local_key);
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let through = relation.through_schema()?;
    let target = relation.target.table_name();
    let mid = through.table_name();
    let first_key = format!("{mid}.{}", relation.first_key);

    let targets = query
        .map_builder(|builder| {
            builder
                .select([format!("{target}.*")])
                .select_as(first_key.clone(), THROUGH_KEY)
                .join(
                    mid,
                    format!("{mid}.{}", through.primary_key_name()),
                    "=",
                    format!("{target}.{}", relation.foreign_key),
                )
                .map(|builder| builder.where_in(first_key.clone(), keys))
        })?
        .get()?;
    trace!(relation = %relation.name, rows = targets.len(), "Fetched rows through join");

    let groups = group_by(targets, THROUGH_KEY);
    for model in groups.values().flatten() {
        model.forget_auxiliary(THROUGH_KEY);
    }
    Ok(groups)
}

impl RelationStrategy for HasOneThrough {
    fn eager_load(
        &self,
        relation: &ResolvedRelation,
        owners: &[Model],
        query: ModelQuery<'_>,
    ) -> Result<()> {
        let groups = load_groups(relation, owners, query)?;
        for owner in owners {
            let Some(key) = key_of(owner, &relation.local_key) else {
                owner.set_loaded(&relation.name, Related::One(None));
                continue;
            };
            match groups.get(&key).map(Vec::as_slice) {
                Some([target]) => owner.set_loaded(&relation.name, Related::One(Some(target.clone()))),
                found => {
                    return Err(OrmError::UnresolvableCardinality {
                        relation: relation.name.clone(),
                        key: Value::from(key).to_string(),
                        count: found.map_or(0, <[Model]>::len),
                    });
                }
            }
        }
        Ok(())
    }

    fn inverse_kinds(&self) -> &'static [RelationKind] {
        &[]
    }
}

impl RelationStrategy for HasManyThrough {
    fn eager_load(
        &self,
        relation: &ResolvedRelation,
        owners: &[Model],
        query: ModelQuery<'_>,
    ) -> Result<()> {
        let groups = load_groups(relation, owners, query)?;
        for owner in owners {
            let targets = key_of(owner, &relation.local_key)
                .and_then(|key| groups.get(&key).cloned())
                .unwrap_or_default();
            owner.set_loaded(&relation.name, Related::Many(targets));
        }
        Ok(())
    }

    fn inverse_kinds(&self) -> &'static [RelationKind] {
        &[]
    }
}
