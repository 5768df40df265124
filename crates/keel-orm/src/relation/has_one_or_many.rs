use std::collections::HashMap;

use keel_core::Key;
use tracing::trace;

use super::{group_by, key_of, key_values, RelationStrategy};
use crate::error::Result;
use crate::model::{Model, Related};
use crate::query::ModelQuery;
use crate::registry::ResolvedRelation;
use crate::schema::RelationKind;

/// One target holds a key referencing the owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct HasOne;

/// Many targets hold a key referencing the owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct HasMany;

/// Fetches the targets of every owner, grouped by owner key.
fn load_groups(
    relation: &ResolvedRelation,
    owners: &[Model],
    query: ModelQuery<'_>,
) -> Result<HashMap<Key, Vec<Model>>> {
    let keys = key_values(owners, &relation.local_key);
    if keys.is_empty() {
        return Ok(HashMap::new());
    }
    let targets = query.where_in(relation.foreign_key.clone(), keys).get()?;
    trace!(relation = %relation.name, rows = targets.len(), "Fetched related rows");
    Ok(group_by(targets, &relation.foreign_key))
}

impl RelationStrategy for HasOne {
    fn eager_load(
        &self,
        relation: &ResolvedRelation,
        owners: &[Model],
        query: ModelQuery<'_>,
    ) -> Result<()> {
        let groups = load_groups(relation, owners, query)?;
        for owner in owners {
            let target = key_of(owner, &relation.local_key)
                .and_then(|key| groups.get(&key))
                .and_then(|group| group.first().cloned());
            owner.set_loaded(&relation.name, Related::One(target));
        }
        Ok(())
    }

    fn inverse_kinds(&self) -> &'static [RelationKind] {
        &[RelationKind::BelongsTo]
    }
}

impl RelationStrategy for HasMany {
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
        &[RelationKind::BelongsTo]
    }
}
