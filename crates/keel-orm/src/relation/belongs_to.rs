use tracing::trace;

use super::{group_by, key_of, key_values, RelationStrategy};
use crate::error::Result;
use crate::model::{Model, Related};
use crate::query::ModelQuery;
use crate::registry::ResolvedRelation;
use crate::schema::RelationKind;

/// The owner holds the foreign key.
#[derive(Debug, Clone, Copy, Default)]
pub struct BelongsTo;

impl RelationStrategy for BelongsTo {
    fn eager_load(
        &self,
        relation: &ResolvedRelation,
        owners: &[Model],
        query: ModelQuery<'_>,
    ) -> Result<()> {
        let keys = key_values(owners, &relation.foreign_key);
        let groups = if keys.is_empty() {
            Default::default()
        } else {
            group_by(
                query.where_in(relation.local_key.clone(), keys).get()?,
                &relation.local_key,
            )
        };
        trace!(relation = %relation.name, matched = groups.len(), "Matched belongs-to rows");

        for owner in owners {
            let parent = key_of(owner, &relation.foreign_key)
                .and_then(|key| groups.get(&key))
                .and_then(|group| group.first().cloned());
            owner.set_loaded(&relation.name, Related::One(parent));
        }
        Ok(())
    }

    fn inverse_kinds(&self) -> &'static [RelationKind] {
        &[RelationKind::HasOne, RelationKind::HasMany]
    }
}
