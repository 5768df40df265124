//! Cascading saves.
//!
//! [`ChangeTracker::save`] runs the full save pipeline for one instance:
//! normalize, validate, cross-link bidirectional relations, then insert or
//! update inside a transaction. Cross-linking walks the graph of loaded
//! relations and keeps a visited set keyed by instance identity, so
//! mutually referencing instances are processed once.

use std::cell::RefCell;
use std::collections::HashSet;

use keel_core::transaction;
use tracing::{debug, trace};

use crate::error::{OrmError, Result};
use crate::model::{Checkpoint, Identity, Model};
use crate::orm::Orm;
use crate::query::persist;
use crate::relation::strategy;

/// Instances changed by a save, each with its state from before the save.
#[derive(Default)]
pub(crate) struct Journal {
    seen: RefCell<HashSet<Identity>>,
    entries: RefCell<Vec<(Model, Checkpoint)>>,
}

impl Journal {
    /// Checkpoints `model` unless it is already recorded.
    pub(crate) fn record(&self, model: &Model) {
        if self.seen.borrow_mut().insert(model.identity()) {
            self.entries
                .borrow_mut()
                .push((model.clone(), model.checkpoint()));
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Puts every recorded instance back to its checkpoint.
    pub(crate) fn restore(self) {
        for (instance, checkpoint) in self.entries.into_inner() {
            instance.restore(checkpoint);
        }
    }
}

/// Orchestrates one save.
pub struct ChangeTracker<'o> {
    orm: &'o Orm,
    visited: HashSet<Identity>,
    journal: Journal,
}

impl<'o> ChangeTracker<'o> {
    /// Creates a tracker with an empty visited set.
    #[must_use]
    pub fn new(orm: &'o Orm) -> Self {
        Self {
            orm,
            visited: HashSet::new(),
            journal: Journal::default(),
        }
    }

    /// Saves `model` and the instances reachable through its loaded
    /// relations.
    ///
    /// Returns `false` without writing if validation fails; the result is
    /// stored on the model. An existing instance with nothing to write
    /// issues no SQL.
    ///
    /// # Errors
    ///
    /// Returns query errors after rolling back the transaction. Every
    /// instance the save reached is restored to its state before the save.
    pub fn save(&mut self, model: &Model) -> Result<bool> {
        model.normalize();

        if let Some(result) = self.orm.run_validation(model) {
            let invalid = result.invalid();
            model.set_validation(result);
            if invalid {
                debug!(model = %model.model_name(), "Validation failed, not saving");
                return Ok(false);
            }
        }

        self.cross_link(model)?;

        if model.exists() && !model.is_dirty() {
            trace!(model = %model.model_name(), "Model is clean, nothing to save");
            return Ok(true);
        }

        let conn = self.orm.connection_for(&model.schema())?;
        let orm = self.orm;
        let journal = &self.journal;
        let saved = transaction(conn.as_ref(), |_| persist(orm, model, !model.exists(), journal));
        if let Err(err) = saved {
            debug!(
                model = %model.model_name(),
                error = %err,
                instances = self.journal.len(),
                "Save failed, restoring instances"
            );
            std::mem::take(&mut self.journal).restore();
            return Err(err);
        }
        Ok(true)
    }

    /// Attaches `model` to the inverse relation of every instance it
    /// holds, recursively.
    ///
    /// Relations with no inverse on the related model are left alone.
    fn cross_link(&mut self, model: &Model) -> Result<()> {
        if !self.visited.insert(model.identity()) {
            return Ok(());
        }
        self.journal.record(model);

        let orm = self.orm;
        let registry = orm.registry();
        let schema = model.schema();
        for name in model.loaded_relations() {
            let relation = registry.relation(&schema, &name)?;
            if relation.kind.is_through() {
                continue;
            }
            let related = model.relation(&name)?;
            let matcher = strategy(relation.kind);
            for target in related.models() {
                match matcher.guess_matching_relation(registry, &relation, target) {
                    Ok(inverse) => {
                        target.attach(&inverse.name, model, inverse.kind.is_single());
                    }
                    Err(OrmError::NoInverseRelation { related, .. }) => {
                        trace!(relation = %name, related = %related, "No inverse relation, not linking");
                    }
                    Err(err) => return Err(err),
                }
                self.cross_link(target)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChangeTracker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("visited", &self.visited.len())
            .field("journal", &self.journal.len())
            .finish_non_exhaustive()
    }
}
