//! Applies and reverts migrations.

use std::sync::Arc;

use keel_core::{transaction, Connection, ConnectionManager};
use tracing::{info, warn};

use crate::error::{MigrateError, Result};
use crate::events::{MigrationDirection, MigrationEvent};
use crate::migration::{Migration, MigrationSource};
use crate::repository::MigrationRepository;
use crate::schema::Schema;

/// Whether a migration has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migration name.
    pub name: String,
    /// Connection the migration targets.
    pub connection: String,
    /// Recorded as applied.
    pub applied: bool,
}

type Listener<'a> = Box<dyn Fn(&MigrationEvent) + 'a>;

/// Runs migrations in ascending name order.
///
/// Each migration runs on its own target connection (or the default one)
/// inside a transaction together with its applied record.
///
/// # Example
///
/// ```rust
/// use keel_core::ConnectionManager;
/// use keel_migrate::{Migration, MigrationSet, Migrator, Result, Schema};
/// use keel_sqlite::SqliteConnection;
/// use std::sync::Arc;
///
/// struct CreateUsers;
///
/// impl Migration for CreateUsers {
///     fn name(&self) -> &str {
///         "2024_01_01_000000_create_users"
///     }
///
///     fn up(&self, schema: &mut Schema<'_>) -> Result<()> {
///         schema.create("users", |table| {
///             table.increments("id");
///             table.string("name");
///         })
///     }
///
///     fn down(&self, schema: &mut Schema<'_>) -> Result<()> {
///         schema.drop("users")
///     }
/// }
///
/// let manager = ConnectionManager::from_connection(Arc::new(SqliteConnection::memory().unwrap()));
/// let migrator = Migrator::new(&manager)
///     .with_source(&MigrationSet::new().with(CreateUsers))
///     .unwrap();
///
/// let applied = migrator.apply_pending_migrations().unwrap();
/// assert_eq!(applied, vec!["2024_01_01_000000_create_users"]);
/// assert!(migrator.pending().unwrap().is_empty());
/// ```
pub struct Migrator<'a> {
    connections: &'a ConnectionManager,
    migrations: Vec<Arc<dyn Migration>>,
    repository: MigrationRepository,
    pretend: bool,
    listeners: Vec<Listener<'a>>,
}

impl<'a> Migrator<'a> {
    /// Creates a migrator with no migrations.
    #[must_use]
    pub fn new(connections: &'a ConnectionManager) -> Self {
        Self {
            connections,
            migrations: Vec::new(),
            repository: MigrationRepository::new(),
            pretend: false,
            listeners: Vec::new(),
        }
    }

    /// Registers every migration from `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or a name is taken.
    pub fn with_source(mut self, source: &dyn MigrationSource) -> Result<Self> {
        for migration in source.load()? {
            self.register(migration)?;
        }
        Ok(self)
    }

    /// Registers one migration, keeping the list sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::DuplicateMigration`] if the name is taken.
    pub fn register(&mut self, migration: Arc<dyn Migration>) -> Result<()> {
        match self
            .migrations
            .binary_search_by(|existing| existing.name().cmp(migration.name()))
        {
            Ok(_) => Err(MigrateError::DuplicateMigration(migration.name().to_string())),
            Err(position) => {
                self.migrations.insert(position, migration);
                Ok(())
            }
        }
    }

    /// Collects and reports SQL instead of executing it.
    #[must_use]
    pub fn pretend(mut self, pretend: bool) -> Self {
        self.pretend = pretend;
        self
    }

    /// Adds a lifecycle event listener.
    #[must_use]
    pub fn listen(mut self, listener: impl Fn(&MigrationEvent) + 'a) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Returns the registered migration names in run order.
    #[must_use]
    pub fn migrations(&self) -> Vec<&str> {
        self.migrations.iter().map(|m| m.name()).collect()
    }

    /// Returns the migrations not yet applied, in run order.
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be resolved or queried.
    pub fn pending(&self) -> Result<Vec<Arc<dyn Migration>>> {
        let mut pending = Vec::new();
        for migration in &self.migrations {
            let conn = self.connection_for(migration.as_ref())?;
            if !self.repository.is_applied(conn.as_ref(), migration.name())? {
                pending.push(Arc::clone(migration));
            }
        }
        Ok(pending)
    }

    /// Applies every pending migration and returns their names.
    ///
    /// # Errors
    ///
    /// Stops at the first failing migration; earlier ones stay applied.
    pub fn apply_pending_migrations(&self) -> Result<Vec<String>> {
        let pending = self.pending()?;
        if pending.is_empty() {
            info!("Nothing to migrate");
            self.emit(&MigrationEvent::NothingToMigrate);
            return Ok(Vec::new());
        }

        self.run_batch(MigrationDirection::Up, &pending)
    }

    /// Reverts up to `steps` applied migrations, newest name first, and
    /// returns their names.
    ///
    /// # Errors
    ///
    /// Stops at the first failing migration.
    pub fn rollback(&self, steps: usize) -> Result<Vec<String>> {
        let mut applied = Vec::new();
        for migration in self.migrations.iter().rev() {
            if applied.len() == steps {
                break;
            }
            let conn = self.connection_for(migration.as_ref())?;
            if self.repository.is_applied(conn.as_ref(), migration.name())? {
                applied.push(Arc::clone(migration));
            }
        }
        if applied.is_empty() {
            info!("Nothing to roll back");
            self.emit(&MigrationEvent::NothingToMigrate);
            return Ok(Vec::new());
        }

        self.run_batch(MigrationDirection::Down, &applied)
    }

    /// Reverts every applied migration.
    ///
    /// # Errors
    ///
    /// See [`Migrator::rollback`].
    pub fn reset(&self) -> Result<Vec<String>> {
        self.rollback(usize::MAX)
    }

    /// Reverts every applied migration, then applies them all again.
    /// Returns the names applied.
    ///
    /// When pretending nothing is recorded as reverted, so every registered
    /// migration is pretended up after the reset.
    ///
    /// # Errors
    ///
    /// See [`Migrator::rollback`] and [`Migrator::apply_pending_migrations`].
    pub fn refresh(&self) -> Result<Vec<String>> {
        self.reset()?;
        if self.pretend && !self.migrations.is_empty() {
            return self.run_batch(MigrationDirection::Up, &self.migrations);
        }
        self.apply_pending_migrations()
    }

    /// Returns every registered migration with its applied flag.
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be resolved or queried.
    pub fn status(&self) -> Result<Vec<MigrationStatus>> {
        self.migrations
            .iter()
            .map(|migration| {
                let conn = self.connection_for(migration.as_ref())?;
                Ok(MigrationStatus {
                    name: migration.name().to_string(),
                    connection: conn.name().to_string(),
                    applied: self.repository.is_applied(conn.as_ref(), migration.name())?,
                })
            })
            .collect()
    }

    fn connection_for(&self, migration: &dyn Migration) -> Result<Arc<dyn Connection>> {
        Ok(self.connections.connection_or_default(migration.connection())?)
    }

    fn run_batch(&self, direction: MigrationDirection, batch: &[Arc<dyn Migration>]) -> Result<Vec<String>> {
        self.emit(&MigrationEvent::BatchStarted {
            direction,
            count: batch.len(),
        });

        let mut names = Vec::with_capacity(batch.len());
        for migration in batch {
            self.run(migration.as_ref(), direction)?;
            names.push(migration.name().to_string());
        }

        self.emit(&MigrationEvent::BatchEnded { direction });
        Ok(names)
    }

    fn run(&self, migration: &dyn Migration, direction: MigrationDirection) -> Result<()> {
        let name = migration.name();
        let conn = self.connection_for(migration)?;
        self.emit(&MigrationEvent::MigrationStarted {
            name: name.to_string(),
            direction,
        });

        if self.pretend {
            warn!(name = %name, direction = %direction, "Pretending migration");
            let mut schema = Schema::pretend(conn.as_ref());
            match direction {
                MigrationDirection::Up => migration.up(&mut schema)?,
                MigrationDirection::Down => migration.down(&mut schema)?,
            }
            self.emit(&MigrationEvent::Pretended {
                name: name.to_string(),
                statements: schema.into_pretended(),
            });
        } else {
            match direction {
                MigrationDirection::Up => info!(name = %name, connection = %conn.name(), "Applying migration"),
                MigrationDirection::Down => info!(name = %name, connection = %conn.name(), "Rolling back migration"),
            }
            self.repository.ensure_table(conn.as_ref())?;
            let repository = self.repository;
            transaction(conn.as_ref(), |c| {
                let mut schema = Schema::new(c);
                match direction {
                    MigrationDirection::Up => {
                        migration.up(&mut schema)?;
                        repository.log(c, name)
                    }
                    MigrationDirection::Down => {
                        migration.down(&mut schema)?;
                        repository.delete(c, name)
                    }
                }
            })?;
            info!(name = %name, direction = %direction, "Migration finished");
        }

        self.emit(&MigrationEvent::MigrationEnded {
            name: name.to_string(),
            direction,
        });
        Ok(())
    }

    fn emit(&self, event: &MigrationEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for Migrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("migrations", &self.migrations())
            .field("pretend", &self.pretend)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{MigrationSet, SqlMigration};
    use keel_sqlite::SqliteConnection;
    use std::cell::RefCell;

    fn manager() -> ConnectionManager {
        ConnectionManager::from_connection(Arc::new(SqliteConnection::memory().unwrap()))
    }

    fn create(name: &str, table: &str) -> SqlMigration {
        SqlMigration::new(
            name,
            format!("CREATE TABLE {table} (id INTEGER PRIMARY KEY)"),
            Some(format!("DROP TABLE {table}")),
        )
    }

    #[test]
    fn test_registration_sorts_and_rejects_duplicates() {
        let manager = manager();
        let mut migrator = Migrator::new(&manager)
            .with_source(&MigrationSet::new().with(create("20240102_b", "b")).with(create("20240101_a", "a")))
            .unwrap();

        assert_eq!(migrator.migrations(), vec!["20240101_a", "20240102_b"]);
        let err = migrator.register(Arc::new(create("20240101_a", "a"))).unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateMigration(_)));
    }

    #[test]
    fn test_failed_migration_is_not_recorded() {
        let manager = manager();
        let broken = SqlMigration::new("20240101_broken", "CREATE TABLE t (id INTEGER); SELECT * FROM missing", None);
        let migrator = Migrator::new(&manager)
            .with_source(&MigrationSet::new().with(broken))
            .unwrap();

        assert!(migrator.apply_pending_migrations().is_err());
        let conn = manager.default_connection().unwrap();
        assert!(!crate::Schema::new(conn.as_ref()).has_table("t").unwrap());
        assert_eq!(migrator.pending().unwrap().len(), 1);
    }

    #[test]
    fn test_events_are_emitted_in_order() {
        let manager = manager();
        let events = RefCell::new(Vec::new());
        let migrator = Migrator::new(&manager)
            .with_source(&MigrationSet::new().with(create("20240101_a", "a")))
            .unwrap()
            .listen(|event| events.borrow_mut().push(event.clone()));

        migrator.apply_pending_migrations().unwrap();
        migrator.apply_pending_migrations().unwrap();
        drop(migrator);

        let up = MigrationDirection::Up;
        assert_eq!(
            events.into_inner(),
            vec![
                MigrationEvent::BatchStarted { direction: up, count: 1 },
                MigrationEvent::MigrationStarted { name: "20240101_a".into(), direction: up },
                MigrationEvent::MigrationEnded { name: "20240101_a".into(), direction: up },
                MigrationEvent::BatchEnded { direction: up },
                MigrationEvent::NothingToMigrate,
            ]
        );
    }

    #[test]
    fn test_pretend_reports_sql_and_records_nothing() {
        let manager = manager();
        let events = RefCell::new(Vec::new());
        let migrator = Migrator::new(&manager)
            .with_source(&MigrationSet::new().with(create("20240101_a", "a")))
            .unwrap()
            .pretend(true)
            .listen(|event| {
                if let MigrationEvent::Pretended { statements, .. } = event {
                    events.borrow_mut().extend(statements.clone());
                }
            });

        assert_eq!(migrator.apply_pending_migrations().unwrap(), vec!["20240101_a"]);
        assert_eq!(migrator.pending().unwrap().len(), 1);
        drop(migrator);
        assert_eq!(events.into_inner(), vec!["CREATE TABLE a (id INTEGER PRIMARY KEY)"]);
    }

    #[test]
    fn test_status_and_reset() {
        let manager = manager();
        let migrator = Migrator::new(&manager)
            .with_source(
                &MigrationSet::new()
                    .with(create("20240101_a", "a"))
                    .with(create("20240102_b", "b")),
            )
            .unwrap();
        migrator.apply_pending_migrations().unwrap();

        let status = migrator.status().unwrap();
        assert!(status.iter().all(|s| s.applied && s.connection == "sqlite"));

        assert_eq!(migrator.reset().unwrap(), vec!["20240102_b", "20240101_a"]);
        assert!(migrator.status().unwrap().iter().all(|s| !s.applied));
        assert_eq!(migrator.refresh().unwrap(), vec!["20240101_a", "20240102_b"]);
    }

    #[test]
    fn test_pretend_refresh_reports_down_then_up() {
        let manager = manager();
        let source = MigrationSet::new().with(create("20240101_a", "a"));
        Migrator::new(&manager)
            .with_source(&source)
            .unwrap()
            .apply_pending_migrations()
            .unwrap();

        let statements = RefCell::new(Vec::new());
        let migrator = Migrator::new(&manager)
            .with_source(&source)
            .unwrap()
            .pretend(true)
            .listen(|event| {
                if let MigrationEvent::Pretended { statements: sql, .. } = event {
                    statements.borrow_mut().extend(sql.clone());
                }
            });

        assert_eq!(migrator.refresh().unwrap(), vec!["20240101_a"]);
        assert!(migrator.status().unwrap().iter().all(|s| s.applied));
        drop(migrator);
        assert_eq!(
            statements.into_inner(),
            vec!["DROP TABLE a", "CREATE TABLE a (id INTEGER PRIMARY KEY)"]
        );
    }
}
