//! Applied-migration bookkeeping.
//!
//! Applied migrations are recorded in the `migrations` table of the
//! connection each migration ran on.

use chrono::{DateTime, NaiveDateTime, Utc};
use keel_core::{row, Connection, QueryBuilder, Row, Value};

use crate::error::{MigrateError, Result};
use crate::schema::Schema;

/// Name of the applied-migrations table.
pub const MIGRATIONS_TABLE: &str = "migrations";

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Row ID in the migrations table.
    pub id: i64,
    /// Migration name.
    pub name: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

impl AppliedMigration {
    fn from_row(row: &Row) -> Self {
        let text = |column: &str| {
            row.get(column)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            id: row.get("id").and_then(Value::as_i64).unwrap_or_default(),
            name: text("name"),
            applied_at: parse_timestamp(&text("applied_at")),
        }
    }
}

/// Reads RFC 3339 first, then SQLite's `YYYY-MM-DD HH:MM:SS`.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|dt| dt.and_utc())
                .unwrap_or_else(|_| Utc::now())
        })
}

/// Reads and writes the `migrations` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationRepository;

impl MigrationRepository {
    /// Creates the repository.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn query() -> QueryBuilder {
        QueryBuilder::table(MIGRATIONS_TABLE)
    }

    /// Creates the migrations table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be created.
    pub fn ensure_table(&self, conn: &dyn Connection) -> Result<()> {
        Schema::new(conn).create_if_not_exists(MIGRATIONS_TABLE, |table| {
            table.increments("id");
            table.string("name").unique();
            table.timestamp("applied_at");
        })
    }

    /// Returns whether the migrations table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be queried.
    pub fn exists(&self, conn: &dyn Connection) -> Result<bool> {
        Schema::new(conn).has_table(MIGRATIONS_TABLE)
    }

    /// Returns the applied migrations in the order they were applied.
    ///
    /// A database without a migrations table has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn applied(&self, conn: &dyn Connection) -> Result<Vec<AppliedMigration>> {
        if !self.exists(conn)? {
            return Ok(Vec::new());
        }
        let rows = Self::query().order_by("id").get(conn)?;
        Ok(rows.iter().map(AppliedMigration::from_row).collect())
    }

    /// Returns whether `name` is recorded as applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn is_applied(&self, conn: &dyn Connection, name: &str) -> Result<bool> {
        if !self.exists(conn)? {
            return Ok(false);
        }
        Ok(Self::query().where_eq("name", name).exists(conn)?)
    }

    /// Records `name` as applied now.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn log(&self, conn: &dyn Connection, name: &str) -> Result<()> {
        Self::query().insert(conn, &[row! { "name" => name, "applied_at" => Utc::now() }])?;
        Ok(())
    }

    /// Removes the record for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MigrationNotFound`] if no record exists.
    pub fn delete(&self, conn: &dyn Connection, name: &str) -> Result<()> {
        let deleted = Self::query().where_eq("name", name).delete(conn)?;
        if deleted == 0 {
            return Err(MigrateError::MigrationNotFound(name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_sqlite::SqliteConnection;

    #[test]
    fn test_log_and_delete() {
        let conn = SqliteConnection::memory().unwrap();
        let repository = MigrationRepository::new();
        assert!(repository.applied(&conn).unwrap().is_empty());

        repository.ensure_table(&conn).unwrap();
        repository.ensure_table(&conn).unwrap();
        repository.log(&conn, "20240101_a").unwrap();
        repository.log(&conn, "20240102_b").unwrap();

        let applied = repository.applied(&conn).unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].id, 1);
        assert_eq!(applied[1].name, "20240102_b");
        assert!(repository.is_applied(&conn, "20240101_a").unwrap());

        repository.delete(&conn, "20240101_a").unwrap();
        assert!(!repository.is_applied(&conn, "20240101_a").unwrap());
    }

    #[test]
    fn test_delete_unknown_fails() {
        let conn = SqliteConnection::memory().unwrap();
        let repository = MigrationRepository::new();
        repository.ensure_table(&conn).unwrap();

        let err = repository.delete(&conn, "nope").unwrap_err();
        assert!(matches!(err, MigrateError::MigrationNotFound(name) if name == "nope"));
    }

    #[test]
    fn test_duplicate_log_is_rejected() {
        let conn = SqliteConnection::memory().unwrap();
        let repository = MigrationRepository::new();
        repository.ensure_table(&conn).unwrap();
        repository.log(&conn, "a").unwrap();

        assert!(repository.log(&conn, "a").is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2024-01-02T03:04:05Z");
        let sqlite = parse_timestamp("2024-01-02 03:04:05");
        assert_eq!(rfc, sqlite);
    }
}
