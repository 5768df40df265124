//! Migration units and where they come from.
//!
//! A [`Migration`] is a named pair of `up`/`down` steps run against a
//! [`Schema`]. A [`MigrationSource`] discovers them: [`MigrationSet`] holds
//! migrations written in Rust, [`SqlDirectory`] reads
//! `<name>.up.sql` / `<name>.down.sql` pairs from disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::schema::Schema;

/// A reversible schema change.
///
/// Names must be unique. Migrations run in ascending name order, so names
/// are conventionally prefixed with a timestamp (`2024_01_01_000000_create_users`).
pub trait Migration: Send + Sync {
    /// Returns the unique name.
    fn name(&self) -> &str;

    /// Returns the connection to run on, or `None` for the default.
    fn connection(&self) -> Option<&str> {
        None
    }

    /// Applies the change.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    fn up(&self, schema: &mut Schema<'_>) -> Result<()>;

    /// Reverts the change.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails or the change cannot be reverted.
    fn down(&self, schema: &mut Schema<'_>) -> Result<()>;
}

/// Discovers migrations.
pub trait MigrationSource {
    /// Loads every migration this source knows about, in any order.
    ///
    /// # Errors
    ///
    /// Returns an error if the migrations cannot be read.
    fn load(&self) -> Result<Vec<Arc<dyn Migration>>>;
}

/// A set of migrations registered in code.
#[derive(Default, Clone)]
pub struct MigrationSet {
    migrations: Vec<Arc<dyn Migration>>,
}

impl MigrationSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a migration.
    #[must_use]
    pub fn with(mut self, migration: impl Migration + 'static) -> Self {
        self.migrations.push(Arc::new(migration));
        self
    }

    /// Adds a migration in place.
    pub fn push(&mut self, migration: Arc<dyn Migration>) {
        self.migrations.push(migration);
    }

    /// Returns the number of migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Returns whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl MigrationSource for MigrationSet {
    fn load(&self) -> Result<Vec<Arc<dyn Migration>>> {
        Ok(self.migrations.clone())
    }
}

impl std::fmt::Debug for MigrationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.migrations.iter().map(|m| m.name()))
            .finish()
    }
}

/// A migration read from SQL files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMigration {
    name: String,
    up: String,
    down: Option<String>,
}

impl SqlMigration {
    /// Creates a migration from SQL text. `down` may be absent.
    pub fn new(name: impl Into<String>, up: impl Into<String>, down: Option<String>) -> Self {
        Self {
            name: name.into(),
            up: up.into(),
            down,
        }
    }

    /// Returns the `up` SQL.
    #[must_use]
    pub fn up_sql(&self) -> &str {
        &self.up
    }

    /// Returns the `down` SQL, if any.
    #[must_use]
    pub fn down_sql(&self) -> Option<&str> {
        self.down.as_deref()
    }
}

impl Migration for SqlMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, schema: &mut Schema<'_>) -> Result<()> {
        run_script(schema, &self.up)
    }

    fn down(&self, schema: &mut Schema<'_>) -> Result<()> {
        let down = self
            .down
            .as_deref()
            .ok_or_else(|| MigrateError::NotReversible(self.name.clone()))?;
        run_script(schema, down)
    }
}

/// Runs each `;`-terminated statement of a script.
fn run_script(schema: &mut Schema<'_>, script: &str) -> Result<()> {
    for statement in split_statements(script) {
        schema.raw(statement)?;
    }
    Ok(())
}

/// Splits a script into statements, dropping blank ones and those made of
/// `--` comments only.
///
/// A `;` ends a statement unless it sits inside a quoted string or
/// identifier, a comment, or a `BEGIN ... END` / `CASE ... END` block.
fn split_statements(script: &str) -> Vec<&str> {
    let bytes = script.as_bytes();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut depth = 0_usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 1;
            }
            b';' if depth == 0 => {
                statements.push(&script[start..i]);
                start = i + 1;
            }
            byte if byte.is_ascii_alphabetic() || byte == b'_' => {
                let word_start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let word = &script[word_start..i];
                let leading = script[start..word_start].trim().is_empty();
                if word.eq_ignore_ascii_case("case") || (word.eq_ignore_ascii_case("begin") && !leading) {
                    depth += 1;
                } else if word.eq_ignore_ascii_case("end") {
                    depth = depth.saturating_sub(1);
                }
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    statements.push(&script[start..]);

    statements
        .into_iter()
        .map(str::trim)
        .filter(|statement| {
            statement
                .lines()
                .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with("--"))
        })
        .collect()
}

/// A directory of `<name>.up.sql` / `<name>.down.sql` files.
#[derive(Debug, Clone)]
pub struct SqlDirectory {
    path: PathBuf,
}

impl SqlDirectory {
    /// Creates a source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MigrationSource for SqlDirectory {
    fn load(&self) -> Result<Vec<Arc<dyn Migration>>> {
        if !self.path.is_dir() {
            return Err(MigrateError::MigrationsDirNotFound(self.path.clone()));
        }

        let mut found: BTreeMap<String, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(name) = file_name.strip_suffix(".up.sql") {
                found.entry(name.to_string()).or_default().0 = Some(path.clone());
            } else if let Some(name) = file_name.strip_suffix(".down.sql") {
                found.entry(name.to_string()).or_default().1 = Some(path.clone());
            }
        }

        let mut migrations: Vec<Arc<dyn Migration>> = Vec::with_capacity(found.len());
        for (name, (up, down)) in found {
            // A lone down file has nothing to apply.
            let Some(up) = up else {
                debug!(name = %name, "Skipping down script without up script");
                continue;
            };
            let down = down.map(fs::read_to_string).transpose()?;
            migrations.push(Arc::new(SqlMigration::new(name, fs::read_to_string(up)?, down)));
        }
        Ok(migrations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements() {
        let script = "-- create\nCREATE TABLE a (id INTEGER);\n\nINSERT INTO a VALUES (1);\n-- trailing\n";
        assert_eq!(
            split_statements(script),
            vec!["-- create\nCREATE TABLE a (id INTEGER)", "INSERT INTO a VALUES (1)"]
        );
    }

    #[test]
    fn test_split_statements_keeps_literals_and_trigger_bodies() {
        let script = "INSERT INTO a VALUES (1, 'x;y');\n\
            CREATE TRIGGER t AFTER INSERT ON a BEGIN\n\
              UPDATE a SET n = CASE WHEN n > 0 THEN 1 ELSE 0 END;\n\
              DELETE FROM b;\n\
            END;\n\
            -- done; really\n\
            SELECT \"semi;colon\" FROM a";
        let statements = split_statements(script);
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0], "INSERT INTO a VALUES (1, 'x;y')");
        assert!(statements[1].starts_with("CREATE TRIGGER t"));
        assert!(statements[1].ends_with("END"));
        assert!(statements[2].ends_with("SELECT \"semi;colon\" FROM a"));
    }

    #[test]
    fn test_sql_migration_with_semicolon_in_literal() {
        let conn = keel_sqlite::SqliteConnection::memory().unwrap();
        let migration = SqlMigration::new(
            "20240101_a",
            "CREATE TABLE a (id INTEGER, label TEXT);\nINSERT INTO a VALUES (1, 'x;y');",
            None,
        );
        let mut schema = Schema::new(&conn);
        migration.up(&mut schema).unwrap();

        let label = keel_core::QueryBuilder::table("a").value(&conn, "label").unwrap();
        assert_eq!(label, Some(keel_core::Value::from("x;y")));
    }

    #[test]
    fn test_sql_directory_pairs_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("20240102_b.up.sql"), "CREATE TABLE b (id INTEGER);").unwrap();
        fs::write(dir.path().join("20240101_a.up.sql"), "CREATE TABLE a (id INTEGER);").unwrap();
        fs::write(dir.path().join("20240101_a.down.sql"), "DROP TABLE a;").unwrap();
        fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let migrations = SqlDirectory::new(dir.path()).load().unwrap();
        let names: Vec<&str> = migrations.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["20240101_a", "20240102_b"]);
    }

    #[test]
    fn test_missing_directory() {
        let Err(err) = SqlDirectory::new("/nonexistent/keel/migrations").load() else {
            panic!("expected an error");
        };
        assert!(matches!(err, MigrateError::MigrationsDirNotFound(_)));
    }

    #[test]
    fn test_sql_migration_without_down_is_not_reversible() {
        let conn = keel_sqlite::SqliteConnection::memory().unwrap();
        let migration = SqlMigration::new("x", "CREATE TABLE x (id INTEGER)", None);
        let mut schema = Schema::new(&conn);

        migration.up(&mut schema).unwrap();
        let err = migration.down(&mut schema).unwrap_err();
        assert!(matches!(err, MigrateError::NotReversible(name) if name == "x"));
    }
}
