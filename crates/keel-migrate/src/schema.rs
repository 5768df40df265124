//! The schema builder facade handed to migrations.

use keel_core::{transaction, Connection};
use tracing::{debug, warn};

use crate::blueprint::{Blueprint, ChangeKind};
use crate::error::{MigrateError, Result};
use crate::grammar::{self, SchemaGrammar};

/// Builds and runs blueprints against one connection.
///
/// Every table change compiles to one or more statements that run in a
/// single transaction. In pretend mode statements are collected and logged
/// instead of executed.
///
/// # Example
///
/// ```rust
/// use keel_core::Connection;
/// use keel_migrate::Schema;
/// use keel_sqlite::SqliteConnection;
///
/// let conn = SqliteConnection::memory().unwrap();
/// let mut schema = Schema::new(&conn);
/// schema
///     .create("users", |table| {
///         table.increments("id");
///         table.string("email").unique();
///     })
///     .unwrap();
///
/// assert!(schema.has_table("users").unwrap());
/// ```
pub struct Schema<'c> {
    conn: &'c dyn Connection,
    grammar: &'static dyn SchemaGrammar,
    pretend: bool,
    pretended: Vec<String>,
}

impl<'c> Schema<'c> {
    /// Creates a schema builder that executes statements on `conn`.
    pub fn new(conn: &'c dyn Connection) -> Self {
        Self {
            conn,
            grammar: grammar::for_dialect(conn.dialect()),
            pretend: false,
            pretended: Vec::new(),
        }
    }

    /// Creates a schema builder that only collects the statements it would run.
    pub fn pretend(conn: &'c dyn Connection) -> Self {
        Self {
            pretend: true,
            ..Self::new(conn)
        }
    }

    /// Returns the connection this schema runs on.
    #[must_use]
    pub fn connection(&self) -> &'c dyn Connection {
        self.conn
    }

    /// Returns the schema grammar in use.
    #[must_use]
    pub fn grammar(&self) -> &'static dyn SchemaGrammar {
        self.grammar
    }

    /// Returns whether statements are collected instead of executed.
    #[must_use]
    pub const fn is_pretending(&self) -> bool {
        self.pretend
    }

    /// Returns the statements collected in pretend mode.
    #[must_use]
    pub fn pretended(&self) -> &[String] {
        &self.pretended
    }

    /// Consumes the schema and returns the collected statements.
    #[must_use]
    pub fn into_pretended(self) -> Vec<String> {
        self.pretended
    }

    /// Creates a table.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation or execution fails.
    pub fn create<F>(&mut self, table: &str, define: F) -> Result<()>
    where
        F: FnOnce(&mut Blueprint),
    {
        self.build(&Blueprint::build(table, ChangeKind::Create, define))
    }

    /// Creates a table unless it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation or execution fails.
    pub fn create_if_not_exists<F>(&mut self, table: &str, define: F) -> Result<()>
    where
        F: FnOnce(&mut Blueprint),
    {
        self.build(&Blueprint::build(table, ChangeKind::CreateIfNotExists, define))
    }

    /// Alters an existing table.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation or execution fails.
    pub fn table<F>(&mut self, table: &str, define: F) -> Result<()>
    where
        F: FnOnce(&mut Blueprint),
    {
        self.build(&Blueprint::build(table, ChangeKind::Alter, define))
    }

    /// Drops a table.
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails.
    pub fn drop(&mut self, table: &str) -> Result<()> {
        self.build(&Blueprint::new(table, ChangeKind::Drop))
    }

    /// Drops a table if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails.
    pub fn drop_if_exists(&mut self, table: &str) -> Result<()> {
        self.build(&Blueprint::new(table, ChangeKind::DropIfExists))
    }

    /// Renames a table.
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.table(from, |table| table.rename(to))
    }

    /// Returns whether `table` exists. Runs even in pretend mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog query fails.
    pub fn has_table(&self, table: &str) -> Result<bool> {
        let query = self.grammar.compile_table_exists(table);
        Ok(self.conn.select_single(&query.sql, &query.bindings)?.is_some())
    }

    /// Drops every table in the database.
    ///
    /// Runs outside a transaction: SQLite cannot `VACUUM` inside one.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub fn drop_all_tables(&mut self) -> Result<()> {
        warn!(connection = %self.conn.name(), "Dropping all tables");
        let statements = self.grammar.compile_drop_all_tables();
        if self.pretend {
            self.collect(statements);
            return Ok(());
        }
        for sql in &statements {
            debug!(sql = %sql, "Executing SQL");
            self.conn.statement(sql, &[])?;
        }
        Ok(())
    }

    /// Runs a raw statement.
    ///
    /// # Errors
    ///
    /// Returns an error if execution fails.
    pub fn raw(&mut self, sql: &str) -> Result<()> {
        self.run(vec![sql.to_string()])
    }

    /// Compiles and runs a blueprint.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::UnsupportedCommand`] if the blueprint holds a
    /// command the dialect cannot express, or a driver error.
    pub fn build(&mut self, blueprint: &Blueprint) -> Result<()> {
        let statements = blueprint.to_sql(self.grammar)?;
        self.run(statements)
    }

    fn run(&mut self, statements: Vec<String>) -> Result<()> {
        if self.pretend {
            self.collect(statements);
            return Ok(());
        }
        transaction(self.conn, |conn| {
            for sql in &statements {
                debug!(sql = %sql, "Executing SQL");
                conn.statement(sql, &[])?;
            }
            Ok::<_, MigrateError>(())
        })
    }

    fn collect(&mut self, statements: Vec<String>) {
        for sql in statements {
            debug!(sql = %sql, "Pretending SQL");
            self.pretended.push(sql);
        }
    }
}

impl std::fmt::Debug for Schema<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("connection", &self.conn.name())
            .field("dialect", &self.grammar.dialect())
            .field("pretend", &self.pretend)
            .finish_non_exhaustive()
    }
}
