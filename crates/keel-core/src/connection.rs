//! The blocking connection contract.
//!
//! Drivers implement [`Connection`]; everything above it (query builder,
//! schema builder, migrator, models) only talks to `&dyn Connection`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::query::{Dialect, Grammar};
use crate::value::{Row, Value};

/// A live database connection.
///
/// All calls block until the database answers. Bindings are always passed as
/// a flat ordered list matching the `?` placeholders in `sql`.
pub trait Connection: Send + Sync {
    /// Returns the logical name this connection was resolved under.
    fn name(&self) -> &str;

    /// Returns the SQL dialect spoken by this connection.
    fn dialect(&self) -> Dialect;

    /// Runs a query and returns every row.
    fn select(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>>;

    /// Runs a query and returns the first row, if any.
    fn select_single(&self, sql: &str, bindings: &[Value]) -> Result<Option<Row>> {
        Ok(self.select(sql, bindings)?.into_iter().next())
    }

    /// Runs a statement that returns nothing.
    fn statement(&self, sql: &str, bindings: &[Value]) -> Result<()>;

    /// Runs a statement and returns the number of affected rows.
    fn affecting_statement(&self, sql: &str, bindings: &[Value]) -> Result<u64>;

    /// Starts a transaction.
    fn begin_transaction(&self) -> Result<()>;

    /// Commits the current transaction.
    fn commit(&self) -> Result<()>;

    /// Rolls back the current transaction.
    fn rollback(&self) -> Result<()>;

    /// Returns the query log of this connection.
    fn query_log(&self) -> &QueryLog;

    /// Returns the DML grammar for this connection's dialect.
    fn grammar(&self) -> &'static dyn Grammar {
        self.dialect().grammar()
    }

    /// Starts recording executed statements.
    fn enable_query_log(&self) {
        self.query_log().enable();
    }

    /// Stops recording executed statements.
    fn disable_query_log(&self) {
        self.query_log().disable();
    }

    /// Returns the statements recorded so far.
    fn logged_queries(&self) -> Vec<LoggedQuery> {
        self.query_log().entries()
    }

    /// Clears the recorded statements.
    fn flush_query_log(&self) {
        self.query_log().flush();
    }
}

/// A statement recorded by a [`QueryLog`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedQuery {
    /// The SQL text as sent to the driver.
    pub sql: String,
    /// The bindings sent with it.
    pub bindings: Vec<Value>,
    /// Wall-clock time spent in the driver.
    pub elapsed: Duration,
}

/// Records executed statements while enabled.
#[derive(Debug, Default)]
pub struct QueryLog {
    enabled: AtomicBool,
    entries: Mutex<Vec<LoggedQuery>>,
}

impl QueryLog {
    /// Creates a disabled, empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Stops recording. Entries already recorded are kept.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Returns whether the log is recording.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Records a statement if the log is enabled.
    pub fn record(&self, sql: &str, bindings: &[Value], elapsed: Duration) {
        debug!(sql = %sql, bindings = bindings.len(), ?elapsed, "Executed SQL");
        if !self.is_enabled() {
            return;
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LoggedQuery {
                sql: sql.to_string(),
                bindings: bindings.to_vec(),
                elapsed,
            });
    }

    /// Returns a copy of the recorded statements.
    #[must_use]
    pub fn entries(&self) -> Vec<LoggedQuery> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Discards the recorded statements.
    pub fn flush(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Runs `f` inside a transaction on `conn`.
///
/// Commits when `f` succeeds. When `f` fails the transaction is rolled back
/// and the error is returned to the caller.
///
/// # Errors
///
/// Returns the error produced by `f`, or a connection error raised while
/// beginning or committing.
pub fn transaction<T, E, F>(conn: &dyn Connection, f: F) -> std::result::Result<T, E>
where
    F: FnOnce(&dyn Connection) -> std::result::Result<T, E>,
    E: From<Error>,
{
    conn.begin_transaction()?;
    match f(conn) {
        Ok(value) => {
            conn.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.rollback() {
                warn!(connection = conn.name(), error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnection;

    #[test]
    fn test_transaction_commits_on_success() {
        let conn = FakeConnection::with_rows(Vec::new());
        let value: Result<i32> = transaction(&conn, |c| {
            c.statement("INSERT INTO t DEFAULT VALUES", &[])?;
            Ok(42)
        });

        assert_eq!(value.unwrap(), 42);
        let sql: Vec<String> = conn.calls().into_iter().map(|(sql, _)| sql).collect();
        assert_eq!(sql, vec!["BEGIN", "INSERT INTO t DEFAULT VALUES", "COMMIT"]);
    }

    #[test]
    fn test_transaction_surfaces_errors_after_rollback() {
        let conn = FakeConnection::with_rows(Vec::new());
        let result: Result<()> = transaction(&conn, |_| Err(Error::Connection("boom".into())));

        assert!(matches!(result, Err(Error::Connection(msg)) if msg == "boom"));
        let sql: Vec<String> = conn.calls().into_iter().map(|(sql, _)| sql).collect();
        assert_eq!(sql, vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn test_query_log_toggles() {
        let log = QueryLog::new();
        log.record("SELECT 1", &[], Duration::ZERO);
        assert!(log.entries().is_empty());

        log.enable();
        log.record("SELECT 2", &[Value::Int(1)], Duration::ZERO);
        log.disable();
        log.record("SELECT 3", &[], Duration::ZERO);

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sql, "SELECT 2");

        log.flush();
        assert!(log.entries().is_empty());
    }
}
