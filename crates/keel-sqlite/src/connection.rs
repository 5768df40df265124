//! SQLite connection and connector.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use keel_core::{Connection, ConnectionConfig, Connector, Dialect, Error, QueryLog, Result, Row, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions};
use sqlx::{ConnectOptions, Sqlite};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::decode::decode_row;

/// A blocking SQLite connection.
///
/// Must not be used from inside an async runtime: each call blocks the
/// current thread on the connection's own runtime.
pub struct SqliteConnection {
    name: String,
    inner: Mutex<sqlx::SqliteConnection>,
    runtime: Runtime,
    depth: AtomicUsize,
    log: QueryLog,
}

impl SqliteConnection {
    /// Opens the database at `url` (`sqlite::memory:`, `sqlite:app.db`, ...).
    ///
    /// Missing database files are created. Foreign key enforcement is on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Driver`] if the URL is invalid or the database cannot
    /// be opened, and [`Error::Connection`] if the runtime cannot start.
    pub fn open(name: impl Into<String>, url: &str) -> Result<Self> {
        let name = name.into();
        let options = SqliteConnectOptions::from_str(url)
            .map_err(Error::driver)?
            .create_if_missing(true)
            .foreign_keys(true);
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;
        let inner = runtime.block_on(options.connect()).map_err(Error::driver)?;

        info!(connection = %name, url = %url, "Opened SQLite connection");
        Ok(Self {
            name,
            inner: Mutex::new(inner),
            runtime,
            depth: AtomicUsize::new(0),
            log: QueryLog::new(),
        })
    }

    /// Opens a private in-memory database named `sqlite`.
    ///
    /// # Errors
    ///
    /// See [`SqliteConnection::open`].
    pub fn memory() -> Result<Self> {
        Self::open("sqlite", "sqlite::memory:")
    }

    /// Returns the current transaction nesting depth.
    #[must_use]
    pub fn transaction_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, sqlx::SqliteConnection> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn execute(&self, sql: &str, bindings: &[Value]) -> Result<u64> {
        let started = Instant::now();
        let mut conn = self.lock();
        let result = self
            .runtime
            .block_on(bind_all(sql, bindings).execute(&mut *conn))
            .map_err(Error::driver)?;
        self.log.record(sql, bindings, started.elapsed());
        Ok(result.rows_affected())
    }
}

impl Connection for SqliteConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn select(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>> {
        let started = Instant::now();
        let mut conn = self.lock();
        let rows = self
            .runtime
            .block_on(bind_all(sql, bindings).fetch_all(&mut *conn))
            .map_err(Error::driver)?;
        self.log.record(sql, bindings, started.elapsed());
        rows.iter().map(decode_row).collect()
    }

    fn select_single(&self, sql: &str, bindings: &[Value]) -> Result<Option<Row>> {
        let started = Instant::now();
        let mut conn = self.lock();
        let row = self
            .runtime
            .block_on(bind_all(sql, bindings).fetch_optional(&mut *conn))
            .map_err(Error::driver)?;
        self.log.record(sql, bindings, started.elapsed());
        row.as_ref().map(decode_row).transpose()
    }

    fn statement(&self, sql: &str, bindings: &[Value]) -> Result<()> {
        self.execute(sql, bindings).map(|_| ())
    }

    fn affecting_statement(&self, sql: &str, bindings: &[Value]) -> Result<u64> {
        self.execute(sql, bindings)
    }

    /// Starts a transaction, or a savepoint when one is already open.
    fn begin_transaction(&self) -> Result<()> {
        let depth = self.depth.load(Ordering::SeqCst);
        if depth == 0 {
            self.execute("BEGIN", &[])?;
        } else {
            self.execute(&format!("SAVEPOINT trans{}", depth + 1), &[])?;
        }
        self.depth.store(depth + 1, Ordering::SeqCst);
        debug!(connection = %self.name, depth = depth + 1, "Began transaction");
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let depth = self.depth.load(Ordering::SeqCst);
        match depth {
            0 => return Err(Error::Connection(String::from("no active transaction"))),
            1 => self.execute("COMMIT", &[])?,
            _ => self.execute(&format!("RELEASE SAVEPOINT trans{depth}"), &[])?,
        };
        self.depth.store(depth - 1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let depth = self.depth.load(Ordering::SeqCst);
        match depth {
            0 => return Err(Error::Connection(String::from("no active transaction"))),
            1 => self.execute("ROLLBACK", &[])?,
            _ => self.execute(&format!("ROLLBACK TO SAVEPOINT trans{depth}"), &[])?,
        };
        self.depth.store(depth - 1, Ordering::SeqCst);
        Ok(())
    }

    fn query_log(&self) -> &QueryLog {
        &self.log
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("name", &self.name)
            .field("depth", &self.transaction_depth())
            .finish_non_exhaustive()
    }
}

/// Binds every value to a query, in order.
fn bind_all<'q>(sql: &'q str, bindings: &[Value]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    bindings
        .iter()
        .fold(sqlx::query(sql), |query, value| match value {
            Value::Null => query.bind(Option::<i64>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Int(n) => query.bind(*n),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.clone()),
            Value::Blob(b) => query.bind(b.clone()),
        })
}

/// Opens [`SqliteConnection`]s for the `sqlite` driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

impl Connector for SqliteConnector {
    fn connect(&self, name: &str, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(SqliteConnection::open(name, &config.url)?))
    }
}
