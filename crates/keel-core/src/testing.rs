//! A connection double for unit tests.

use std::sync::Mutex;

use crate::connection::{Connection, QueryLog};
use crate::error::Result;
use crate::query::Dialect;
use crate::value::{Row, Value};

/// Answers every select with canned rows and records each call.
pub struct FakeConnection {
    dialect: Dialect,
    rows: Vec<Row>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    log: QueryLog,
}

impl FakeConnection {
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            dialect: Dialect::Sqlite,
            rows,
            calls: Mutex::new(Vec::new()),
            log: QueryLog::new(),
        }
    }

    pub fn postgres() -> Self {
        Self {
            dialect: Dialect::Postgres,
            ..Self::with_rows(Vec::new())
        }
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, sql: &str, bindings: &[Value]) {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), bindings.to_vec()));
    }
}

impl Connection for FakeConnection {
    fn name(&self) -> &str {
        "fake"
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn select(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>> {
        self.record(sql, bindings);
        Ok(self.rows.clone())
    }

    fn statement(&self, sql: &str, bindings: &[Value]) -> Result<()> {
        self.record(sql, bindings);
        Ok(())
    }

    fn affecting_statement(&self, sql: &str, bindings: &[Value]) -> Result<u64> {
        self.record(sql, bindings);
        Ok(1)
    }

    fn begin_transaction(&self) -> Result<()> {
        self.record("BEGIN", &[]);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.record("COMMIT", &[]);
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.record("ROLLBACK", &[]);
        Ok(())
    }

    fn query_log(&self) -> &QueryLog {
        &self.log
    }
}
