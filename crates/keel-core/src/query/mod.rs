//! Query building and compilation.
//!
//! [`QueryBuilder`] only records what the caller asked for. A [`Grammar`]
//! turns that record into a [`Query`]: SQL text with literal `?`
//! placeholders and the bindings that fill them, in placeholder order.

mod builder;
pub mod grammar;
mod operator;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use builder::{Column, Condition, Direction, Join, JoinKind, JoinOn, Order, QueryBuilder};
pub use grammar::{Grammar, PostgresGrammar, SqliteGrammar};
pub use operator::{normalize_operator, OPERATORS, POSTGRES_OPERATORS};

use crate::value::Value;

/// What a compiled statement is expected to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchShape {
    /// Any number of rows.
    Rows,
    /// At most one row.
    Single,
    /// An affected-row count.
    Affected,
    /// Nothing.
    None,
}

/// A compiled statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Bindings in placeholder order.
    pub bindings: Vec<Value>,
    /// Expected result shape.
    pub shape: FetchShape,
}

impl Query {
    /// Creates a compiled statement.
    pub fn new(sql: impl Into<String>, bindings: Vec<Value>, shape: FetchShape) -> Self {
        Self {
            sql: sql.into(),
            bindings,
            shape,
        }
    }

    /// Returns the number of `?` placeholders in the SQL text.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.sql.matches('?').count()
    }
}

/// SQL dialects with a built-in grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQLite.
    Sqlite,
    /// PostgreSQL.
    Postgres,
}

static SQLITE_GRAMMAR: SqliteGrammar = SqliteGrammar;
static POSTGRES_GRAMMAR: PostgresGrammar = PostgresGrammar;

impl Dialect {
    /// Returns the DML grammar for this dialect.
    #[must_use]
    pub fn grammar(self) -> &'static dyn Grammar {
        match self {
            Self::Sqlite => &SQLITE_GRAMMAR,
            Self::Postgres => &POSTGRES_GRAMMAR,
        }
    }

    /// Returns the dialect's canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
