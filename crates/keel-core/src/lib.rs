//! Core building blocks for keel.
//!
//! This crate contains everything that does not depend on a particular
//! database driver:
//!
//! - **Values** - [`Value`] and [`Row`], the currency exchanged with drivers
//! - **Connections** - the blocking [`Connection`] contract, the
//!   [`ConnectionManager`] that resolves named connections, and
//!   [`transaction`]
//! - **Query building** - [`QueryBuilder`] accumulates a statement
//!   description and a dialect [`Grammar`] compiles it to SQL text plus
//!   ordered bindings
//!
//! # Example
//!
//! ```rust
//! use keel_core::query::{Dialect, QueryBuilder};
//!
//! let query = QueryBuilder::table("users")
//!     .where_("name", "LIKE", "%News")
//!     .unwrap();
//!
//! let compiled = Dialect::Sqlite.grammar().compile_select(&query).unwrap();
//! assert_eq!(compiled.sql, "SELECT * FROM users WHERE name LIKE ?");
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod query;
pub mod value;

#[cfg(test)]
mod testing;

pub use config::{ConnectionConfig, DatabaseConfig};
pub use connection::{transaction, Connection, LoggedQuery, QueryLog};
pub use error::{Error, Result};
pub use manager::{ConnectionManager, Connector};
pub use query::{Dialect, FetchShape, Grammar, Query, QueryBuilder};
pub use value::{Key, Row, Value};

/// Builds a [`Row`] from `column => value` pairs.
///
/// ```rust
/// use keel_core::{row, Value};
///
/// let row = row! { "name" => "Ada", "age" => 36 };
/// assert_eq!(row["age"], Value::Int(36));
/// ```
#[macro_export]
macro_rules! row {
    () => { $crate::Row::new() };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::Row::new();
        $( row.insert(::std::string::String::from($column), $crate::Value::from($value)); )+
        row
    }};
}
