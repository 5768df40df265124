//! Blocking SQLite driver for keel.
//!
//! [`SqliteConnection`] implements [`keel_core::Connection`] on top of a
//! single `sqlx` SQLite connection. Every call drives the sqlx future to
//! completion on a private current-thread tokio runtime, so callers see a
//! plain blocking API and `BEGIN`/`COMMIT` always reach the same database
//! handle.
//!
//! # Example
//!
//! ```rust
//! use keel_core::{Connection, QueryBuilder, row};
//! use keel_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::memory().unwrap();
//! conn.statement("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
//! QueryBuilder::table("users").insert(&conn, &[row! { "name" => "Ada" }]).unwrap();
//!
//! let name = QueryBuilder::table("users").value(&conn, "name").unwrap();
//! assert_eq!(name, Some("Ada".into()));
//! ```

mod connection;
mod decode;

pub use connection::{SqliteConnection, SqliteConnector};
