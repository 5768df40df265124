//! Schema blueprints and database migrations for keel.
//!
//! - **Blueprints** - [`Blueprint`] describes a change to one table: its
//!   columns and follow-up commands
//! - **Schema grammars** - [`SchemaGrammar`] compiles a blueprint into
//!   dialect-specific DDL (SQLite, PostgreSQL)
//! - **Schema** - [`Schema`] is the facade migrations use; each table change
//!   runs in its own transaction, or is only collected in pretend mode
//! - **Migrator** - [`Migrator`] applies pending migrations in name order,
//!   rolls them back, and records them in the `migrations` table
//! - **CLI** - [`cli::MigrateCommand`] mounts `migrate`, `migrate:rollback`,
//!   `migrate:reset`, `migrate:refresh`, `migrate:status` and
//!   `generate:migration` in any clap application
//!
//! # Example
//!
//! ```rust
//! use keel_core::Dialect;
//! use keel_migrate::grammar;
//! use keel_migrate::Blueprint;
//! use keel_migrate::blueprint::ChangeKind;
//!
//! let blueprint = Blueprint::build("users", ChangeKind::Create, |table| {
//!     table.increments("id");
//!     table.string("email").unique();
//!     table.boolean("active").default(true);
//! });
//!
//! let sql = blueprint.to_sql(grammar::for_dialect(Dialect::Postgres)).unwrap();
//! assert_eq!(
//!     sql,
//!     vec![r#"CREATE TABLE "users" ("id" SERIAL PRIMARY KEY, "email" VARCHAR(255) NOT NULL UNIQUE, "active" BOOLEAN NOT NULL DEFAULT TRUE)"#]
//! );
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Create a migration for the Post model
//! keel-migrate generate:migration create_posts --model Post
//!
//! # Apply pending migrations
//! keel-migrate migrate
//!
//! # Roll back the last two migrations, printing the SQL only
//! keel-migrate migrate:rollback --step 2 --pretend
//! ```

pub mod blueprint;
pub mod cli;
pub mod error;
pub mod events;
pub mod grammar;
pub mod migration;
pub mod migrator;
pub mod repository;
pub mod schema;
pub mod writer;

pub use blueprint::Blueprint;
pub use error::{MigrateError, Result};
pub use grammar::SchemaGrammar;
pub use migration::{Migration, MigrationSet, MigrationSource, SqlDirectory};
pub use migrator::Migrator;
pub use schema::Schema;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::blueprint::{
        Blueprint, ChangeKind, ColumnDefinition, ColumnType, Command, ConflictResolution,
        DefaultValue, ForeignKeyAction, IntegerWidth,
    };
    pub use crate::error::{MigrateError, Result};
    pub use crate::events::{MigrationDirection, MigrationEvent};
    pub use crate::grammar::{PostgresSchemaGrammar, SchemaGrammar, SqliteSchemaGrammar};
    pub use crate::migration::{Migration, MigrationSet, MigrationSource, SqlDirectory, SqlMigration};
    pub use crate::migrator::{MigrationStatus, Migrator};
    pub use crate::repository::{AppliedMigration, MigrationRepository};
    pub use crate::schema::Schema;
    pub use crate::writer::MigrationWriter;
}
