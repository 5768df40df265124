//! # keel-orm
//!
//! Active-record style models on top of `keel-core`.
//!
//! This crate provides:
//! - [`ModelSchema`] - fields, relations and validation rules of a model,
//!   registered once in a [`Registry`]
//! - [`Model`] - an instance handle with dirty tracking against the last
//!   loaded or saved snapshot
//! - Relation strategies ([`relation`]) for `BelongsTo`, `HasOne`,
//!   `HasMany`, `HasOneThrough` and `HasManyThrough`, each matching
//!   eager-loaded rows onto their owners with one query
//! - [`ModelQuery`] - queries returning models, plus inserts and updates
//!   that cascade through loaded relations
//! - [`ChangeTracker`] - the save pipeline: normalize, validate, link
//!   bidirectional relations, persist
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use keel_core::{row, Connection, ConnectionManager};
//! use keel_orm::prelude::*;
//! use keel_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::memory().unwrap();
//! conn.statement("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[]).unwrap();
//! conn.statement(
//!     "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT, user_id INTEGER)",
//!     &[],
//! )
//! .unwrap();
//!
//! let mut orm = Orm::new(ConnectionManager::from_connection(Arc::new(conn)));
//! orm.register(
//!     ModelSchema::new("User")
//!         .field("name")
//!         .relation(RelationSpec::has_many("posts", "Post")),
//! )
//! .unwrap();
//! orm.register(
//!     ModelSchema::new("Post")
//!         .field("title")
//!         .field("user_id")
//!         .relation(RelationSpec::belongs_to("author", "User").foreign_key("user_id")),
//! )
//! .unwrap();
//!
//! let user = orm.make_with("User", row! { "name" => "Ada" }).unwrap();
//! let post = orm.make_with("Post", row! { "title" => "Notes" }).unwrap();
//! user.set_related("posts", vec![post.clone()]).unwrap();
//! orm.save(&user).unwrap();
//!
//! let loaded = orm.query("User").unwrap().with("posts").first().unwrap().unwrap();
//! let posts = loaded.related_many("posts").unwrap();
//! assert_eq!(posts.len(), 1);
//! assert_eq!(posts[0].get("user_id"), user.id());
//! ```

pub mod error;
pub mod model;
pub mod naming;
pub mod orm;
pub mod query;
pub mod registry;
pub mod relation;
pub mod schema;
pub mod tracker;
pub mod validation;

pub use error::{OrmError, Result};
pub use model::{Model, PersistState, Related};
pub use naming::{NamingStrategy, SnakeCaseNaming};
pub use orm::Orm;
pub use query::ModelQuery;
pub use registry::{Registry, ResolvedRelation};
pub use schema::{FieldDef, ModelSchema, RelationKind, RelationSpec};
pub use tracker::ChangeTracker;
pub use validation::{DefaultValidator, Rule, RuleSet, ValidationEngine, ValidationResult};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{OrmError, Result};
    pub use crate::model::{Model, Related};
    pub use crate::orm::Orm;
    pub use crate::schema::{transforms, FieldDef, ModelSchema, RelationSpec};
    pub use crate::validation::{DefaultValidator, Rule};
}
