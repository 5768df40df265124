//! Migrator behaviour against a real SQLite database.

use std::fs;
use std::sync::Arc;

use keel_core::{
    row, Connection, ConnectionConfig, ConnectionManager, DatabaseConfig, QueryBuilder, Value,
};
use keel_migrate::prelude::*;
use keel_sqlite::{SqliteConnection, SqliteConnector};

struct CreateTable {
    name: &'static str,
    table: &'static str,
    connection: Option<&'static str>,
}

impl Migration for CreateTable {
    fn name(&self) -> &str {
        self.name
    }

    fn connection(&self) -> Option<&str> {
        self.connection
    }

    fn up(&self, schema: &mut Schema<'_>) -> Result<()> {
        schema.create(self.table, |table| {
            table.increments("id");
            table.string("title").nullable();
        })
    }

    fn down(&self, schema: &mut Schema<'_>) -> Result<()> {
        schema.drop(self.table)
    }
}

const fn create(name: &'static str, table: &'static str) -> CreateTable {
    CreateTable {
        name,
        table,
        connection: None,
    }
}

fn memory_manager() -> ConnectionManager {
    ConnectionManager::from_connection(Arc::new(SqliteConnection::memory().unwrap()))
}

fn has_table(conn: &dyn Connection, table: &str) -> bool {
    Schema::new(conn).has_table(table).unwrap()
}

#[test]
fn test_migrations_apply_in_name_order_and_roll_back_one_step() {
    let manager = memory_manager();
    let migrator = Migrator::new(&manager)
        .with_source(
            &MigrationSet::new()
                .with(create("20240102_b", "b"))
                .with(create("20240101_a", "a")),
        )
        .unwrap();

    assert_eq!(
        migrator.apply_pending_migrations().unwrap(),
        vec!["20240101_a", "20240102_b"]
    );

    let conn = manager.default_connection().unwrap();
    let recorded = QueryBuilder::table("migrations")
        .order_by("id")
        .pluck(conn.as_ref(), "name")
        .unwrap();
    assert_eq!(recorded, vec![Value::from("20240101_a"), Value::from("20240102_b")]);

    assert_eq!(migrator.rollback(1).unwrap(), vec!["20240102_b"]);
    assert!(has_table(conn.as_ref(), "a"));
    assert!(!has_table(conn.as_ref(), "b"));

    let pending: Vec<String> = migrator
        .pending()
        .unwrap()
        .iter()
        .map(|m| m.name().to_string())
        .collect();
    assert_eq!(pending, vec!["20240102_b"]);
}

#[test]
fn test_migrations_target_their_own_connection() {
    let config = DatabaseConfig::single("main", ConnectionConfig::new("sqlite", "sqlite::memory:"))
        .with_connection("audit", ConnectionConfig::new("sqlite", "sqlite::memory:"));
    let manager = ConnectionManager::new(config).with_connector("sqlite", SqliteConnector);

    let migrator = Migrator::new(&manager)
        .with_source(
            &MigrationSet::new()
                .with(create("20240101_posts", "posts"))
                .with(CreateTable {
                    name: "20240102_events",
                    table: "events",
                    connection: Some("audit"),
                }),
        )
        .unwrap();
    migrator.apply_pending_migrations().unwrap();

    let main = manager.connection("main").unwrap();
    let audit = manager.connection("audit").unwrap();
    assert!(has_table(main.as_ref(), "posts"));
    assert!(!has_table(main.as_ref(), "events"));
    assert!(has_table(audit.as_ref(), "events"));

    let status = migrator.status().unwrap();
    assert_eq!(status[1].connection, "audit");
    assert!(status.iter().all(|s| s.applied));
}

#[test]
fn test_sql_directory_migrations_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("2024_01_01_000000_create_users.up.sql"),
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);\nINSERT INTO users (name) VALUES ('seed');\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("2024_01_01_000000_create_users.down.sql"),
        "DROP TABLE users;\n",
    )
    .unwrap();

    let manager = memory_manager();
    let migrator = Migrator::new(&manager)
        .with_source(&SqlDirectory::new(dir.path()))
        .unwrap();
    migrator.apply_pending_migrations().unwrap();

    let conn = manager.default_connection().unwrap();
    assert_eq!(QueryBuilder::table("users").count(conn.as_ref()).unwrap(), 1);

    migrator.reset().unwrap();
    assert!(!has_table(conn.as_ref(), "users"));
}

#[test]
fn test_blueprint_foreign_keys_are_enforced() {
    let conn = SqliteConnection::memory().unwrap();
    let mut schema = Schema::new(&conn);
    schema
        .create("users", |table| {
            table.increments("id");
        })
        .unwrap();
    schema
        .create("posts", |table| {
            table.increments("id");
            table
                .integer("user_id")
                .references("users", "id")
                .on_delete(ForeignKeyAction::Cascade);
        })
        .unwrap();

    QueryBuilder::table("users").insert(&conn, &[row! { "id" => 1 }]).unwrap();
    QueryBuilder::table("posts").insert(&conn, &[row! { "user_id" => 1 }]).unwrap();
    assert!(QueryBuilder::table("posts")
        .insert(&conn, &[row! { "user_id" => 99 }])
        .is_err());

    QueryBuilder::table("users").delete(&conn).unwrap();
    assert_eq!(QueryBuilder::table("posts").count(&conn).unwrap(), 0);
}
