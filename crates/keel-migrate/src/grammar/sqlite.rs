//! SQLite schema grammar.

use keel_core::{Dialect, Query, Value};

use super::{table_exists_query, SchemaGrammar};
use crate::blueprint::{ColumnDefinition, ColumnType};

/// SQLite DDL.
///
/// Every integer width maps to `INTEGER`, so an auto-numbered primary key
/// compiles to `INTEGER PRIMARY KEY` and aliases the rowid.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSchemaGrammar;

impl SchemaGrammar for SqliteSchemaGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn column_type(&self, column: &ColumnDefinition) -> String {
        match column.kind {
            ColumnType::Char(length) => format!("CHAR({length})"),
            ColumnType::String(length) => format!("VARCHAR({length})"),
            ColumnType::Text => String::from("TEXT"),
            ColumnType::Integer(_) => String::from("INTEGER"),
            ColumnType::Float => String::from("FLOAT"),
            ColumnType::Double => String::from("DOUBLE"),
            ColumnType::Boolean => String::from("BOOLEAN"),
            ColumnType::Date => String::from("DATE"),
            ColumnType::Timestamp | ColumnType::TimestampTz => String::from("DATETIME"),
        }
    }

    fn conflict_clause(&self, column: &ColumnDefinition) -> Option<String> {
        column
            .on_conflict
            .map(|resolution| format!("ON CONFLICT {}", resolution.as_sql()))
    }

    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Bool(b) => String::from(if *b { "1" } else { "0" }),
            other => other.to_sql_inline(),
        }
    }

    fn compile_drop_all_tables(&self) -> Vec<String> {
        vec![
            String::from("PRAGMA writable_schema = 1"),
            String::from("DELETE FROM sqlite_master WHERE type IN ('table', 'index', 'trigger')"),
            String::from("PRAGMA writable_schema = 0"),
            String::from("VACUUM"),
        ]
    }

    fn compile_table_exists(&self, table: &str) -> Query {
        table_exists_query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            table,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{Blueprint, ChangeKind, ConflictResolution};
    use crate::error::MigrateError;

    fn create(define: impl FnOnce(&mut Blueprint)) -> String {
        let blueprint = Blueprint::build("t", ChangeKind::Create, define);
        SqliteSchemaGrammar.compile_blueprint(&blueprint).unwrap().remove(0)
    }

    #[test]
    fn test_increments_is_integer_primary_key() {
        let sql = create(|t| {
            t.increments("id");
        });
        assert_eq!(sql, r#"CREATE TABLE "t" ("id" INTEGER PRIMARY KEY)"#);
    }

    #[test]
    fn test_type_mapping() {
        let sql = create(|t| {
            t.char("code", 3);
            t.text("body").nullable();
            t.big_integer("views");
            t.double("ratio");
            t.timestamp_tz("seen_at").nullable();
        });
        assert_eq!(
            sql,
            concat!(
                r#"CREATE TABLE "t" ("code" CHAR(3) NOT NULL, "body" TEXT, "views" INTEGER NOT NULL, "#,
                r#""ratio" DOUBLE NOT NULL, "seen_at" DATETIME)"#
            )
        );
    }

    #[test]
    fn test_boolean_default_and_conflict_clause() {
        let sql = create(|t| {
            t.boolean("active").default(true);
            t.string("slug").unique().on_conflict(ConflictResolution::Replace);
        });
        assert_eq!(
            sql,
            concat!(
                r#"CREATE TABLE "t" ("active" BOOLEAN NOT NULL DEFAULT 1, "#,
                r#""slug" VARCHAR(255) NOT NULL UNIQUE ON CONFLICT REPLACE)"#
            )
        );
    }

    #[test]
    fn test_raw_default() {
        let sql = create(|t| {
            t.timestamp("created_at").default_raw("CURRENT_TIMESTAMP");
        });
        assert_eq!(
            sql,
            r#"CREATE TABLE "t" ("created_at" DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP)"#
        );
    }

    #[test]
    fn test_drop_foreign_is_unsupported() {
        let blueprint = Blueprint::build("posts", ChangeKind::Alter, |t| t.drop_foreign("posts_user_id_foreign"));
        let err = SqliteSchemaGrammar.compile_blueprint(&blueprint).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::UnsupportedCommand {
                dialect: Dialect::Sqlite,
                command: "dropForeign"
            }
        ));
    }

    #[test]
    fn test_drop_all_tables_and_table_exists() {
        let statements = SqliteSchemaGrammar.compile_drop_all_tables();
        assert_eq!(statements.first().unwrap(), "PRAGMA writable_schema = 1");
        assert_eq!(statements.last().unwrap(), "VACUUM");

        let query = SqliteSchemaGrammar.compile_table_exists("users");
        assert_eq!(query.placeholder_count(), 1);
        assert_eq!(query.bindings, vec![Value::from("users")]);
    }
}
