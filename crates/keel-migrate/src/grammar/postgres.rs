//! PostgreSQL schema grammar.

use keel_core::{Dialect, Query};

use super::{table_exists_query, SchemaGrammar};
use crate::blueprint::{ColumnDefinition, ColumnType, IntegerWidth};
use crate::error::Result;

/// PostgreSQL DDL.
///
/// Auto-numbered primary keys use the `SERIAL` family; other auto-numbered
/// columns become identity columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSchemaGrammar;

impl SchemaGrammar for PostgresSchemaGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn column_type(&self, column: &ColumnDefinition) -> String {
        let serial = column.primary && column.autoincrement;
        let kind = match column.kind {
            ColumnType::Char(length) => return format!("CHAR({length})"),
            ColumnType::String(length) => return format!("VARCHAR({length})"),
            ColumnType::Text => "TEXT",
            ColumnType::Integer(IntegerWidth::Tiny | IntegerWidth::Small) if serial => "SMALLSERIAL",
            ColumnType::Integer(IntegerWidth::Medium | IntegerWidth::Normal) if serial => "SERIAL",
            ColumnType::Integer(IntegerWidth::Big) if serial => "BIGSERIAL",
            ColumnType::Integer(IntegerWidth::Tiny | IntegerWidth::Small) => "SMALLINT",
            ColumnType::Integer(IntegerWidth::Medium | IntegerWidth::Normal) => "INTEGER",
            ColumnType::Integer(IntegerWidth::Big) => "BIGINT",
            ColumnType::Float => "REAL",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP(0) WITHOUT TIME ZONE",
            ColumnType::TimestampTz => "TIMESTAMP(0) WITH TIME ZONE",
        };
        kind.to_string()
    }

    fn autoincrement_modifier(&self, column: &ColumnDefinition) -> Option<String> {
        matches!(column.kind, ColumnType::Integer(_))
            .then(|| String::from("GENERATED BY DEFAULT AS IDENTITY"))
    }

    fn compile_drop_foreign(&self, table: &str, name: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.wrap(table),
            self.wrap(name)
        ))
    }

    fn compile_drop_all_tables(&self) -> Vec<String> {
        vec![
            String::from("DROP SCHEMA public CASCADE"),
            String::from("CREATE SCHEMA public"),
        ]
    }

    fn compile_table_exists(&self, table: &str) -> Query {
        table_exists_query(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1",
            table,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{Blueprint, ChangeKind};

    fn compile(kind: ChangeKind, define: impl FnOnce(&mut Blueprint)) -> Vec<String> {
        let blueprint = Blueprint::build("t", kind, define);
        PostgresSchemaGrammar.compile_blueprint(&blueprint).unwrap()
    }

    #[test]
    fn test_serial_primary_keys() {
        let sql = compile(ChangeKind::Create, |t| {
            t.big_increments("id");
        });
        assert_eq!(sql, vec![r#"CREATE TABLE "t" ("id" BIGSERIAL PRIMARY KEY)"#]);
    }

    #[test]
    fn test_identity_for_non_primary_autoincrement() {
        let sql = compile(ChangeKind::Alter, |t| {
            t.integer("position").autoincrement();
        });
        assert_eq!(
            sql,
            vec![r#"ALTER TABLE "t" ADD COLUMN "position" INTEGER GENERATED BY DEFAULT AS IDENTITY NOT NULL"#]
        );
    }

    #[test]
    fn test_type_mapping() {
        let sql = compile(ChangeKind::CreateIfNotExists, |t| {
            t.small_integer("rank");
            t.float("score").nullable();
            t.timestamp("created_at").nullable();
            t.timestamp_tz("seen_at").nullable();
            t.boolean("active").default(false);
        });
        assert_eq!(
            sql,
            vec![concat!(
                r#"CREATE TABLE IF NOT EXISTS "t" ("rank" SMALLINT NOT NULL, "score" REAL, "#,
                r#""created_at" TIMESTAMP(0) WITHOUT TIME ZONE, "seen_at" TIMESTAMP(0) WITH TIME ZONE, "#,
                r#""active" BOOLEAN NOT NULL DEFAULT FALSE)"#
            )]
        );
    }

    #[test]
    fn test_conflict_clause_is_ignored() {
        let sql = compile(ChangeKind::Create, |t| {
            t.string("slug")
                .on_conflict(crate::blueprint::ConflictResolution::Ignore);
        });
        assert_eq!(sql, vec![r#"CREATE TABLE "t" ("slug" VARCHAR(255) NOT NULL)"#]);
    }

    #[test]
    fn test_drop_foreign() {
        let sql = compile(ChangeKind::Alter, |t| t.drop_foreign("t_user_id_foreign"));
        assert_eq!(sql, vec![r#"ALTER TABLE "t" DROP CONSTRAINT "t_user_id_foreign""#]);
    }

    #[test]
    fn test_drop_all_tables() {
        assert_eq!(
            PostgresSchemaGrammar.compile_drop_all_tables(),
            vec!["DROP SCHEMA public CASCADE", "CREATE SCHEMA public"]
        );
    }
}
