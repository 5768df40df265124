//! Dialect-specific DDL compilation.
//!
//! A [`SchemaGrammar`] turns a [`Blueprint`] into an ordered list of DDL
//! statements: first the table change itself, then one or more statements
//! per accumulated [`Command`]. Shared compilation lives in default methods;
//! dialects override the fragments that differ.

mod postgres;
mod sqlite;

pub use postgres::PostgresSchemaGrammar;
pub use sqlite::SqliteSchemaGrammar;

use keel_core::{Dialect, FetchShape, Query, Value};

use crate::blueprint::{Blueprint, ChangeKind, ColumnDefinition, Command, DefaultValue, ForeignKey};
use crate::error::{MigrateError, Result};

static SQLITE: SqliteSchemaGrammar = SqliteSchemaGrammar;
static POSTGRES: PostgresSchemaGrammar = PostgresSchemaGrammar;

/// Returns the schema grammar for `dialect`.
#[must_use]
pub fn for_dialect(dialect: Dialect) -> &'static dyn SchemaGrammar {
    match dialect {
        Dialect::Sqlite => &SQLITE,
        Dialect::Postgres => &POSTGRES,
    }
}

/// Compiles blueprints into DDL.
pub trait SchemaGrammar: Send + Sync {
    /// Returns the dialect this grammar targets.
    fn dialect(&self) -> Dialect;

    /// Maps a column's logical type to the dialect type.
    fn column_type(&self, column: &ColumnDefinition) -> String;

    /// Returns the auto-numbering fragment for a non-primary column.
    fn autoincrement_modifier(&self, _column: &ColumnDefinition) -> Option<String> {
        None
    }

    /// Returns the conflict-resolution fragment, if the dialect has one.
    fn conflict_clause(&self, _column: &ColumnDefinition) -> Option<String> {
        None
    }

    /// Compiles the statements that drop every table in the database.
    fn compile_drop_all_tables(&self) -> Vec<String>;

    /// Compiles a catalog lookup for `table`, returning a row if it exists.
    fn compile_table_exists(&self, table: &str) -> Query;

    /// Compiles dropping a named foreign key constraint.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::UnsupportedCommand`] by default.
    fn compile_drop_foreign(&self, _table: &str, _name: &str) -> Result<String> {
        Err(MigrateError::UnsupportedCommand {
            dialect: self.dialect(),
            command: "dropForeign",
        })
    }

    /// Quotes an identifier.
    fn wrap(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    /// Renders a literal for inline use in DDL.
    fn literal(&self, value: &Value) -> String {
        value.to_sql_inline()
    }

    /// Compiles a blueprint: the table change first, then every command in
    /// declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::UnsupportedCommand`] when a command has no
    /// form in this dialect.
    fn compile_blueprint(&self, blueprint: &Blueprint) -> Result<Vec<String>> {
        let table = self.wrap(blueprint.table());
        let mut statements = match blueprint.kind() {
            ChangeKind::Create => vec![self.compile_create(blueprint, false)],
            ChangeKind::CreateIfNotExists => vec![self.compile_create(blueprint, true)],
            ChangeKind::Alter => self.compile_add_columns(blueprint),
            ChangeKind::Drop => vec![format!("DROP TABLE {table}")],
            ChangeKind::DropIfExists => vec![format!("DROP TABLE IF EXISTS {table}")],
        };

        for command in blueprint.commands() {
            statements.push(self.compile_command(blueprint.table(), command)?);
        }
        Ok(statements)
    }

    /// Compiles one command against `table`.
    ///
    /// # Errors
    ///
    /// See [`SchemaGrammar::compile_blueprint`].
    fn compile_command(&self, table: &str, command: &Command) -> Result<String> {
        let sql = match command {
            Command::Rename { to } => {
                format!("ALTER TABLE {} RENAME TO {}", self.wrap(table), self.wrap(to))
            }
            Command::RenameColumn { from, to } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.wrap(table),
                self.wrap(from),
                self.wrap(to)
            ),
            Command::DropColumn { name } => {
                format!("ALTER TABLE {} DROP COLUMN {}", self.wrap(table), self.wrap(name))
            }
            Command::Index {
                columns,
                name,
                unique,
            } => {
                let columns: Vec<String> = columns.iter().map(|c| self.wrap(c)).collect();
                format!(
                    "CREATE {}INDEX {} ON {} ({})",
                    if *unique { "UNIQUE " } else { "" },
                    self.wrap(name),
                    self.wrap(table),
                    columns.join(", ")
                )
            }
            Command::DropIndex { name } => format!("DROP INDEX {}", self.wrap(name)),
            Command::DropForeign { name } => self.compile_drop_foreign(table, name)?,
        };
        Ok(sql)
    }

    /// Compiles `CREATE TABLE` with trailing foreign key clauses.
    fn compile_create(&self, blueprint: &Blueprint, if_not_exists: bool) -> String {
        let mut definitions: Vec<String> = blueprint
            .columns()
            .map(|column| self.column_definition(column, false))
            .collect();
        definitions.extend(blueprint.columns().filter_map(|column| {
            column.foreign.as_ref().map(|foreign| {
                format!(
                    "FOREIGN KEY({}) {}",
                    self.wrap(&column.name),
                    self.references(foreign)
                )
            })
        }));

        let mut sql = String::from("CREATE TABLE ");
        if if_not_exists {
            sql.push_str("IF NOT EXISTS ");
        }
        sql.push_str(&self.wrap(blueprint.table()));
        sql.push_str(" (");
        sql.push_str(&definitions.join(", "));
        sql.push(')');
        sql
    }

    /// Compiles one `ADD COLUMN` statement per column, references inline.
    fn compile_add_columns(&self, blueprint: &Blueprint) -> Vec<String> {
        let table = self.wrap(blueprint.table());
        blueprint
            .columns()
            .map(|column| format!("ALTER TABLE {table} ADD COLUMN {}", self.column_definition(column, true)))
            .collect()
    }

    /// Compiles a column definition.
    ///
    /// Fragments follow the type in a fixed order: autoincrement, nullable,
    /// primary, unique, conflict clause, default, foreign key. A primary key
    /// omits the autoincrement and nullable fragments.
    fn column_definition(&self, column: &ColumnDefinition, inline_foreign: bool) -> String {
        let mut parts = vec![self.wrap(&column.name), self.column_type(column)];

        if column.autoincrement && !column.primary {
            parts.extend(self.autoincrement_modifier(column));
        }
        if !column.nullable && !column.primary {
            parts.push(String::from("NOT NULL"));
        }
        if column.primary {
            parts.push(String::from("PRIMARY KEY"));
        }
        if column.unique {
            parts.push(String::from("UNIQUE"));
        }
        parts.extend(self.conflict_clause(column));
        if let Some(default) = &column.default {
            let rendered = match default {
                DefaultValue::Value(value) => self.literal(value),
                DefaultValue::Expression(expression) => expression.clone(),
            };
            parts.push(format!("DEFAULT {rendered}"));
        }
        if inline_foreign {
            if let Some(foreign) = &column.foreign {
                parts.push(self.references(foreign));
            }
        }

        parts.retain(|part| !part.is_empty());
        parts.join(" ")
    }

    /// Compiles `REFERENCES "table"("key")` with its actions.
    fn references(&self, foreign: &ForeignKey) -> String {
        let mut sql = format!("REFERENCES {}({})", self.wrap(&foreign.table), self.wrap(&foreign.key));
        if let Some(action) = foreign.on_delete.as_sql() {
            sql.push_str(" ON DELETE ");
            sql.push_str(action);
        }
        if let Some(action) = foreign.on_update.as_sql() {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action);
        }
        sql
    }
}

/// Builds the catalog lookup query shared by the dialects.
fn table_exists_query(sql: &str, table: &str) -> Query {
    Query::new(sql, vec![Value::from(table)], FetchShape::Single)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::ForeignKeyAction;

    #[test]
    fn test_for_dialect() {
        assert_eq!(for_dialect(Dialect::Sqlite).dialect(), Dialect::Sqlite);
        assert_eq!(for_dialect(Dialect::Postgres).dialect(), Dialect::Postgres);
    }

    #[test]
    fn test_commands_follow_the_table_change() {
        let blueprint = Blueprint::build("users", ChangeKind::Alter, |table| {
            table.string("nickname").nullable();
            table.rename_column("name", "full_name");
            table.drop_column("legacy");
            table.index(&["nickname"], None);
            table.drop_index("users_email_index");
            table.rename("people");
        });

        let statements = SqliteSchemaGrammar.compile_blueprint(&blueprint).unwrap();
        assert_eq!(
            statements,
            vec![
                r#"ALTER TABLE "users" ADD COLUMN "nickname" VARCHAR(255)"#,
                r#"ALTER TABLE "users" RENAME COLUMN "name" TO "full_name""#,
                r#"ALTER TABLE "users" DROP COLUMN "legacy""#,
                r#"CREATE INDEX "users_nickname_index" ON "users" ("nickname")"#,
                r#"DROP INDEX "users_email_index""#,
                r#"ALTER TABLE "users" RENAME TO "people""#,
            ]
        );
    }

    #[test]
    fn test_create_appends_foreign_keys() {
        let blueprint = Blueprint::build("posts", ChangeKind::Create, |table| {
            table.increments("id");
            table
                .integer("user_id")
                .references("users", "id")
                .on_delete(ForeignKeyAction::Cascade);
        });

        let statements = PostgresSchemaGrammar.compile_blueprint(&blueprint).unwrap();
        assert_eq!(
            statements,
            vec![concat!(
                r#"CREATE TABLE "posts" ("id" SERIAL PRIMARY KEY, "user_id" INTEGER NOT NULL, "#,
                r#"FOREIGN KEY("user_id") REFERENCES "users"("id") ON DELETE CASCADE)"#
            )]
        );
    }

    #[test]
    fn test_alter_references_inline() {
        let blueprint = Blueprint::build("posts", ChangeKind::Alter, |table| {
            table.integer("editor_id").nullable().references("users", "id");
        });

        let statements = SqliteSchemaGrammar.compile_blueprint(&blueprint).unwrap();
        assert_eq!(
            statements,
            vec![r#"ALTER TABLE "posts" ADD COLUMN "editor_id" INTEGER REFERENCES "users"("id")"#]
        );
    }

    #[test]
    fn test_drop_kinds() {
        let drop = Blueprint::new("users", ChangeKind::Drop);
        let drop_if_exists = Blueprint::new("users", ChangeKind::DropIfExists);

        assert_eq!(
            SqliteSchemaGrammar.compile_blueprint(&drop).unwrap(),
            vec![r#"DROP TABLE "users""#]
        );
        assert_eq!(
            PostgresSchemaGrammar.compile_blueprint(&drop_if_exists).unwrap(),
            vec![r#"DROP TABLE IF EXISTS "users""#]
        );
    }

    #[test]
    fn test_fragment_order() {
        let mut blueprint = Blueprint::new("users", ChangeKind::Create);
        blueprint.string("email").unique().default("nobody");

        let definition = SqliteSchemaGrammar.column_definition(blueprint.columns().next().unwrap(), false);
        assert_eq!(definition, r#""email" VARCHAR(255) NOT NULL UNIQUE DEFAULT 'nobody'"#);
    }

    #[test]
    fn test_wrap_escapes_quotes() {
        assert_eq!(SqliteSchemaGrammar.wrap("we\"ird"), "\"we\"\"ird\"");
    }
}
