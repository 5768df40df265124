//! DML grammars.
//!
//! Compilation is shared: [`Grammar`] provides default methods for every
//! fragment, and a dialect overrides only what it spells differently.
//! A SELECT is assembled from its fragments in fixed order (columns, from,
//! joins, where, order, limit/offset), skipping empty ones and joining the
//! rest with single spaces. Bindings are appended in the same order, so the
//! n-th `?` always matches the n-th binding.

mod postgres;
mod sqlite;

pub use postgres::PostgresGrammar;
pub use sqlite::SqliteGrammar;

use indexmap::IndexSet;

use super::builder::{Column, Condition, Direction, QueryBuilder};
use super::{Dialect, FetchShape, Query};
use crate::error::{Error, Result};
use crate::value::{Row, Value};

/// Compiles [`QueryBuilder`] state into SQL for one dialect.
pub trait Grammar: Send + Sync {
    /// Returns the dialect this grammar writes.
    fn dialect(&self) -> Dialect;

    /// Returns whether the dialect understands an allow-listed operator.
    fn supports_operator(&self, _operator: &str) -> bool {
        true
    }

    /// Rewrites the `?` placeholders of compiled SQL into the dialect's
    /// parameter syntax.
    fn parameterize(&self, sql: String) -> String {
        sql
    }

    /// Compiles a SELECT.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperator`] for operators the dialect lacks.
    fn compile_select(&self, query: &QueryBuilder) -> Result<Query> {
        let mut bindings = Vec::new();
        let fragments = [
            Some(self.compile_columns(query, &mut bindings)),
            self.compile_from(query),
            self.compile_joins(query)?,
            self.compile_wheres(query, &mut bindings)?,
            self.compile_orders(query),
            self.compile_limit_offset(query, &mut bindings),
        ];
        Ok(Query::new(
            self.parameterize(join_fragments(fragments)),
            bindings,
            FetchShape::Rows,
        ))
    }

    /// Compiles an INSERT of one or more records.
    ///
    /// Columns are the union of all record keys in first-seen order. A record
    /// lacking a column binds NULL for it. With no columns at all the
    /// statement inserts a single row of defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingTable`] without a target table, or
    /// [`Error::DefaultValuesBatch`] for several records with no columns.
    fn compile_insert(&self, query: &QueryBuilder, records: &[Row], returning: bool) -> Result<Query> {
        let table = require_table(query)?;
        let columns: IndexSet<&str> = records
            .iter()
            .flat_map(|record| record.keys().map(String::as_str))
            .collect();
        if columns.is_empty() && records.len() > 1 {
            return Err(Error::DefaultValuesBatch(records.len()));
        }

        let mut bindings = Vec::with_capacity(columns.len() * records.len());
        let mut sql = if columns.is_empty() {
            self.compile_insert_defaults(table)
        } else {
            let tuples: Vec<String> = records
                .iter()
                .map(|record| {
                    for column in &columns {
                        bindings.push(record.get(*column).cloned().unwrap_or(Value::Null));
                    }
                    format!("({})", placeholders(columns.len()))
                })
                .collect();
            format!(
                "INSERT INTO {table} ({}) VALUES {}",
                columns.iter().copied().collect::<Vec<_>>().join(", "),
                tuples.join(", ")
            )
        };

        if returning {
            sql.push_str(" RETURNING *");
        }
        let shape = if returning {
            FetchShape::Rows
        } else {
            FetchShape::Affected
        };
        Ok(Query::new(self.parameterize(sql), bindings, shape))
    }

    /// Compiles an INSERT that only uses column defaults.
    fn compile_insert_defaults(&self, table: &str) -> String {
        format!("INSERT INTO {table} DEFAULT VALUES")
    }

    /// Compiles an UPDATE of `values` on the matching rows.
    ///
    /// Returns `None` for an empty `values` map: there is nothing to run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingTable`] without a target table, or
    /// [`Error::UnsupportedOperator`].
    fn compile_update(&self, query: &QueryBuilder, values: &Row) -> Result<Option<Query>> {
        if values.is_empty() {
            return Ok(None);
        }
        let table = require_table(query)?;
        let mut bindings = Vec::with_capacity(values.len());
        let assignments: Vec<String> = values
            .iter()
            .map(|(column, value)| {
                bindings.push(value.clone());
                format!("{column} = ?")
            })
            .collect();

        let fragments = [
            Some(format!("UPDATE {table} SET {}", assignments.join(", "))),
            self.compile_wheres(query, &mut bindings)?,
        ];
        Ok(Some(Query::new(
            self.parameterize(join_fragments(fragments)),
            bindings,
            FetchShape::Affected,
        )))
    }

    /// Compiles a DELETE of the matching rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingTable`] without a target table, or
    /// [`Error::UnsupportedOperator`].
    fn compile_delete(&self, query: &QueryBuilder) -> Result<Query> {
        let table = require_table(query)?;
        let mut bindings = Vec::new();
        let fragments = [
            Some(format!("DELETE FROM {table}")),
            self.compile_wheres(query, &mut bindings)?,
        ];
        Ok(Query::new(
            self.parameterize(join_fragments(fragments)),
            bindings,
            FetchShape::Affected,
        ))
    }

    /// Compiles `SELECT [DISTINCT] columns`.
    fn compile_columns(&self, query: &QueryBuilder, bindings: &mut Vec<Value>) -> String {
        let select = if query.is_distinct() {
            "SELECT DISTINCT"
        } else {
            "SELECT"
        };
        if query.columns().is_empty() {
            return format!("{select} *");
        }
        let columns: Vec<String> = query
            .columns()
            .iter()
            .map(|column| match column {
                Column::Name(name) => name.clone(),
                Column::Aliased { expr, alias } => format!("{expr} AS {alias}"),
                Column::Raw {
                    sql,
                    bindings: raw_bindings,
                } => {
                    bindings.extend(raw_bindings.iter().cloned());
                    sql.clone()
                }
            })
            .collect();
        format!("{select} {}", columns.join(", "))
    }

    /// Compiles `FROM table`.
    fn compile_from(&self, query: &QueryBuilder) -> Option<String> {
        query.table_name().map(|table| format!("FROM {table}"))
    }

    /// Compiles the join clauses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperator`].
    fn compile_joins(&self, query: &QueryBuilder) -> Result<Option<String>> {
        if query.joins().is_empty() {
            return Ok(None);
        }
        let mut clauses = Vec::with_capacity(query.joins().len());
        for join in query.joins() {
            let mut clause = format!("{} {}", join.kind.as_sql(), join.table);
            if let Some(on) = &join.on {
                let operator = self.operator(&on.operator)?;
                clause.push_str(&format!(" ON {} {operator} {}", on.left, on.right));
            }
            clauses.push(clause);
        }
        Ok(Some(clauses.join(" ")))
    }

    /// Compiles `WHERE ...`, conditions joined with `AND`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperator`].
    fn compile_wheres(&self, query: &QueryBuilder, bindings: &mut Vec<Value>) -> Result<Option<String>> {
        if query.conditions().is_empty() {
            return Ok(None);
        }
        let mut clauses = Vec::with_capacity(query.conditions().len());
        for condition in query.conditions() {
            clauses.push(self.compile_condition(condition, bindings)?);
        }
        Ok(Some(format!("WHERE {}", clauses.join(" AND "))))
    }

    /// Compiles a single condition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperator`].
    fn compile_condition(&self, condition: &Condition, bindings: &mut Vec<Value>) -> Result<String> {
        Ok(match condition {
            Condition::Basic {
                column,
                operator,
                value,
            } => {
                let op = self.operator(operator)?;
                if value.is_null() && (operator == "is" || operator == "is not") {
                    format!("{column} {op} NULL")
                } else {
                    bindings.push(value.clone());
                    format!("{column} {op} ?")
                }
            }
            Condition::In {
                column,
                values,
                negated,
            } => {
                bindings.extend(values.iter().cloned());
                let not = if *negated { "NOT " } else { "" };
                format!("{column} {not}IN ({})", placeholders(values.len()))
            }
            Condition::Null { column, negated } => {
                let not = if *negated { "NOT " } else { "" };
                format!("{column} IS {not}NULL")
            }
        })
    }

    /// Compiles `ORDER BY ...`.
    fn compile_orders(&self, query: &QueryBuilder) -> Option<String> {
        if query.orders().is_empty() {
            return None;
        }
        let orders: Vec<String> = query
            .orders()
            .iter()
            .map(|order| match order.direction {
                Direction::Asc => format!("{} ASC", order.column),
                Direction::Desc => format!("{} DESC", order.column),
            })
            .collect();
        Some(format!("ORDER BY {}", orders.join(", ")))
    }

    /// Compiles `LIMIT ?` and `OFFSET ?`.
    fn compile_limit_offset(&self, query: &QueryBuilder, bindings: &mut Vec<Value>) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(limit) = query.limit() {
            bindings.push(count_value(limit));
            parts.push("LIMIT ?");
        }
        if let Some(offset) = query.offset() {
            bindings.push(count_value(offset));
            parts.push("OFFSET ?");
        }
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    /// Returns the SQL spelling of an allow-listed operator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperator`] if the dialect lacks it.
    fn operator(&self, operator: &str) -> Result<String> {
        if self.supports_operator(operator) {
            Ok(operator.to_uppercase())
        } else {
            Err(Error::UnsupportedOperator {
                operator: operator.to_string(),
                dialect: self.dialect(),
            })
        }
    }
}

/// Returns `?, ?, ...` with `count` placeholders.
#[must_use]
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn require_table(query: &QueryBuilder) -> Result<&str> {
    query.table_name().ok_or(Error::MissingTable)
}

fn count_value(n: u64) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn join_fragments<const N: usize>(fragments: [Option<String>; N]) -> String {
    fragments
        .into_iter()
        .flatten()
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    fn sqlite() -> &'static dyn Grammar {
        Dialect::Sqlite.grammar()
    }

    // ========================================================================
    // SELECT
    // ========================================================================

    #[test]
    fn test_select_like() {
        let query = QueryBuilder::new()
            .from("users")
            .where_("name", "LIKE", "%News")
            .unwrap();
        let compiled = sqlite().compile_select(&query).unwrap();

        assert_eq!(compiled.sql, "SELECT * FROM users WHERE name LIKE ?");
        assert_eq!(compiled.bindings, vec![Value::from("%News")]);
    }

    #[test]
    fn test_select_component_order() {
        let query = QueryBuilder::table("posts")
            .select(["posts.id"])
            .select_raw("COALESCE(title, ?) AS title", vec![Value::from("untitled")])
            .join("users", "users.id", "=", "posts.user_id")
            .unwrap()
            .where_("users.age", ">=", 21)
            .unwrap()
            .order_by_desc("posts.id")
            .take(10)
            .skip(20);
        let compiled = sqlite().compile_select(&query).unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT posts.id, COALESCE(title, ?) AS title FROM posts \
             INNER JOIN users ON users.id = posts.user_id \
             WHERE users.age >= ? ORDER BY posts.id DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            compiled.bindings,
            vec![
                Value::from("untitled"),
                Value::Int(21),
                Value::Int(10),
                Value::Int(20)
            ]
        );
        assert_eq!(compiled.placeholder_count(), compiled.bindings.len());
    }

    #[test]
    fn test_select_distinct_alias_and_cross_join() {
        let query = QueryBuilder::table("a")
            .distinct()
            .select_as("a.id", "a_id")
            .cross_join("b");
        let compiled = sqlite().compile_select(&query).unwrap();

        assert_eq!(compiled.sql, "SELECT DISTINCT a.id AS a_id FROM a CROSS JOIN b");
    }

    #[test]
    fn test_where_in_and_nulls() {
        let query = QueryBuilder::table("users")
            .where_in("id", [1, 2, 3])
            .where_not_in("role", ["banned"])
            .where_null("deleted_at")
            .where_not_null("email")
            .where_("manager_id", "is", Value::Null)
            .unwrap();
        let compiled = sqlite().compile_select(&query).unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT * FROM users WHERE id IN (?, ?, ?) AND role NOT IN (?) \
             AND deleted_at IS NULL AND email IS NOT NULL AND manager_id IS NULL"
        );
        assert_eq!(compiled.bindings.len(), 4);
    }

    #[test]
    fn test_where_in_empty_list() {
        let query = QueryBuilder::table("users").where_in("id", Vec::<i64>::new());
        let compiled = sqlite().compile_select(&query).unwrap();

        assert_eq!(compiled.sql, "SELECT * FROM users WHERE id IN ()");
        assert!(compiled.bindings.is_empty());
    }

    // ========================================================================
    // INSERT
    // ========================================================================

    #[test]
    fn test_insert_unions_columns_in_first_seen_order() {
        let records = vec![
            row! { "name" => "a", "age" => 1 },
            row! { "email" => "b@x.io", "name" => "b" },
        ];
        let compiled = sqlite()
            .compile_insert(&QueryBuilder::table("users"), &records, false)
            .unwrap();

        assert_eq!(
            compiled.sql,
            "INSERT INTO users (name, age, email) VALUES (?, ?, ?), (?, ?, ?)"
        );
        assert_eq!(
            compiled.bindings,
            vec![
                Value::from("a"),
                Value::Int(1),
                Value::Null,
                Value::from("b"),
                Value::Null,
                Value::from("b@x.io"),
            ]
        );
        assert_eq!(compiled.shape, FetchShape::Affected);
    }

    #[test]
    fn test_insert_returning_and_defaults() {
        let compiled = sqlite()
            .compile_insert(&QueryBuilder::table("users"), &[Row::new()], true)
            .unwrap();

        assert_eq!(compiled.sql, "INSERT INTO users DEFAULT VALUES RETURNING *");
        assert!(compiled.bindings.is_empty());
        assert_eq!(compiled.shape, FetchShape::Rows);
    }

    #[test]
    fn test_insert_rejects_several_rows_of_defaults() {
        let result = sqlite().compile_insert(&QueryBuilder::table("users"), &[Row::new(), Row::new()], false);
        assert!(matches!(result, Err(Error::DefaultValuesBatch(2))));
    }

    #[test]
    fn test_insert_requires_table() {
        let result = sqlite().compile_insert(&QueryBuilder::new(), &[row! { "a" => 1 }], false);
        assert!(matches!(result, Err(Error::MissingTable)));
    }

    // ========================================================================
    // UPDATE / DELETE
    // ========================================================================

    #[test]
    fn test_update_binds_set_list_then_where() {
        let query = QueryBuilder::table("users").where_eq("id", 7);
        let compiled = sqlite()
            .compile_update(&query, &row! { "name" => "x", "age" => 3 })
            .unwrap()
            .unwrap();

        assert_eq!(compiled.sql, "UPDATE users SET name = ?, age = ? WHERE id = ?");
        assert_eq!(
            compiled.bindings,
            vec![Value::from("x"), Value::Int(3), Value::Int(7)]
        );
    }

    #[test]
    fn test_update_empty_is_noop() {
        let query = QueryBuilder::table("users");
        assert!(sqlite().compile_update(&query, &Row::new()).unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let query = QueryBuilder::table("users").where_("age", "<", 18).unwrap();
        let compiled = sqlite().compile_delete(&query).unwrap();

        assert_eq!(compiled.sql, "DELETE FROM users WHERE age < ?");
        assert_eq!(compiled.bindings, vec![Value::Int(18)]);
    }
}
