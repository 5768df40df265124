//! Fluent query description.

use tracing::trace;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::value::{Row, Value};

use super::operator::normalize_operator;

/// An entry of the select list.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// A plain column or `table.column` reference.
    Name(String),
    /// `expr AS alias`.
    Aliased {
        /// Column expression.
        expr: String,
        /// Output name.
        alias: String,
    },
    /// A raw SQL expression with its own bindings.
    Raw {
        /// SQL fragment, may contain `?` placeholders.
        sql: String,
        /// Bindings for the fragment's placeholders.
        bindings: Vec<Value>,
    },
}

/// A `WHERE` condition. Conditions are joined with `AND`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column operator ?`.
    Basic {
        /// Column reference.
        column: String,
        /// Lower-cased, allow-listed operator.
        operator: String,
        /// Right-hand value.
        value: Value,
    },
    /// `column [NOT] IN (?, ...)`.
    In {
        /// Column reference.
        column: String,
        /// Candidate values.
        values: Vec<Value>,
        /// `NOT IN` when set.
        negated: bool,
    },
    /// `column IS [NOT] NULL`.
    Null {
        /// Column reference.
        column: String,
        /// `IS NOT NULL` when set.
        negated: bool,
    },
}

/// Join flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`.
    Inner,
    /// `LEFT JOIN`.
    Left,
    /// `RIGHT JOIN`.
    Right,
    /// `CROSS JOIN`.
    Cross,
}

impl JoinKind {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Cross => "CROSS JOIN",
        }
    }
}

/// The `ON` clause of a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOn {
    /// Left column reference.
    pub left: String,
    /// Lower-cased, allow-listed operator.
    pub operator: String,
    /// Right column reference.
    pub right: String,
}

/// A joined table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    /// Join flavour.
    pub kind: JoinKind,
    /// Joined table.
    pub table: String,
    /// Join condition; absent for cross joins.
    pub on: Option<JoinOn>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// An `ORDER BY` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Column reference.
    pub column: String,
    /// Sort direction.
    pub direction: Direction,
}

/// Accumulates a statement description.
///
/// Builder methods only record state; they know nothing about SQL. Terminal
/// methods hand the builder to the connection's [`Grammar`](super::Grammar)
/// and execute the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    table: Option<String>,
    columns: Vec<Column>,
    conditions: Vec<Condition>,
    joins: Vec<Join>,
    orders: Vec<Order>,
    distinct: bool,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl QueryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder targeting `table`.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self::new().from(table)
    }

    /// Sets the target table.
    #[must_use]
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Appends plain columns to the select list.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns
            .extend(columns.into_iter().map(|c| Column::Name(c.into())));
        self
    }

    /// Appends `expr AS alias` to the select list.
    #[must_use]
    pub fn select_as(mut self, expr: impl Into<String>, alias: impl Into<String>) -> Self {
        self.columns.push(Column::Aliased {
            expr: expr.into(),
            alias: alias.into(),
        });
        self
    }

    /// Appends a raw expression with its own bindings to the select list.
    #[must_use]
    pub fn select_raw(mut self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.columns.push(Column::Raw {
            sql: sql.into(),
            bindings,
        });
        self
    }

    /// Adds `column operator value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperator`] if `operator` is not allow-listed.
    pub fn where_(
        mut self,
        column: impl Into<String>,
        operator: &str,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let operator = normalize_operator(operator)?;
        self.conditions.push(Condition::Basic {
            column: column.into(),
            operator,
            value: value.into(),
        });
        Ok(self)
    }

    /// Adds `column = value`.
    #[must_use]
    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Basic {
            column: column.into(),
            operator: String::from("="),
            value: value.into(),
        });
        self
    }

    /// Adds `column IN (values)`.
    #[must_use]
    pub fn where_in<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        });
        self
    }

    /// Adds `column NOT IN (values)`.
    #[must_use]
    pub fn where_not_in<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        });
        self
    }

    /// Adds `column IS NULL`.
    #[must_use]
    pub fn where_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition::Null {
            column: column.into(),
            negated: false,
        });
        self
    }

    /// Adds `column IS NOT NULL`.
    #[must_use]
    pub fn where_not_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition::Null {
            column: column.into(),
            negated: true,
        });
        self
    }

    fn push_join(
        mut self,
        kind: JoinKind,
        table: impl Into<String>,
        left: impl Into<String>,
        operator: &str,
        right: impl Into<String>,
    ) -> Result<Self> {
        let operator = normalize_operator(operator)?;
        self.joins.push(Join {
            kind,
            table: table.into(),
            on: Some(JoinOn {
                left: left.into(),
                operator,
                right: right.into(),
            }),
        });
        Ok(self)
    }

    /// Adds an inner join.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperator`] if `operator` is not allow-listed.
    pub fn join(
        self,
        table: impl Into<String>,
        left: impl Into<String>,
        operator: &str,
        right: impl Into<String>,
    ) -> Result<Self> {
        self.push_join(JoinKind::Inner, table, left, operator, right)
    }

    /// Adds a left join.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperator`] if `operator` is not allow-listed.
    pub fn left_join(
        self,
        table: impl Into<String>,
        left: impl Into<String>,
        operator: &str,
        right: impl Into<String>,
    ) -> Result<Self> {
        self.push_join(JoinKind::Left, table, left, operator, right)
    }

    /// Adds a right join.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperator`] if `operator` is not allow-listed.
    pub fn right_join(
        self,
        table: impl Into<String>,
        left: impl Into<String>,
        operator: &str,
        right: impl Into<String>,
    ) -> Result<Self> {
        self.push_join(JoinKind::Right, table, left, operator, right)
    }

    /// Adds a cross join.
    #[must_use]
    pub fn cross_join(mut self, table: impl Into<String>) -> Self {
        self.joins.push(Join {
            kind: JoinKind::Cross,
            table: table.into(),
            on: None,
        });
        self
    }

    /// Adds an ascending sort.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.orders.push(Order {
            column: column.into(),
            direction: Direction::Asc,
        });
        self
    }

    /// Adds a descending sort.
    #[must_use]
    pub fn order_by_desc(mut self, column: impl Into<String>) -> Self {
        self.orders.push(Order {
            column: column.into(),
            direction: Direction::Desc,
        });
        self
    }

    /// Selects distinct rows.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Skips the first `offset` rows.
    #[must_use]
    pub const fn skip(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns at most `limit` rows.
    #[must_use]
    pub const fn take(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    // ---------------------------------------------------------------------
    // Accessors used by grammars
    // ---------------------------------------------------------------------

    /// Returns the target table.
    #[must_use]
    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Returns the select list.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the conditions.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns the joins.
    #[must_use]
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Returns the sort order.
    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Returns whether `DISTINCT` was requested.
    #[must_use]
    pub const fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Returns the limit.
    #[must_use]
    pub const fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Returns the offset.
    #[must_use]
    pub const fn offset(&self) -> Option<u64> {
        self.offset
    }

    // ---------------------------------------------------------------------
    // Terminal methods
    // ---------------------------------------------------------------------

    /// Runs the query and returns every row.
    ///
    /// # Errors
    ///
    /// Returns compilation or driver errors.
    pub fn get(&self, conn: &dyn Connection) -> Result<Vec<Row>> {
        let query = conn.grammar().compile_select(self)?;
        conn.select(&query.sql, &query.bindings)
    }

    /// Runs the query and returns the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns compilation or driver errors.
    pub fn first(&self, conn: &dyn Connection) -> Result<Option<Row>> {
        let query = conn.grammar().compile_select(self)?;
        conn.select_single(&query.sql, &query.bindings)
    }

    /// Runs the query and returns the first row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordNotFound`] if there is none.
    pub fn first_or_fail(&self, conn: &dyn Connection) -> Result<Row> {
        self.first(conn)?.ok_or_else(|| {
            Error::RecordNotFound(self.table.clone().unwrap_or_default())
        })
    }

    /// Runs the query and returns the first row, or the result of `fallback`.
    ///
    /// # Errors
    ///
    /// Returns compilation or driver errors.
    pub fn first_or<F>(&self, conn: &dyn Connection, fallback: F) -> Result<Row>
    where
        F: FnOnce() -> Row,
    {
        Ok(self.first(conn)?.unwrap_or_else(fallback))
    }

    /// Returns `column` of the first row.
    ///
    /// # Errors
    ///
    /// Returns compilation or driver errors.
    pub fn value(&self, conn: &dyn Connection, column: &str) -> Result<Option<Value>> {
        let mut query = self.clone();
        query.columns = vec![Column::Name(column.to_string())];
        let key = output_name(column);
        Ok(query.first(conn)?.and_then(|mut row| row.shift_remove(key)))
    }

    /// Returns `column` of every row.
    ///
    /// # Errors
    ///
    /// Returns compilation or driver errors.
    pub fn pluck(&self, conn: &dyn Connection, column: &str) -> Result<Vec<Value>> {
        let mut query = self.clone();
        query.columns = vec![Column::Name(column.to_string())];
        let key = output_name(column);
        Ok(query
            .get(conn)?
            .into_iter()
            .map(|mut row| row.shift_remove(key).unwrap_or_default())
            .collect())
    }

    /// Counts matching rows.
    ///
    /// # Errors
    ///
    /// Returns compilation or driver errors.
    pub fn count(&self, conn: &dyn Connection) -> Result<i64> {
        let mut query = self.clone();
        query.columns = vec![Column::Raw {
            sql: String::from("COUNT(*) AS aggregate"),
            bindings: Vec::new(),
        }];
        query.orders.clear();
        Ok(query
            .first(conn)?
            .and_then(|row| row.get("aggregate").and_then(Value::as_i64))
            .unwrap_or(0))
    }

    /// Returns whether any row matches.
    ///
    /// # Errors
    ///
    /// Returns compilation or driver errors.
    pub fn exists(&self, conn: &dyn Connection) -> Result<bool> {
        Ok(self.count(conn)? > 0)
    }

    /// Inserts `records` and returns the affected-row count.
    ///
    /// Inserting zero records issues no SQL. Several records with no
    /// columns run one `DEFAULT VALUES` insert each.
    ///
    /// # Errors
    ///
    /// Returns compilation or driver errors.
    pub fn insert(&self, conn: &dyn Connection, records: &[Row]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        if is_defaults_batch(records) {
            return records.chunks(1).map(|record| self.insert(conn, record)).sum();
        }
        let query = conn.grammar().compile_insert(self, records, false)?;
        conn.affecting_statement(&query.sql, &query.bindings)
    }

    /// Inserts `records` and returns the stored rows (`RETURNING *`).
    ///
    /// # Errors
    ///
    /// Returns compilation or driver errors.
    pub fn insert_returning(&self, conn: &dyn Connection, records: &[Row]) -> Result<Vec<Row>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        if is_defaults_batch(records) {
            let mut stored = Vec::with_capacity(records.len());
            for record in records.chunks(1) {
                stored.extend(self.insert_returning(conn, record)?);
            }
            return Ok(stored);
        }
        let query = conn.grammar().compile_insert(self, records, true)?;
        conn.select(&query.sql, &query.bindings)
    }

    /// Updates matching rows and returns the affected-row count.
    ///
    /// An empty `values` map is a no-op that issues no SQL.
    ///
    /// # Errors
    ///
    /// Returns compilation or driver errors.
    pub fn update(&self, conn: &dyn Connection, values: &Row) -> Result<u64> {
        match conn.grammar().compile_update(self, values)? {
            Some(query) => conn.affecting_statement(&query.sql, &query.bindings),
            None => {
                trace!(table = ?self.table, "Empty update, nothing to do");
                Ok(0)
            }
        }
    }

    /// Deletes matching rows and returns the affected-row count.
    ///
    /// # Errors
    ///
    /// Returns compilation or driver errors.
    pub fn delete(&self, conn: &dyn Connection) -> Result<u64> {
        let query = conn.grammar().compile_delete(self)?;
        conn.affecting_statement(&query.sql, &query.bindings)
    }
}

/// Returns whether `records` are several rows with no columns, which no
/// dialect inserts in one statement.
fn is_defaults_batch(records: &[Row]) -> bool {
    records.len() > 1 && records.iter().all(Row::is_empty)
}

/// Returns the name a column reference takes in result rows.
fn output_name(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;
    use crate::testing::FakeConnection;

    #[test]
    fn test_builder_records_state() {
        let query = QueryBuilder::table("users")
            .select(["id", "name"])
            .where_("age", ">", 18)
            .unwrap()
            .where_in("role", ["admin", "staff"])
            .order_by("name")
            .skip(10)
            .take(5)
            .distinct();

        assert_eq!(query.table_name(), Some("users"));
        assert_eq!(query.columns().len(), 2);
        assert_eq!(query.conditions().len(), 2);
        assert_eq!(query.limit(), Some(5));
        assert_eq!(query.offset(), Some(10));
        assert!(query.is_distinct());
    }

    #[test]
    fn test_operator_is_lowercased() {
        let query = QueryBuilder::table("users").where_("name", "LIKE", "%a").unwrap();
        assert!(matches!(
            &query.conditions()[0],
            Condition::Basic { operator, .. } if operator == "like"
        ));
    }

    #[test]
    fn test_invalid_operator_is_rejected() {
        let result = QueryBuilder::table("users").where_("name", "===", "x");
        assert!(matches!(result, Err(Error::InvalidOperator(op)) if op == "==="));

        let result = QueryBuilder::table("users").join("posts", "users.id", "=>", "posts.user_id");
        assert!(result.is_err());
    }

    #[test]
    fn test_first_uses_select_single_without_limit() {
        let conn = FakeConnection::with_rows(vec![row! { "id" => 1, "name" => "Breaking News" }]);
        let row = QueryBuilder::table("users")
            .where_("name", "LIKE", "%News")
            .unwrap()
            .first(&conn)
            .unwrap()
            .unwrap();

        assert_eq!(row["id"], Value::Int(1));
        let log = conn.calls();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, "SELECT * FROM users WHERE name LIKE ?");
        assert_eq!(log[0].1, vec![Value::from("%News")]);
    }

    #[test]
    fn test_insert_of_empty_records_runs_one_statement_each() {
        let conn = FakeConnection::with_rows(Vec::new());
        let inserted = QueryBuilder::table("users")
            .insert(&conn, &[Row::new(), Row::new(), Row::new()])
            .unwrap();

        assert_eq!(inserted, 3);
        let calls = conn.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(sql, _)| sql == "INSERT INTO users DEFAULT VALUES"));
    }

    #[test]
    fn test_first_or_fail_and_first_or() {
        let conn = FakeConnection::with_rows(Vec::new());
        let query = QueryBuilder::table("users");

        assert!(matches!(
            query.first_or_fail(&conn),
            Err(Error::RecordNotFound(table)) if table == "users"
        ));
        let fallback = query.first_or(&conn, || row! { "id" => 0 }).unwrap();
        assert_eq!(fallback["id"], Value::Int(0));
    }

    #[test]
    fn test_value_and_pluck_strip_table_prefix() {
        let conn = FakeConnection::with_rows(vec![row! { "name" => "a" }, row! { "name" => "b" }]);
        let query = QueryBuilder::table("users");

        assert_eq!(
            query.value(&conn, "users.name").unwrap(),
            Some(Value::from("a"))
        );
        assert_eq!(
            query.pluck(&conn, "name").unwrap(),
            vec![Value::from("a"), Value::from("b")]
        );
        assert_eq!(conn.calls()[0].0, "SELECT users.name FROM users");
    }

    #[test]
    fn test_count() {
        let conn = FakeConnection::with_rows(vec![row! { "aggregate" => 3 }]);
        let count = QueryBuilder::table("users").order_by("id").count(&conn).unwrap();

        assert_eq!(count, 3);
        assert_eq!(conn.calls()[0].0, "SELECT COUNT(*) AS aggregate FROM users");
    }

    #[test]
    fn test_empty_update_issues_no_sql() {
        let conn = FakeConnection::with_rows(Vec::new());
        let affected = QueryBuilder::table("users")
            .where_eq("id", 1)
            .update(&conn, &Row::new())
            .unwrap();

        assert_eq!(affected, 0);
        assert!(conn.calls().is_empty());
    }

    #[test]
    fn test_empty_insert_issues_no_sql() {
        let conn = FakeConnection::with_rows(Vec::new());
        assert_eq!(QueryBuilder::table("users").insert(&conn, &[]).unwrap(), 0);
        assert!(conn.calls().is_empty());
    }
}
