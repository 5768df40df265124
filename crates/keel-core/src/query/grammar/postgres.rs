//! PostgreSQL DML grammar.
//!
//! Postgres understands every allow-listed operator and accepts a bare
//! `OFFSET`. Parameters are numbered `$1..$n`.

use super::Grammar;
use crate::query::Dialect;

/// PostgreSQL grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresGrammar;

impl Grammar for PostgresGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn parameterize(&self, sql: String) -> String {
        number_placeholders(&sql)
    }
}

/// Replaces each `?` outside quoted text with `$n`, counting from 1.
fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote = None;
    let mut index = 0;
    for ch in sql.chars() {
        match (quote, ch) {
            (None, '\'' | '"') => quote = Some(ch),
            (Some(open), _) if open == ch => quote = None,
            (None, '?') => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
                continue;
            }
            _ => {}
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;
    use crate::row;
    use crate::value::Value;

    #[test]
    fn test_postgres_operators() {
        let query = QueryBuilder::table("users")
            .where_("name", "ilike", "a%")
            .unwrap()
            .where_("email", "~*", "@example")
            .unwrap();
        let compiled = PostgresGrammar.compile_select(&query).unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT * FROM users WHERE name ILIKE $1 AND email ~* $2"
        );
    }

    #[test]
    fn test_placeholders_are_numbered_in_binding_order() {
        let query = QueryBuilder::table("users")
            .select_raw("'?' AS mark", Vec::new())
            .where_("age", ">", 18)
            .unwrap()
            .where_in("role", ["admin", "staff"])
            .take(5);
        let compiled = PostgresGrammar.compile_select(&query).unwrap();

        assert_eq!(
            compiled.sql,
            "SELECT '?' AS mark FROM users WHERE age > $1 AND role IN ($2, $3) LIMIT $4"
        );
        assert_eq!(compiled.bindings.len(), 4);

        let update = PostgresGrammar
            .compile_update(&QueryBuilder::table("users").where_eq("id", 1), &row! { "name" => "a" })
            .unwrap()
            .unwrap();
        assert_eq!(update.sql, "UPDATE users SET name = $1 WHERE id = $2");
    }

    #[test]
    fn test_bare_offset() {
        let query = QueryBuilder::table("users").skip(5);
        let compiled = PostgresGrammar.compile_select(&query).unwrap();

        assert_eq!(compiled.sql, "SELECT * FROM users OFFSET $1");
        assert_eq!(compiled.bindings, vec![Value::Int(5)]);
    }

    #[test]
    fn test_insert_returning() {
        let compiled = PostgresGrammar
            .compile_insert(&QueryBuilder::table("users"), &[row! { "name" => "a" }], true)
            .unwrap();

        assert_eq!(compiled.sql, "INSERT INTO users (name) VALUES ($1) RETURNING *");
    }
}
