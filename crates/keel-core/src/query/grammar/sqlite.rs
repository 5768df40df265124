//! SQLite DML grammar.

use super::{count_value, Grammar};
use crate::query::builder::QueryBuilder;
use crate::query::operator::POSTGRES_OPERATORS;
use crate::query::Dialect;
use crate::value::Value;

/// SQLite grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteGrammar;

impl Grammar for SqliteGrammar {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn supports_operator(&self, operator: &str) -> bool {
        !POSTGRES_OPERATORS.contains(&operator)
    }

    /// SQLite only accepts OFFSET after a LIMIT; `-1` means unbounded.
    fn compile_limit_offset(&self, query: &QueryBuilder, bindings: &mut Vec<Value>) -> Option<String> {
        match (query.limit(), query.offset()) {
            (None, None) => None,
            (Some(limit), None) => {
                bindings.push(count_value(limit));
                Some(String::from("LIMIT ?"))
            }
            (None, Some(offset)) => {
                bindings.push(count_value(offset));
                Some(String::from("LIMIT -1 OFFSET ?"))
            }
            (Some(limit), Some(offset)) => {
                bindings.push(count_value(limit));
                bindings.push(count_value(offset));
                Some(String::from("LIMIT ? OFFSET ?"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_offset_without_limit() {
        let query = QueryBuilder::table("users").skip(5);
        let compiled = SqliteGrammar.compile_select(&query).unwrap();

        assert_eq!(compiled.sql, "SELECT * FROM users LIMIT -1 OFFSET ?");
        assert_eq!(compiled.bindings, vec![Value::Int(5)]);
    }

    #[test]
    fn test_rejects_postgres_operators() {
        let query = QueryBuilder::table("users").where_("name", "ILIKE", "a%").unwrap();
        let result = SqliteGrammar.compile_select(&query);

        assert!(matches!(
            result,
            Err(Error::UnsupportedOperator { operator, dialect: Dialect::Sqlite }) if operator == "ilike"
        ));
    }
}
