//! Comparison operator allow-list.

use crate::error::{Error, Result};

/// Operators accepted by [`QueryBuilder::where_`](super::QueryBuilder::where_).
pub const OPERATORS: &[&str] = &[
    "=",
    "<",
    ">",
    "<=",
    ">=",
    "<>",
    "!=",
    "like",
    "not like",
    "is",
    "is not",
    "&",
    "|",
    "<<",
    ">>",
    "ilike",
    "not ilike",
    "~",
    "~*",
    "!~",
    "!~*",
    "similar to",
    "not similar to",
];

/// The subset of [`OPERATORS`] only Postgres understands.
pub const POSTGRES_OPERATORS: &[&str] = &[
    "ilike",
    "not ilike",
    "~",
    "~*",
    "!~",
    "!~*",
    "similar to",
    "not similar to",
];

/// Lower-cases `operator`, collapses inner whitespace and checks it against
/// [`OPERATORS`].
///
/// # Errors
///
/// Returns [`Error::InvalidOperator`] for anything outside the allow-list.
pub fn normalize_operator(operator: &str) -> Result<String> {
    let normalized = operator
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if OPERATORS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(Error::InvalidOperator(operator.to_string()))
    }
}
