//! Error types for query building and connections.

use crate::query::Dialect;

/// Errors raised by the query builder, grammars and connections.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A comparison operator outside the allow-list.
    #[error("Invalid operator '{0}'")]
    InvalidOperator(String),

    /// An allow-listed operator the target dialect cannot express.
    #[error("Operator '{operator}' is not supported by the {dialect} grammar")]
    UnsupportedOperator {
        /// The lower-cased operator.
        operator: String,
        /// The grammar that rejected it.
        dialect: Dialect,
    },

    /// A statement that needs a table was compiled without one.
    #[error("Query has no target table")]
    MissingTable,

    /// Several records without columns compiled into one INSERT.
    #[error("Cannot insert {0} rows of defaults in one statement")]
    DefaultValuesBatch(usize),

    /// `first_or_fail` found nothing.
    #[error("No record found in '{0}'")]
    RecordNotFound(String),

    /// A connection name missing from the configuration.
    #[error("Connection '{0}' is not configured")]
    UnknownConnection(String),

    /// A configured driver nobody registered a connector for.
    #[error("No connector registered for driver '{0}'")]
    UnknownDriver(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failure establishing or using a connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error reported by the database driver.
    #[error("Database error: {0}")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps a driver error.
    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Driver(Box::new(err))
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
