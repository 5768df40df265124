//! Error types for the ORM.

use thiserror::Error;

use crate::validation::ValidationResult;

/// ORM-specific errors.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Error from the query or connection layer.
    #[error(transparent)]
    Core(#[from] keel_core::Error),

    /// No model registered under this name.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The model declares no relation with this name.
    #[error("model {model} has no relation named {relation}")]
    UnknownRelation {
        /// Owner model.
        model: String,
        /// Requested relation.
        relation: String,
    },

    /// A relation was read before it was loaded.
    #[error("relation {relation} of {model} is not loaded")]
    RelationNotLoaded {
        /// Owner model.
        model: String,
        /// Relation name.
        relation: String,
    },

    /// No relation on the related model points back at the owner.
    #[error("model {related} has no relation back to {model} for {relation}")]
    NoInverseRelation {
        /// Owner model.
        model: String,
        /// Relation on the owner.
        relation: String,
        /// Related model that was searched.
        related: String,
    },

    /// A to-one through relation matched zero or several rows.
    #[error("relation {relation} expected exactly one row for key {key}, found {count}")]
    UnresolvableCardinality {
        /// Relation name.
        relation: String,
        /// Owner key the rows were grouped by.
        key: String,
        /// Number of rows found.
        count: usize,
    },

    /// A relation shares its name with a field that is not persisted.
    #[error("relation {relation} of {model} is declared on a readonly, computed or ignored field")]
    InvalidRelationField {
        /// Owner model.
        model: String,
        /// Relation name.
        relation: String,
    },

    /// The relation kind cannot be used this way.
    #[error("relation {relation} does not support {operation}")]
    UnsupportedRelation {
        /// Relation name.
        relation: String,
        /// What was attempted.
        operation: &'static str,
    },

    /// The model failed validation.
    #[error("{model} is invalid: {result}")]
    Validation {
        /// Model name.
        model: String,
        /// Collected messages.
        result: ValidationResult,
    },

    /// A model was expected to exist in the database.
    #[error("{model} has no primary key value")]
    MissingPrimaryKey {
        /// Model name.
        model: String,
    },
}

/// Result type alias for ORM operations.
pub type Result<T> = std::result::Result<T, OrmError>;
