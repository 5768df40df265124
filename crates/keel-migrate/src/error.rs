//! Error types for schema building and migrations.

use std::path::PathBuf;

use keel_core::Dialect;

/// Errors that can occur while building schemas or running migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Error from the connection layer.
    #[error(transparent)]
    Core(#[from] keel_core::Error),

    /// A blueprint command the dialect cannot express.
    #[error("The {dialect} schema grammar does not support '{command}'")]
    UnsupportedCommand {
        /// Dialect that rejected the command.
        dialect: Dialect,
        /// Command name.
        command: &'static str,
    },

    /// A migration without a way back.
    #[error("Migration '{0}' is not reversible")]
    NotReversible(String),

    /// Two migrations share a name.
    #[error("Migration '{0}' is registered twice")]
    DuplicateMigration(String),

    /// No applied record for a migration being rolled back.
    #[error("Migration '{0}' is not recorded as applied")]
    MigrationNotFound(String),

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// No migrations directory found.
    #[error("Migrations directory not found: {0}")]
    MigrationsDirNotFound(PathBuf),
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
