//! Migration lifecycle events.

use std::fmt;

/// Which way a batch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Applying migrations.
    Up,
    /// Reverting migrations.
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "up",
            Self::Down => "down",
        })
    }
}

/// Emitted by the [`Migrator`](crate::Migrator) to its listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationEvent {
    /// A batch of `count` migrations is about to run.
    BatchStarted {
        /// Direction of the batch.
        direction: MigrationDirection,
        /// Number of migrations in the batch.
        count: usize,
    },
    /// A migration is about to run.
    MigrationStarted {
        /// Migration name.
        name: String,
        /// Direction.
        direction: MigrationDirection,
    },
    /// A migration finished.
    MigrationEnded {
        /// Migration name.
        name: String,
        /// Direction.
        direction: MigrationDirection,
    },
    /// A batch finished.
    BatchEnded {
        /// Direction of the batch.
        direction: MigrationDirection,
    },
    /// A migration ran in pretend mode.
    Pretended {
        /// Migration name.
        name: String,
        /// Statements it would have run.
        statements: Vec<String>,
    },
    /// There was nothing to run.
    NothingToMigrate,
}
