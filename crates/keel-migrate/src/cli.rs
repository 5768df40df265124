//! Embeddable migration commands.
//!
//! [`MigrateCommand`] is a clap subcommand enum an application can mount in
//! its own CLI. The `keel-migrate` binary wraps it around a SQL migration
//! directory and a single SQLite database.

use std::cell::RefCell;
use std::path::Path;

use chrono::Utc;
use clap::Subcommand;
use keel_core::ConnectionManager;

use crate::error::Result;
use crate::events::{MigrationDirection, MigrationEvent};
use crate::migration::{MigrationSource, SqlDirectory};
use crate::migrator::Migrator;
use crate::writer::MigrationWriter;

/// Migration commands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum MigrateCommand {
    /// Apply pending migrations.
    #[command(name = "migrate")]
    Migrate {
        /// Print the SQL instead of executing it.
        #[arg(long)]
        pretend: bool,
    },

    /// Roll back the newest applied migrations.
    #[command(name = "migrate:rollback")]
    Rollback {
        /// Number of migrations to roll back.
        #[arg(long, default_value_t = 1)]
        step: usize,

        /// Print the SQL instead of executing it.
        #[arg(long)]
        pretend: bool,
    },

    /// Roll back every applied migration.
    #[command(name = "migrate:reset")]
    Reset {
        /// Print the SQL instead of executing it.
        #[arg(long)]
        pretend: bool,
    },

    /// Roll back every applied migration, then apply them all.
    #[command(name = "migrate:refresh")]
    Refresh {
        /// Print the SQL instead of executing it.
        #[arg(long)]
        pretend: bool,
    },

    /// Show which migrations have been applied.
    #[command(name = "migrate:status")]
    Status,

    /// Create a new migration file pair.
    #[command(name = "generate:migration")]
    Generate {
        /// Migration name, e.g. `create_users_table`.
        name: String,

        /// Create the table for this model.
        #[arg(long)]
        model: Option<String>,

        /// Print the files instead of writing them.
        #[arg(long)]
        pretend: bool,
    },
}

impl MigrateCommand {
    /// Runs the command against SQL migrations in `migrations_dir` and
    /// returns the lines to report.
    ///
    /// # Errors
    ///
    /// Returns any migration, connection or IO error.
    pub fn execute(self, connections: &ConnectionManager, migrations_dir: &Path) -> Result<Vec<String>> {
        let source = SqlDirectory::new(migrations_dir);
        self.execute_with(connections, &source, migrations_dir)
    }

    /// Runs the command with migrations from `source`. Generated files
    /// still go to `migrations_dir`.
    ///
    /// # Errors
    ///
    /// Returns any migration, connection or IO error.
    pub fn execute_with(
        self,
        connections: &ConnectionManager,
        source: &dyn MigrationSource,
        migrations_dir: &Path,
    ) -> Result<Vec<String>> {
        if let Self::Generate { name, model, pretend } = &self {
            let dialect = connections.default_connection()?.dialect();
            let writer = MigrationWriter::new(migrations_dir, dialect);
            if *pretend {
                let rendered = writer.render(name, model.as_deref(), Utc::now())?;
                return Ok(vec![
                    format!("{}.up.sql:", rendered.name),
                    rendered.up,
                    format!("{}.down.sql:", rendered.name),
                    rendered.down,
                ]);
            }
            let generated = writer.generate(name, model.as_deref())?;
            return Ok(vec![format!("Created migration: {}", generated.name)]);
        }

        let pretend = self.is_pretend();
        let output = RefCell::new(Vec::new());
        let migrator = Migrator::new(connections)
            .with_source(source)?
            .pretend(pretend)
            .listen(|event| report(event, pretend, &mut output.borrow_mut()));

        match self {
            Self::Migrate { .. } => {
                migrator.apply_pending_migrations()?;
            }
            Self::Rollback { step, .. } => {
                migrator.rollback(step)?;
            }
            Self::Reset { .. } => {
                migrator.reset()?;
            }
            Self::Refresh { .. } => {
                migrator.refresh()?;
            }
            Self::Status => {
                let status = migrator.status()?;
                let mut output = output.borrow_mut();
                if status.is_empty() {
                    output.push(String::from("No migrations found."));
                }
                for entry in status {
                    let mark = if entry.applied { "X" } else { " " };
                    output.push(format!("[{mark}] {}", entry.name));
                }
            }
            Self::Generate { .. } => {}
        }

        drop(migrator);
        Ok(output.into_inner())
    }

    const fn is_pretend(&self) -> bool {
        match self {
            Self::Migrate { pretend }
            | Self::Rollback { pretend, .. }
            | Self::Reset { pretend }
            | Self::Refresh { pretend }
            | Self::Generate { pretend, .. } => *pretend,
            Self::Status => false,
        }
    }
}

fn report(event: &MigrationEvent, pretend: bool, output: &mut Vec<String>) {
    match event {
        MigrationEvent::NothingToMigrate => output.push(String::from("Nothing to migrate.")),
        MigrationEvent::Pretended { name, statements } => {
            output.extend(statements.iter().map(|sql| format!("{name}: {sql}")));
        }
        MigrationEvent::MigrationEnded { name, direction } if !pretend => {
            output.push(match direction {
                MigrationDirection::Up => format!("Migrated: {name}"),
                MigrationDirection::Down => format!("Rolled back: {name}"),
            });
        }
        _ => {}
    }
}
