//! keel-migrate CLI
//!
//! Command-line tool for managing SQL migrations against a SQLite database.

use std::path::PathBuf;

use clap::Parser;
use keel_core::{ConnectionConfig, ConnectionManager, DatabaseConfig};
use keel_migrate::cli::MigrateCommand;
use keel_sqlite::SqliteConnector;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

/// Database migrations for keel.
#[derive(Parser)]
#[command(name = "keel-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL.
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Migrations directory.
    #[arg(short, long, default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: MigrateCommand,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = DatabaseConfig::single("default", ConnectionConfig::new("sqlite", &cli.database));
    let connections = ConnectionManager::new(config).with_connector("sqlite", SqliteConnector);
    debug!(database = %cli.database, dir = %cli.migrations_dir.display(), "Resolved configuration");

    for line in cli.command.execute(&connections, &cli.migrations_dir)? {
        println!("{line}");
    }

    Ok(())
}
