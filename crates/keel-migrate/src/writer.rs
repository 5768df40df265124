//! Generates SQL migration files.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use heck::ToSnakeCase;
use keel_core::Dialect;
use tracing::info;

use crate::blueprint::{Blueprint, ChangeKind};
use crate::error::{MigrateError, Result};
use crate::grammar;

/// Paths of a generated migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMigration {
    /// Migration name (file stem without the direction suffix).
    pub name: String,
    /// The `.up.sql` file.
    pub up: PathBuf,
    /// The `.down.sql` file.
    pub down: PathBuf,
}

/// Name and scripts of a migration before they are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMigration {
    /// Migration name.
    pub name: String,
    /// `up` script.
    pub up: String,
    /// `down` script.
    pub down: String,
}

/// Writes `<timestamp>_<name>.up.sql` / `.down.sql` pairs into a directory.
#[derive(Debug, Clone)]
pub struct MigrationWriter {
    dir: PathBuf,
    dialect: Dialect,
}

impl MigrationWriter {
    /// Creates a writer targeting `dir`, rendering DDL for `dialect`.
    pub fn new(dir: impl Into<PathBuf>, dialect: Dialect) -> Self {
        Self {
            dir: dir.into(),
            dialect,
        }
    }

    /// Returns the target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Generates a migration stamped with the current time.
    ///
    /// With `model`, the files create and drop the model's table
    /// (snake-cased, pluralized) with an `id` key and timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MigrationExists`] if a file would be
    /// overwritten, or an IO error.
    pub fn generate(&self, name: &str, model: Option<&str>) -> Result<GeneratedMigration> {
        self.generate_at(name, model, Utc::now())
    }

    /// Generates a migration stamped with `now`.
    ///
    /// # Errors
    ///
    /// See [`MigrationWriter::generate`].
    pub fn generate_at(&self, name: &str, model: Option<&str>, now: DateTime<Utc>) -> Result<GeneratedMigration> {
        let rendered = self.render(name, model, now)?;
        let up = self.dir.join(format!("{}.up.sql", rendered.name));
        let down = self.dir.join(format!("{}.down.sql", rendered.name));
        for path in [&up, &down] {
            if path.exists() {
                return Err(MigrateError::MigrationExists(path.clone()));
            }
        }

        fs::create_dir_all(&self.dir)?;
        fs::write(&up, rendered.up)?;
        fs::write(&down, rendered.down)?;
        info!(name = %rendered.name, dir = %self.dir.display(), "Generated migration");

        Ok(GeneratedMigration {
            name: rendered.name,
            up,
            down,
        })
    }

    /// Renders the name and scripts of a migration without touching disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the model table cannot be compiled.
    pub fn render(&self, name: &str, model: Option<&str>, now: DateTime<Utc>) -> Result<RenderedMigration> {
        let name = format!("{}_{}", now.format("%Y_%m_%d_%H%M%S"), name.to_snake_case());
        let (up, down) = match model {
            Some(model) => self.model_scripts(model)?,
            None => (format!("-- {name}: up\n"), format!("-- {name}: down\n")),
        };
        Ok(RenderedMigration { name, up, down })
    }

    fn model_scripts(&self, model: &str) -> Result<(String, String)> {
        let table = pluralizer::pluralize(&model.to_snake_case(), 2, false);
        let grammar = grammar::for_dialect(self.dialect);

        let create = Blueprint::build(&table, ChangeKind::Create, |t| {
            t.increments("id");
            t.timestamps();
        });
        let drop = Blueprint::new(&table, ChangeKind::Drop);

        Ok((script(&create.to_sql(grammar)?), script(&drop.to_sql(grammar)?)))
    }
}

fn script(statements: &[String]) -> String {
    statements.iter().map(|sql| format!("{sql};\n")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 5, 6, 7).unwrap()
    }

    #[test]
    fn test_generate_blank_migration() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MigrationWriter::new(dir.path(), Dialect::Sqlite);

        let generated = writer.generate_at("AddEmailToUsers", None, at()).unwrap();
        assert_eq!(generated.name, "2024_03_04_050607_add_email_to_users");
        assert!(generated.up.ends_with("2024_03_04_050607_add_email_to_users.up.sql"));
        assert!(generated.down.exists());
    }

    #[test]
    fn test_generate_for_model() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MigrationWriter::new(dir.path(), Dialect::Sqlite);

        let generated = writer.generate_at("create_blog_posts", Some("BlogPost"), at()).unwrap();
        let up = fs::read_to_string(&generated.up).unwrap();
        let down = fs::read_to_string(&generated.down).unwrap();
        assert_eq!(
            up,
            "CREATE TABLE \"blog_posts\" (\"id\" INTEGER PRIMARY KEY, \"created_at\" DATETIME, \"updated_at\" DATETIME);\n"
        );
        assert_eq!(down, "DROP TABLE \"blog_posts\";\n");
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MigrationWriter::new(dir.path(), Dialect::Sqlite);
        writer.generate_at("create_users", None, at()).unwrap();

        let err = writer.generate_at("create_users", None, at()).unwrap_err();
        assert!(matches!(err, MigrateError::MigrationExists(_)));
    }
}
