//! Table blueprints.
//!
//! A [`Blueprint`] describes one change to one table: the change kind, the
//! columns being created or added, and an ordered list of follow-up
//! [`Command`]s. It holds no SQL; a
//! [`SchemaGrammar`](crate::grammar::SchemaGrammar) compiles it.
//!
//! ```rust
//! use keel_migrate::blueprint::{Blueprint, ChangeKind, ForeignKeyAction};
//!
//! let mut table = Blueprint::new("posts", ChangeKind::Create);
//! table.increments("id");
//! table.string("title").unique();
//! table
//!     .integer("user_id")
//!     .references("users", "id")
//!     .on_delete(ForeignKeyAction::Cascade);
//! table.index(&["user_id", "title"], None);
//!
//! assert_eq!(table.columns().count(), 3);
//! assert_eq!(table.commands().len(), 1);
//! ```

use indexmap::IndexMap;
use keel_core::Value;

use crate::error::Result;
use crate::grammar::SchemaGrammar;

/// What a blueprint does to its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// `CREATE TABLE`.
    Create,
    /// `CREATE TABLE IF NOT EXISTS`.
    CreateIfNotExists,
    /// `ALTER TABLE`: added columns plus commands.
    Alter,
    /// `DROP TABLE`.
    Drop,
    /// `DROP TABLE IF EXISTS`.
    DropIfExists,
}

/// Integer storage widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerWidth {
    /// 1 byte.
    Tiny,
    /// 2 bytes.
    Small,
    /// 3 bytes.
    Medium,
    /// 4 bytes.
    Normal,
    /// 8 bytes.
    Big,
}

/// Logical column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Fixed-length text.
    Char(u32),
    /// Variable-length text with a maximum length.
    String(u32),
    /// Unbounded text.
    Text,
    /// Integer of the given width.
    Integer(IntegerWidth),
    /// Single-precision float.
    Float,
    /// Double-precision float.
    Double,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Date and time without zone.
    Timestamp,
    /// Date and time with zone.
    TimestampTz,
}

/// Referential actions for `ON UPDATE` / `ON DELETE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForeignKeyAction {
    /// Emit no clause; the database default applies.
    #[default]
    Ignore,
    /// `RESTRICT`.
    Restrict,
    /// `SET NULL`.
    SetNull,
    /// `SET DEFAULT`.
    SetDefault,
    /// `CASCADE`.
    Cascade,
}

impl ForeignKeyAction {
    /// Returns the SQL keyword, or `None` for [`ForeignKeyAction::Ignore`].
    #[must_use]
    pub const fn as_sql(self) -> Option<&'static str> {
        match self {
            Self::Ignore => None,
            Self::Restrict => Some("RESTRICT"),
            Self::SetNull => Some("SET NULL"),
            Self::SetDefault => Some("SET DEFAULT"),
            Self::Cascade => Some("CASCADE"),
        }
    }
}

/// SQLite conflict resolution for column constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// `ON CONFLICT ROLLBACK`.
    Rollback,
    /// `ON CONFLICT ABORT`.
    Abort,
    /// `ON CONFLICT FAIL`.
    Fail,
    /// `ON CONFLICT IGNORE`.
    Ignore,
    /// `ON CONFLICT REPLACE`.
    Replace,
}

impl ConflictResolution {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Rollback => "ROLLBACK",
            Self::Abort => "ABORT",
            Self::Fail => "FAIL",
            Self::Ignore => "IGNORE",
            Self::Replace => "REPLACE",
        }
    }
}

/// A column default.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A literal, rendered inline by the grammar.
    Value(Value),
    /// A raw SQL expression such as `CURRENT_TIMESTAMP`.
    Expression(String),
}

/// A foreign key attached to a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub key: String,
    /// `ON UPDATE` action.
    pub on_update: ForeignKeyAction,
    /// `ON DELETE` action.
    pub on_delete: ForeignKeyAction,
}

/// A column being created or added.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Logical type.
    pub kind: ColumnType,
    /// Accepts NULL.
    pub nullable: bool,
    /// Primary key.
    pub primary: bool,
    /// Unique.
    pub unique: bool,
    /// Auto-numbered.
    pub autoincrement: bool,
    /// SQLite conflict clause.
    pub on_conflict: Option<ConflictResolution>,
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Foreign key.
    pub foreign: Option<ForeignKey>,
}

impl ColumnDefinition {
    /// Creates a NOT NULL column without constraints.
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: false,
            primary: false,
            unique: false,
            autoincrement: false,
            on_conflict: None,
            default: None,
            foreign: None,
        }
    }

    /// Allows NULL.
    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    /// Makes the column the primary key.
    pub fn primary(&mut self) -> &mut Self {
        self.primary = true;
        self
    }

    /// Adds a unique constraint.
    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    /// Auto-numbers the column.
    pub fn autoincrement(&mut self) -> &mut Self {
        self.autoincrement = true;
        self
    }

    /// Sets the SQLite conflict clause.
    pub fn on_conflict(&mut self, resolution: ConflictResolution) -> &mut Self {
        self.on_conflict = Some(resolution);
        self
    }

    /// Sets a literal default.
    pub fn default(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    /// Sets a raw SQL default expression.
    pub fn default_raw(&mut self, expression: impl Into<String>) -> &mut Self {
        self.default = Some(DefaultValue::Expression(expression.into()));
        self
    }

    /// References `table(key)`.
    pub fn references(&mut self, table: impl Into<String>, key: impl Into<String>) -> &mut Self {
        self.foreign = Some(ForeignKey {
            table: table.into(),
            key: key.into(),
            on_update: ForeignKeyAction::Ignore,
            on_delete: ForeignKeyAction::Ignore,
        });
        self
    }

    /// Sets the `ON DELETE` action of the foreign key set by
    /// [`references`](Self::references).
    pub fn on_delete(&mut self, action: ForeignKeyAction) -> &mut Self {
        if let Some(foreign) = &mut self.foreign {
            foreign.on_delete = action;
        }
        self
    }

    /// Sets the `ON UPDATE` action of the foreign key set by
    /// [`references`](Self::references).
    pub fn on_update(&mut self, action: ForeignKeyAction) -> &mut Self {
        if let Some(foreign) = &mut self.foreign {
            foreign.on_update = action;
        }
        self
    }
}

/// Follow-up operations compiled after the table change itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Rename the table.
    Rename {
        /// New table name.
        to: String,
    },
    /// Rename a column.
    RenameColumn {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Drop a column.
    DropColumn {
        /// Column name.
        name: String,
    },
    /// Create an index.
    Index {
        /// Indexed columns.
        columns: Vec<String>,
        /// Index name.
        name: String,
        /// Unique index.
        unique: bool,
    },
    /// Drop an index.
    DropIndex {
        /// Index name.
        name: String,
    },
    /// Drop a named foreign key constraint.
    DropForeign {
        /// Constraint name.
        name: String,
    },
}

impl Command {
    /// Returns the command's name, used in error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Rename { .. } => "rename",
            Self::RenameColumn { .. } => "renameColumn",
            Self::DropColumn { .. } => "dropColumn",
            Self::Index { unique: false, .. } => "index",
            Self::Index { unique: true, .. } => "unique",
            Self::DropIndex { .. } => "dropIndex",
            Self::DropForeign { .. } => "dropForeign",
        }
    }
}

/// Describes a change to one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    table: String,
    kind: ChangeKind,
    columns: IndexMap<String, ColumnDefinition>,
    commands: Vec<Command>,
}

impl Blueprint {
    /// Creates an empty blueprint.
    pub fn new(table: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            table: table.into(),
            kind,
            columns: IndexMap::new(),
            commands: Vec::new(),
        }
    }

    /// Creates a blueprint, lets `define` fill it in, and returns it.
    pub fn build<F>(table: impl Into<String>, kind: ChangeKind, define: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut blueprint = Self::new(table, kind);
        define(&mut blueprint);
        blueprint
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the change kind.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Returns the columns in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.values()
    }

    /// Returns the commands in declaration order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Compiles the blueprint with `grammar`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::UnsupportedCommand`](crate::MigrateError::UnsupportedCommand)
    /// when a command cannot be expressed in the grammar's dialect.
    pub fn to_sql(&self, grammar: &dyn SchemaGrammar) -> Result<Vec<String>> {
        grammar.compile_blueprint(self)
    }

    // ------------------------------------------------------------------
    // Columns
    // ------------------------------------------------------------------

    /// Adds a column of any type. Redefining a name replaces the column.
    pub fn column(&mut self, name: impl Into<String>, kind: ColumnType) -> &mut ColumnDefinition {
        let name = name.into();
        self.columns
            .insert(name.clone(), ColumnDefinition::new(name.clone(), kind));
        &mut self.columns[&name]
    }

    /// Auto-numbered integer primary key.
    pub fn increments(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Integer(IntegerWidth::Normal))
            .primary()
            .autoincrement()
    }

    /// Auto-numbered big integer primary key.
    pub fn big_increments(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Integer(IntegerWidth::Big))
            .primary()
            .autoincrement()
    }

    /// Fixed-length text column.
    pub fn char(&mut self, name: impl Into<String>, length: u32) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Char(length))
    }

    /// Variable-length text column of up to 255 characters.
    pub fn string(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::String(255))
    }

    /// Variable-length text column of up to `length` characters.
    pub fn string_with_length(&mut self, name: impl Into<String>, length: u32) -> &mut ColumnDefinition {
        self.column(name, ColumnType::String(length))
    }

    /// Unbounded text column.
    pub fn text(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Text)
    }

    /// 1-byte integer column.
    pub fn tiny_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Integer(IntegerWidth::Tiny))
    }

    /// 2-byte integer column.
    pub fn small_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Integer(IntegerWidth::Small))
    }

    /// 3-byte integer column.
    pub fn medium_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Integer(IntegerWidth::Medium))
    }

    /// 4-byte integer column.
    pub fn integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Integer(IntegerWidth::Normal))
    }

    /// 8-byte integer column.
    pub fn big_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Integer(IntegerWidth::Big))
    }

    /// Single-precision float column.
    pub fn float(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Float)
    }

    /// Double-precision float column.
    pub fn double(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Double)
    }

    /// Boolean column.
    pub fn boolean(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Boolean)
    }

    /// Date column.
    pub fn date(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Date)
    }

    /// Timestamp column.
    pub fn timestamp(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::Timestamp)
    }

    /// Timestamp-with-zone column.
    pub fn timestamp_tz(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.column(name, ColumnType::TimestampTz)
    }

    /// Nullable `created_at` and `updated_at` timestamps.
    pub fn timestamps(&mut self) {
        self.timestamp("created_at").nullable();
        self.timestamp("updated_at").nullable();
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Renames the table.
    pub fn rename(&mut self, to: impl Into<String>) {
        self.commands.push(Command::Rename { to: to.into() });
    }

    /// Renames a column.
    pub fn rename_column(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.commands.push(Command::RenameColumn {
            from: from.into(),
            to: to.into(),
        });
    }

    /// Drops a column.
    pub fn drop_column(&mut self, name: impl Into<String>) {
        self.commands.push(Command::DropColumn { name: name.into() });
    }

    /// Creates an index, named `{table}_{columns}_index` unless `name` is set.
    pub fn index(&mut self, columns: &[&str], name: Option<&str>) {
        self.push_index(columns, name, false);
    }

    /// Creates a unique index, named `{table}_{columns}_unique` unless `name`
    /// is set.
    pub fn unique_index(&mut self, columns: &[&str], name: Option<&str>) {
        self.push_index(columns, name, true);
    }

    /// Drops an index.
    pub fn drop_index(&mut self, name: impl Into<String>) {
        self.commands.push(Command::DropIndex { name: name.into() });
    }

    /// Drops a named foreign key constraint.
    pub fn drop_foreign(&mut self, name: impl Into<String>) {
        self.commands.push(Command::DropForeign { name: name.into() });
    }

    fn push_index(&mut self, columns: &[&str], name: Option<&str>, unique: bool) {
        let name = name.map_or_else(
            || {
                let suffix = if unique { "unique" } else { "index" };
                format!("{}_{}_{suffix}", self.table, columns.join("_")).replace(['-', '.'], "_")
            },
            str::to_string,
        );
        self.commands.push(Command::Index {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            name,
            unique,
        });
    }
}
