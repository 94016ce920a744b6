//! Schema object definitions used by migration steps.

use std::fmt;
use tempo_sql::{DefaultExpr, Expr, Ident, Lit, PgType, quote_ident};

/// A column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Postgres type
    pub pg_type: PgType,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default value expression (if any)
    pub default: Option<DefaultExpr>,
    /// Whether this is the (single-column) primary key
    pub primary_key: bool,
}

impl ColumnDef {
    /// A nullable column without default.
    pub fn new(name: impl Into<String>, pg_type: PgType) -> Self {
        Self {
            name: name.into(),
            pg_type,
            nullable: true,
            default: None,
            primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default(mut self, default: DefaultExpr) -> Self {
        self.default = Some(default);
        self
    }

    pub fn default_value(self, value: impl Into<tempo_sql::Value>) -> Self {
        self.default(DefaultExpr::Value(value.into()))
    }

    pub fn default_now(self) -> Self {
        self.default(DefaultExpr::Now)
    }

    /// Column definition fragment as used in CREATE TABLE / ADD COLUMN.
    pub fn to_sql(&self) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.pg_type);
        if self.primary_key {
            def.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            def.push_str(&format!(" DEFAULT {}", default));
        }
        def
    }
}

/// Referential action for `ON DELETE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FkAction {
    Cascade,
    SetNull,
    Restrict,
}

impl fmt::Display for FkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FkAction::Cascade => write!(f, "CASCADE"),
            FkAction::SetNull => write!(f, "SET NULL"),
            FkAction::Restrict => write!(f, "RESTRICT"),
        }
    }
}

/// A foreign key reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    /// Column(s) in this table
    pub columns: Vec<String>,
    /// Referenced table
    pub references_table: String,
    /// Referenced column(s)
    pub references_columns: Vec<String>,
    /// ON DELETE action, if any
    pub on_delete: Option<FkAction>,
}

/// What a constraint enforces.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    PrimaryKey(Vec<String>),
    ForeignKey(ForeignKey),
    Check(Expr),
    Unique(Vec<String>),
}

/// A named table constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintDef {
    pub name: String,
    pub kind: ConstraintKind,
}

impl ConstraintDef {
    pub fn check(name: impl Into<String>, expr: Expr) -> Self {
        Self {
            name: name.into(),
            kind: ConstraintKind::Check(expr),
        }
    }

    pub fn unique(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind: ConstraintKind::Unique(columns.iter().map(|c| c.to_string()).collect()),
        }
    }

    /// Single-column foreign key `column -> table(id)`.
    pub fn foreign_key(
        name: impl Into<String>,
        column: &str,
        references_table: &str,
        on_delete: Option<FkAction>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ConstraintKind::ForeignKey(ForeignKey {
                columns: vec![column.to_string()],
                references_table: references_table.to_string(),
                references_columns: vec!["id".to_string()],
                on_delete,
            }),
        }
    }

    /// Columns of the owning table this constraint depends on.
    pub fn columns(&self) -> Vec<&str> {
        match &self.kind {
            ConstraintKind::PrimaryKey(cols) | ConstraintKind::Unique(cols) => {
                cols.iter().map(String::as_str).collect()
            }
            ConstraintKind::ForeignKey(fk) => fk.columns.iter().map(String::as_str).collect(),
            ConstraintKind::Check(expr) => expr.columns(),
        }
    }

    /// Constraint body without the `CONSTRAINT name` prefix.
    pub fn body_sql(&self) -> String {
        match &self.kind {
            ConstraintKind::PrimaryKey(cols) => format!("PRIMARY KEY ({})", quoted_list(cols)),
            ConstraintKind::Unique(cols) => format!("UNIQUE ({})", quoted_list(cols)),
            ConstraintKind::Check(expr) => format!("CHECK ({})", expr),
            ConstraintKind::ForeignKey(fk) => {
                let on_delete = fk
                    .on_delete
                    .map(|a| format!(" ON DELETE {}", a))
                    .unwrap_or_default();
                format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({}){}",
                    quoted_list(&fk.columns),
                    quote_ident(&fk.references_table),
                    quoted_list(&fk.references_columns),
                    on_delete
                )
            }
        }
    }

    pub fn to_sql(&self) -> String {
        format!("CONSTRAINT {} {}", quote_ident(&self.name), self.body_sql())
    }
}

/// A table definition for CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub constraints: Vec<ConstraintDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn constraint(mut self, constraint: ConstraintDef) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Shorthand for a `{table}_{column}_fkey` foreign key to `references_table(id)`.
    pub fn references(
        self,
        column: &str,
        references_table: &str,
        on_delete: Option<FkAction>,
    ) -> Self {
        let name = format!("{}_{}_fkey", self.name, column);
        self.constraint(ConstraintDef::foreign_key(
            name,
            column,
            references_table,
            on_delete,
        ))
    }

    /// Name Postgres gives the primary key constraint.
    pub fn pkey_name(&self) -> String {
        format!("{}_pkey", self.name)
    }

    /// Generate the CREATE TABLE statement.
    pub fn to_create_sql(&self, if_not_exists: bool) -> String {
        let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
        let mut sql = format!("CREATE TABLE {}{} (\n", guard, quote_ident(&self.name));

        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|col| format!("    {}", col.to_sql()))
            .collect();
        for constraint in &self.constraints {
            parts.push(format!("    {}", constraint.to_sql()));
        }

        sql.push_str(&parts.join(",\n"));
        sql.push_str("\n);");
        sql
    }
}

/// A (non-unique) index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDef {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

impl IndexDef {
    /// Index named by convention, see [`tempo_sql::index_name`].
    pub fn on(table: &str, columns: &[&str]) -> Self {
        Self {
            name: tempo_sql::index_name(table, columns),
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn to_create_sql(&self, if_not_exists: bool) -> String {
        let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
        format!(
            "CREATE INDEX {}{} ON {} ({});",
            guard,
            quote_ident(&self.name),
            quote_ident(&self.table),
            quoted_list(&self.columns)
        )
    }
}

/// A schema object whose existence can be checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemaObject {
    Table { table: String },
    Column { table: String, column: String },
    Constraint { table: String, name: String },
    Index { table: String, name: String },
}

impl SchemaObject {
    pub fn table(table: &str) -> Self {
        SchemaObject::Table {
            table: table.to_string(),
        }
    }

    pub fn column(table: &str, column: &str) -> Self {
        SchemaObject::Column {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn constraint(table: &str, name: &str) -> Self {
        SchemaObject::Constraint {
            table: table.to_string(),
            name: name.to_string(),
        }
    }

    pub fn index(table: &str, name: &str) -> Self {
        SchemaObject::Index {
            table: table.to_string(),
            name: name.to_string(),
        }
    }

    /// The table this object belongs to.
    pub fn table_name(&self) -> &str {
        match self {
            SchemaObject::Table { table }
            | SchemaObject::Column { table, .. }
            | SchemaObject::Constraint { table, .. }
            | SchemaObject::Index { table, .. } => table,
        }
    }

    /// Catalog query returning one row iff the object exists in the current schema.
    pub fn exists_query(&self) -> String {
        match self {
            SchemaObject::Table { table } => format!(
                "SELECT 1 FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = {}",
                Lit(table)
            ),
            SchemaObject::Column { table, column } => format!(
                "SELECT 1 FROM information_schema.columns WHERE table_schema = current_schema() AND table_name = {} AND column_name = {}",
                Lit(table),
                Lit(column)
            ),
            SchemaObject::Constraint { table, name } => format!(
                "SELECT 1 FROM information_schema.table_constraints WHERE table_schema = current_schema() AND table_name = {} AND constraint_name = {}",
                Lit(table),
                Lit(name)
            ),
            SchemaObject::Index { table, name } => format!(
                "SELECT 1 FROM pg_indexes WHERE schemaname = current_schema() AND tablename = {} AND indexname = {}",
                Lit(table),
                Lit(name)
            ),
        }
    }
}

impl fmt::Display for SchemaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaObject::Table { table } => write!(f, "table {}", table),
            SchemaObject::Column { table, column } => write!(f, "column {}.{}", table, column),
            SchemaObject::Constraint { table, name } => {
                write!(f, "constraint {} on {}", name, table)
            }
            SchemaObject::Index { table, name } => write!(f, "index {} on {}", name, table),
        }
    }
}

/// Column metadata as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// `information_schema.columns.data_type`
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("{}", Ident(n)))
        .collect::<Vec<_>>()
        .join(", ")
}
