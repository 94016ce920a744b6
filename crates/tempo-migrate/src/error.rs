use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("migration {version}: step {index} ({step}) failed: {source}")]
    Step {
        version: String,
        index: usize,
        step: String,
        #[source]
        source: Box<Error>,
    },

    #[error(
        "migration {version} is listed after {previous}; versions must be strictly increasing"
    )]
    OutOfOrder { previous: String, version: String },

    #[error("migration version {version} appears more than once")]
    DuplicateVersion { version: String },

    #[error("migration {version} has no revert steps")]
    Irreversible { version: String },

    #[error("no migration with version {version}")]
    UnknownVersion { version: String },
}

impl Error {
    /// The innermost error, looking through step context.
    pub fn root(&self) -> &Error {
        match self {
            Error::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// The catalog error at the root of this error, if any.
    pub fn catalog_error(&self) -> Option<&CatalogError> {
        match self.root() {
            Error::Catalog(e) => Some(e),
            _ => None,
        }
    }
}

/// Failures reported by a schema catalog when a statement cannot be applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("catalog is not connected")]
    Disconnected,

    #[error("migration lock is already held")]
    LockHeld,

    #[error("relation \"{table}\" does not exist")]
    TableNotFound { table: String },

    #[error("relation \"{table}\" already exists")]
    TableAlreadyExists { table: String },

    #[error("column \"{column}\" of relation \"{table}\" does not exist")]
    ColumnNotFound { table: String, column: String },

    #[error("column \"{column}\" of relation \"{table}\" already exists")]
    ColumnAlreadyExists { table: String, column: String },

    #[error("constraint \"{name}\" of relation \"{table}\" does not exist")]
    ConstraintNotFound { table: String, name: String },

    #[error("constraint \"{name}\" for relation \"{table}\" already exists")]
    ConstraintAlreadyExists { table: String, name: String },

    #[error("index \"{name}\" does not exist")]
    IndexNotFound { name: String },

    #[error("relation \"{name}\" already exists")]
    IndexAlreadyExists { name: String },

    #[error(
        "foreign key from \"{table}\" references non-existent relation \"{target}\""
    )]
    ForeignKeyTargetNotFound { table: String, target: String },

    #[error("cannot drop {object} because {dependent} depends on it")]
    DependentObjects { object: String, dependent: String },

    #[error(
        "value for column \"{column}\" of relation \"{table}\" does not fit type {pg_type}"
    )]
    TypeMismatch {
        table: String,
        column: String,
        pg_type: String,
    },

    #[error(
        "null value in column \"{column}\" of relation \"{table}\" violates not-null constraint"
    )]
    NotNullViolation { table: String, column: String },

    #[error(
        "row of relation \"{table}\" violates check constraint \"{constraint}\""
    )]
    CheckViolation { table: String, constraint: String },

    #[error(
        "duplicate key value violates unique constraint \"{constraint}\" on \"{table}\""
    )]
    UniqueViolation { table: String, constraint: String },

    #[error(
        "row of relation \"{table}\" violates foreign key constraint \"{constraint}\""
    )]
    ForeignKeyViolation { table: String, constraint: String },
}
