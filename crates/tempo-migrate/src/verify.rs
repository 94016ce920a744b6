//! Post-migration verification queries.
//!
//! A verification is a read-only catalog check with an expected outcome. A
//! mismatch is reported, never treated as a failure of the migration.

use crate::{Catalog, Result, SchemaObject};
use std::fmt;
use tempo_sql::Lit;

/// What a verification expects to find.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// The object exists.
    Exists(SchemaObject),
    /// The object does not exist.
    Absent(SchemaObject),
    /// The column exists with the given nullability.
    Nullable {
        table: String,
        column: String,
        nullable: bool,
    },
}

/// A described, read-only post-condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub description: String,
    pub expectation: Expectation,
}

impl Verification {
    pub fn exists(object: SchemaObject) -> Self {
        Self {
            description: format!("{} exists", object),
            expectation: Expectation::Exists(object),
        }
    }

    pub fn absent(object: SchemaObject) -> Self {
        Self {
            description: format!("{} is gone", object),
            expectation: Expectation::Absent(object),
        }
    }

    pub fn nullable(table: &str, column: &str, nullable: bool) -> Self {
        let state = if nullable { "nullable" } else { "NOT NULL" };
        Self {
            description: format!("column {}.{} is {}", table, column, state),
            expectation: Expectation::Nullable {
                table: table.to_string(),
                column: column.to_string(),
                nullable,
            },
        }
    }

    /// Override the generated description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Run the check against the catalog.
    pub async fn check<C: Catalog + ?Sized>(&self, catalog: &C) -> Result<VerificationResult> {
        let (passed, detail) = match &self.expectation {
            Expectation::Exists(object) => {
                let found = catalog.exists(object).await?;
                (found, if found { "found" } else { "missing" }.to_string())
            }
            Expectation::Absent(object) => {
                let found = catalog.exists(object).await?;
                (!found, if found { "still present" } else { "absent" }.to_string())
            }
            Expectation::Nullable {
                table,
                column,
                nullable,
            } => match catalog.describe_column(table, column).await? {
                Some(info) => (
                    info.nullable == *nullable,
                    format!(
                        "{} {}",
                        info.data_type,
                        if info.nullable { "nullable" } else { "NOT NULL" }
                    ),
                ),
                None => (false, "column missing".to_string()),
            },
        };
        Ok(VerificationResult {
            description: self.description.clone(),
            passed,
            detail,
        })
    }

    /// The catalog query behind this check, with its expected result.
    pub fn to_sql(&self) -> String {
        let (query, expect) = match &self.expectation {
            Expectation::Exists(object) => (object.exists_query(), "1 row".to_string()),
            Expectation::Absent(object) => (object.exists_query(), "0 rows".to_string()),
            Expectation::Nullable {
                table,
                column,
                nullable,
            } => (
                format!(
                    "SELECT is_nullable FROM information_schema.columns WHERE table_schema = current_schema() AND table_name = {} AND column_name = {}",
                    Lit(table),
                    Lit(column)
                ),
                format!("is_nullable = '{}'", if *nullable { "YES" } else { "NO" }),
            ),
        };
        format!(
            "-- verify: {}\n{};\n-- expect: {}",
            self.description, query, expect
        )
    }
}

/// Outcome of one verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub description: String,
    pub passed: bool,
    /// What was actually observed
    pub detail: String,
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "ok" } else { "MISMATCH" };
        write!(f, "[{}] {} ({})", mark, self.description, self.detail)
    }
}
