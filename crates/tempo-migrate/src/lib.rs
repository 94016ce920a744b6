//! Idempotent schema migrations for Postgres.
//!
//! This crate provides:
//! - Existence checks against a schema catalog ([`Catalog::exists`])
//! - Guarded DDL steps that are no-ops once their effect is present ([`Step`])
//! - An ordered migration sequencer with an applied-migrations ledger and an
//!   advisory lock ([`MigrationRunner`])
//! - Read-only post-migration checks ([`Verification`])
//! - Guarded down steps to revert migrations ([`MigrationRunner::revert`])
//!
//! # Migrations
//!
//! A migration is a version, a name, and a list of steps:
//!
//! ```
//! use tempo_migrate::{ColumnDef, Ddl, Migration, SchemaObject, Verification};
//! use tempo_sql::PgType;
//!
//! let migration = Migration::new("20250301000000", "add_gamification")
//!     .step(Ddl::add_column(
//!         "users",
//!         ColumnDef::new("gold_cups", PgType::Integer).default_value(0),
//!     ))
//!     .verify(Verification::exists(SchemaObject::column("users", "gold_cups")));
//! assert_eq!(migration.steps.len(), 1);
//! ```
//!
//! Run migrations with `MigrationRunner` against any catalog:
//!
//! ```ignore
//! let mut catalog = PgCatalog::new(client, "public").await?;
//! let report = MigrationRunner::new(&mut catalog).run(&migrations).await?;
//! ```
//!
//! Re-running a sequence is always safe: every step checks the catalog first
//! and skips itself when its effect is already present.

mod catalog;
mod error;
mod memory;
mod migration;
mod postgres;
mod runner;
mod schema;
mod step;
mod traced;
mod verify;

pub use catalog::{AppliedMigration, Catalog, CatalogFuture};
pub use error::{CatalogError, Error};
pub use memory::{MemoryCatalog, Row, SchemaState, TableState};
pub use migration::Migration;
pub use postgres::{LEDGER_TABLE, LOCK_KEY, PgCatalog};
pub use runner::{
    MigrationReport, MigrationRunner, MigrationStatus, RunOptions, RunReport, VerifyReport,
    render_down_script, render_script, validate_order,
};
pub use schema::{
    ColumnDef, ColumnInfo, ConstraintDef, ConstraintKind, FkAction, ForeignKey, IndexDef,
    SchemaObject, TableDef,
};
pub use step::{Ddl, Guard, Step, StepOutcome};
pub use traced::{Connection, TracedConn};
pub use verify::{Expectation, Verification, VerificationResult};

pub type Result<T> = std::result::Result<T, Error>;
