//! The schema catalog seam.
//!
//! Steps, verifications, and the runner only talk to the database through
//! [`Catalog`]. It is implemented by [`crate::MemoryCatalog`] for tests and by
//! [`crate::PgCatalog`] for a live Postgres connection.

use crate::{ColumnInfo, Ddl, Result, SchemaObject};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by catalog operations.
pub type CatalogFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A migration recorded in the applied-migrations ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: String,
    pub name: String,
    /// Fingerprint of the migration script when it was recorded
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

/// A live schema catalog: existence checks, DDL execution, the migration
/// lock, and the applied-migrations ledger.
pub trait Catalog: Send + Sync {
    /// Whether `object` currently exists. Read-only.
    fn exists<'a>(&'a self, object: &'a SchemaObject) -> CatalogFuture<'a, bool>;

    /// Type, nullability, and default of a column, `None` if it does not exist.
    fn describe_column<'a>(
        &'a self,
        table: &'a str,
        column: &'a str,
    ) -> CatalogFuture<'a, Option<ColumnInfo>>;

    /// Execute a single DDL statement.
    fn execute<'a>(&'a mut self, ddl: &'a Ddl) -> CatalogFuture<'a, ()>;

    /// Take the migration lock for this session. Fails with
    /// [`crate::CatalogError::LockHeld`] while another session holds it;
    /// a session that already holds it may take it again.
    fn lock(&mut self) -> CatalogFuture<'_, ()>;

    /// Release the migration lock.
    fn unlock(&mut self) -> CatalogFuture<'_, ()>;

    /// All ledger entries, ordered by version.
    fn applied_migrations(&mut self) -> CatalogFuture<'_, Vec<AppliedMigration>>;

    /// Record (or re-checksum) a migration in the ledger.
    fn record_migration<'a>(
        &'a mut self,
        version: &'a str,
        name: &'a str,
        checksum: &'a str,
    ) -> CatalogFuture<'a, ()>;

    /// Remove a migration from the ledger after it has been reverted.
    fn forget_migration<'a>(&'a mut self, version: &'a str) -> CatalogFuture<'a, ()>;
}
