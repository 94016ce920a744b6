//! Postgres-backed catalog.

use crate::traced::{Connection, TracedConn};
use crate::{
    AppliedMigration, Catalog, CatalogError, CatalogFuture, ColumnInfo, Ddl, Result, SchemaObject,
};
use chrono::{DateTime, Utc};
use tempo_sql::quote_ident;
use tokio_postgres::types::ToSql;

/// Name of the applied-migrations ledger table.
pub const LEDGER_TABLE: &str = "__tempo_migrations";

/// Advisory lock key held while migrations run ("tempo" plus a counter).
pub const LOCK_KEY: i64 = 0x7465_6d70_6f00_0001;

/// A [`Catalog`] over a live Postgres connection.
///
/// All existence checks are scoped to `current_schema()`, which [`PgCatalog::new`] pins
/// through `search_path`.
pub struct PgCatalog<C: Connection> {
    conn: TracedConn<C>,
    schema: String,
    lock_key: i64,
}

impl<C: Connection> PgCatalog<C> {
    /// Wrap a connection and point its `search_path` at `schema`.
    pub async fn new(conn: C, schema: &str) -> Result<Self> {
        let conn = TracedConn::new(conn);
        let search_path = format!("SET search_path TO {}", quote_ident(schema));
        conn.batch_execute(&search_path).await?;
        Ok(Self {
            conn,
            schema: schema.to_string(),
            lock_key: LOCK_KEY,
        })
    }

    /// Use a different advisory lock key, for running isolated migrators
    /// against one database.
    pub fn with_lock_key(mut self, key: i64) -> Self {
        self.lock_key = key;
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn connection(&self) -> &C {
        self.conn.inner()
    }

    async fn exists(&self, object: &SchemaObject) -> Result<bool> {
        let row = match object {
            SchemaObject::Table { table } => {
                self.conn
                    .query_opt(
                        "SELECT 1 FROM information_schema.tables \
                         WHERE table_schema = current_schema() AND table_name = $1::text",
                        &[table],
                    )
                    .await?
            }
            SchemaObject::Column { table, column } => {
                self.conn
                    .query_opt(
                        "SELECT 1 FROM information_schema.columns \
                         WHERE table_schema = current_schema() AND table_name = $1::text \
                         AND column_name = $2::text",
                        &[table, column],
                    )
                    .await?
            }
            SchemaObject::Constraint { table, name } => {
                self.conn
                    .query_opt(
                        "SELECT 1 FROM information_schema.table_constraints \
                         WHERE table_schema = current_schema() AND table_name = $1::text \
                         AND constraint_name = $2::text",
                        &[table, name],
                    )
                    .await?
            }
            SchemaObject::Index { table, name } => {
                self.conn
                    .query_opt(
                        "SELECT 1 FROM pg_indexes \
                         WHERE schemaname = current_schema() AND tablename = $1::text \
                         AND indexname = $2::text",
                        &[table, name],
                    )
                    .await?
            }
        };
        Ok(row.is_some())
    }

    async fn ensure_ledger(&self) -> Result<()> {
        self.conn
            .batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                 version TEXT PRIMARY KEY,\n    \
                 name TEXT NOT NULL,\n    \
                 checksum TEXT NOT NULL,\n    \
                 applied_at TIMESTAMPTZ NOT NULL DEFAULT now()\n)",
                quote_ident(LEDGER_TABLE)
            ))
            .await?;
        Ok(())
    }
}

impl<C: Connection> Catalog for PgCatalog<C> {
    fn exists<'a>(&'a self, object: &'a SchemaObject) -> CatalogFuture<'a, bool> {
        Box::pin(self.exists(object))
    }

    fn describe_column<'a>(
        &'a self,
        table: &'a str,
        column: &'a str,
    ) -> CatalogFuture<'a, Option<ColumnInfo>> {
        Box::pin(async move {
            let params: [&(dyn ToSql + Sync); 2] = [&table, &column];
            let row = self
                .conn
                .query_opt(
                    "SELECT data_type::text, is_nullable::text, column_default::text \
                     FROM information_schema.columns \
                     WHERE table_schema = current_schema() AND table_name = $1::text \
                     AND column_name = $2::text",
                    &params,
                )
                .await?;
            let Some(row) = row else {
                return Ok(None);
            };
            let is_nullable: String = row.try_get(1)?;
            Ok(Some(ColumnInfo {
                name: column.to_string(),
                data_type: row.try_get(0)?,
                nullable: is_nullable == "YES",
                default: row.try_get(2)?,
            }))
        })
    }

    fn execute<'a>(&'a mut self, ddl: &'a Ddl) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            self.conn.batch_execute(&ddl.to_sql()).await?;
            Ok(())
        })
    }

    // Advisory locks stack per session: every successful lock needs its own unlock.
    fn lock(&mut self) -> CatalogFuture<'_, ()> {
        Box::pin(async move {
            let row = self
                .conn
                .query_opt("SELECT pg_try_advisory_lock($1)", &[&self.lock_key])
                .await?;
            let acquired = match row {
                Some(row) => row.try_get::<_, bool>(0)?,
                None => false,
            };
            if !acquired {
                return Err(CatalogError::LockHeld.into());
            }
            tracing::debug!(key = self.lock_key, "acquired migration lock");
            Ok(())
        })
    }

    fn unlock(&mut self) -> CatalogFuture<'_, ()> {
        Box::pin(async move {
            self.conn
                .execute("SELECT pg_advisory_unlock($1)", &[&self.lock_key])
                .await?;
            tracing::debug!(key = self.lock_key, "released migration lock");
            Ok(())
        })
    }

    fn applied_migrations(&mut self) -> CatalogFuture<'_, Vec<AppliedMigration>> {
        Box::pin(async move {
            // Reading the ledger must not create it
            if !self.exists(&SchemaObject::table(LEDGER_TABLE)).await? {
                return Ok(Vec::new());
            }
            let rows = self
                .conn
                .query(
                    &format!(
                        "SELECT version, name, checksum, applied_at FROM {} ORDER BY version",
                        quote_ident(LEDGER_TABLE)
                    ),
                    &[],
                )
                .await?;
            let mut applied = Vec::with_capacity(rows.len());
            for row in rows {
                let applied_at: DateTime<Utc> = row.try_get("applied_at")?;
                applied.push(AppliedMigration {
                    version: row.try_get("version")?,
                    name: row.try_get("name")?,
                    checksum: row.try_get("checksum")?,
                    applied_at,
                });
            }
            Ok(applied)
        })
    }

    fn record_migration<'a>(
        &'a mut self,
        version: &'a str,
        name: &'a str,
        checksum: &'a str,
    ) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_ledger().await?;
            let params: [&(dyn ToSql + Sync); 3] = [&version, &name, &checksum];
            self.conn
                .execute(
                    &format!(
                        "INSERT INTO {} (version, name, checksum) VALUES ($1, $2, $3) \
                         ON CONFLICT (version) DO UPDATE \
                         SET checksum = EXCLUDED.checksum, name = EXCLUDED.name",
                        quote_ident(LEDGER_TABLE)
                    ),
                    &params,
                )
                .await?;
            Ok(())
        })
    }

    fn forget_migration<'a>(&'a mut self, version: &'a str) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            if !self.exists(&SchemaObject::table(LEDGER_TABLE)).await? {
                return Ok(());
            }
            let sql = format!(
                "DELETE FROM {} WHERE version = $1",
                quote_ident(LEDGER_TABLE)
            );
            self.conn.execute(&sql, &[&version]).await?;
            Ok(())
        })
    }
}
