//! Idempotent DDL steps.
//!
//! A [`Step`] pairs one schema mutation ([`Ddl`]) with the precondition
//! ([`Guard`]) under which it must run. Guards are checked against the live
//! catalog right before execution, so a step whose effect is already present
//! is skipped and re-running a whole sequence is safe.
//!
//! ```text
//! calendar_events:
//!   ~ drop not null task_id       (runs while task_id is NOT NULL)
//!   + column habit_id             (runs while habit_id is absent)
//!   - constraint ..._task_id_key  (runs while the constraint exists)
//! ```

use crate::{Catalog, ColumnDef, ConstraintDef, IndexDef, Result, SchemaObject, TableDef};
use std::fmt;
use tempo_sql::quote_ident;

/// A single schema mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Ddl {
    /// Create a table with its inline constraints.
    CreateTable(TableDef),
    /// Drop a table.
    DropTable(String),
    /// Add a column.
    AddColumn { table: String, column: ColumnDef },
    /// Drop a column (and constraints/indexes that depend on it).
    DropColumn { table: String, column: String },
    /// Relax a column to nullable.
    DropNotNull { table: String, column: String },
    /// Tighten a column to NOT NULL; fails while a row holds NULL.
    SetNotNull { table: String, column: String },
    /// Add a named constraint.
    AddConstraint {
        table: String,
        constraint: ConstraintDef,
    },
    /// Drop a named constraint.
    DropConstraint { table: String, name: String },
    /// Create an index.
    CreateIndex(IndexDef),
    /// Drop an index.
    DropIndex { table: String, name: String },
}

impl Ddl {
    pub fn drop_table(name: &str) -> Self {
        Ddl::DropTable(name.to_string())
    }

    /// Index named by convention, see [`IndexDef::on`].
    pub fn create_index(table: &str, columns: &[&str]) -> Self {
        Ddl::CreateIndex(IndexDef::on(table, columns))
    }

    pub fn add_column(table: &str, column: ColumnDef) -> Self {
        Ddl::AddColumn {
            table: table.to_string(),
            column,
        }
    }

    pub fn drop_column(table: &str, column: &str) -> Self {
        Ddl::DropColumn {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn drop_not_null(table: &str, column: &str) -> Self {
        Ddl::DropNotNull {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn set_not_null(table: &str, column: &str) -> Self {
        Ddl::SetNotNull {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn add_constraint(table: &str, constraint: ConstraintDef) -> Self {
        Ddl::AddConstraint {
            table: table.to_string(),
            constraint,
        }
    }

    pub fn drop_constraint(table: &str, name: &str) -> Self {
        Ddl::DropConstraint {
            table: table.to_string(),
            name: name.to_string(),
        }
    }

    pub fn drop_index(table: &str, name: &str) -> Self {
        Ddl::DropIndex {
            table: table.to_string(),
            name: name.to_string(),
        }
    }

    /// The table this statement touches.
    pub fn table(&self) -> &str {
        match self {
            Ddl::CreateTable(t) => &t.name,
            Ddl::DropTable(name) => name,
            Ddl::CreateIndex(idx) => &idx.table,
            Ddl::AddColumn { table, .. }
            | Ddl::DropColumn { table, .. }
            | Ddl::DropNotNull { table, .. }
            | Ddl::SetNotNull { table, .. }
            | Ddl::AddConstraint { table, .. }
            | Ddl::DropConstraint { table, .. }
            | Ddl::DropIndex { table, .. } => table,
        }
    }

    /// The precondition that makes this statement idempotent.
    pub fn guard(&self) -> Guard {
        match self {
            Ddl::CreateTable(t) => Guard::Absent(SchemaObject::table(&t.name)),
            Ddl::DropTable(name) => Guard::Present(SchemaObject::table(name)),
            Ddl::AddColumn { table, column } => {
                Guard::Absent(SchemaObject::column(table, &column.name))
            }
            Ddl::DropColumn { table, column } => {
                Guard::Present(SchemaObject::column(table, column))
            }
            Ddl::DropNotNull { table, column } => Guard::NotNull {
                table: table.clone(),
                column: column.clone(),
            },
            Ddl::SetNotNull { table, column } => Guard::Nullable {
                table: table.clone(),
                column: column.clone(),
            },
            Ddl::AddConstraint { table, constraint } => {
                Guard::Absent(SchemaObject::constraint(table, &constraint.name))
            }
            Ddl::DropConstraint { table, name } => {
                Guard::Present(SchemaObject::constraint(table, name))
            }
            Ddl::CreateIndex(idx) => Guard::Absent(SchemaObject::index(&idx.table, &idx.name)),
            Ddl::DropIndex { table, name } => Guard::Present(SchemaObject::index(table, name)),
        }
    }

    /// The bare SQL statement.
    pub fn to_sql(&self) -> String {
        match self {
            Ddl::CreateTable(t) => t.to_create_sql(false),
            Ddl::DropTable(name) => format!("DROP TABLE {};", quote_ident(name)),
            Ddl::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN {};",
                quote_ident(table),
                column.to_sql()
            ),
            Ddl::DropColumn { table, column } => format!(
                "ALTER TABLE {} DROP COLUMN {};",
                quote_ident(table),
                quote_ident(column)
            ),
            Ddl::DropNotNull { table, column } => format!(
                "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL;",
                quote_ident(table),
                quote_ident(column)
            ),
            Ddl::SetNotNull { table, column } => format!(
                "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL;",
                quote_ident(table),
                quote_ident(column)
            ),
            Ddl::AddConstraint { table, constraint } => format!(
                "ALTER TABLE {} ADD {};",
                quote_ident(table),
                constraint.to_sql()
            ),
            Ddl::DropConstraint { table, name } => format!(
                "ALTER TABLE {} DROP CONSTRAINT {};",
                quote_ident(table),
                quote_ident(name)
            ),
            Ddl::CreateIndex(idx) => idx.to_create_sql(false),
            Ddl::DropIndex { name, .. } => format!("DROP INDEX {};", quote_ident(name)),
        }
    }

    /// A standalone statement that is a no-op when the guard is unmet.
    ///
    /// Uses `IF [NOT] EXISTS` where Postgres has it, and a `DO` block that
    /// consults `information_schema` where it does not.
    pub fn to_guarded_sql(&self) -> String {
        match self {
            Ddl::CreateTable(t) => t.to_create_sql(true),
            Ddl::DropTable(name) => format!("DROP TABLE IF EXISTS {};", quote_ident(name)),
            Ddl::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {};",
                quote_ident(table),
                column.to_sql()
            ),
            Ddl::DropColumn { table, column } => format!(
                "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
                quote_ident(table),
                quote_ident(column)
            ),
            Ddl::DropNotNull { table, column } => {
                let query = SchemaObject::column(table, column).exists_query();
                let condition = format!("EXISTS ({} AND is_nullable = 'NO')", query);
                do_block(&condition, &self.to_sql())
            }
            Ddl::SetNotNull { table, column } => {
                let query = SchemaObject::column(table, column).exists_query();
                let condition = format!("EXISTS ({} AND is_nullable = 'YES')", query);
                do_block(&condition, &self.to_sql())
            }
            Ddl::AddConstraint { table, constraint } => {
                let object = SchemaObject::constraint(table, &constraint.name);
                let condition = format!("NOT EXISTS ({})", object.exists_query());
                do_block(&condition, &self.to_sql())
            }
            Ddl::DropConstraint { table, name } => format!(
                "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
                quote_ident(table),
                quote_ident(name)
            ),
            Ddl::CreateIndex(idx) => idx.to_create_sql(true),
            Ddl::DropIndex { name, .. } => format!("DROP INDEX IF EXISTS {};", quote_ident(name)),
        }
    }
}

fn do_block(condition: &str, statement: &str) -> String {
    format!(
        "DO $$\nBEGIN\n    IF {} THEN\n        {}\n    END IF;\nEND $$;",
        condition, statement
    )
}

impl fmt::Display for Ddl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ddl::CreateTable(t) => write!(f, "+ table {}", t.name),
            Ddl::DropTable(name) => write!(f, "- table {}", name),
            Ddl::AddColumn { table, column } => {
                let nullable = if column.nullable { " (nullable)" } else { "" };
                write!(
                    f,
                    "+ {}.{}: {}{}",
                    table, column.name, column.pg_type, nullable
                )
            }
            Ddl::DropColumn { table, column } => write!(f, "- {}.{}", table, column),
            Ddl::DropNotNull { table, column } => {
                write!(f, "~ {}.{}: not null -> nullable", table, column)
            }
            Ddl::SetNotNull { table, column } => {
                write!(f, "~ {}.{}: nullable -> not null", table, column)
            }
            Ddl::AddConstraint { table, constraint } => {
                write!(f, "+ constraint {} on {}", constraint.name, table)
            }
            Ddl::DropConstraint { table, name } => write!(f, "- constraint {} on {}", name, table),
            Ddl::CreateIndex(idx) => write!(
                f,
                "+ index {} on {} ({})",
                idx.name,
                idx.table,
                idx.columns.join(", ")
            ),
            Ddl::DropIndex { table, name } => write!(f, "- index {} on {}", name, table),
        }
    }
}

/// Precondition under which a step executes.
#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    /// Bare statement, always executed.
    Always,
    /// Execute only while the object is absent.
    Absent(SchemaObject),
    /// Execute only while the object exists.
    Present(SchemaObject),
    /// Execute only while the column exists and is NOT NULL.
    NotNull { table: String, column: String },
    /// Execute only while the column exists and is nullable.
    Nullable { table: String, column: String },
}

impl Guard {
    /// Check the catalog: `true` means the step still has to run.
    pub async fn is_met<C: Catalog + ?Sized>(&self, catalog: &C) -> Result<bool> {
        match self {
            Guard::Always => Ok(true),
            Guard::Absent(object) => Ok(!catalog.exists(object).await?),
            Guard::Present(object) => catalog.exists(object).await,
            Guard::NotNull { table, column } => Ok(catalog
                .describe_column(table, column)
                .await?
                .is_some_and(|info| !info.nullable)),
            Guard::Nullable { table, column } => Ok(catalog
                .describe_column(table, column)
                .await?
                .is_some_and(|info| info.nullable)),
        }
    }
}

/// Result of applying a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The statement ran.
    Applied,
    /// The guard was unmet; the effect is already present.
    Skipped,
}

/// One guarded schema mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub guard: Guard,
    pub ddl: Ddl,
}

impl Step {
    /// A step guarded by the natural precondition of `ddl`.
    pub fn new(ddl: Ddl) -> Self {
        Self {
            guard: ddl.guard(),
            ddl,
        }
    }

    /// A bare statement that always runs.
    pub fn unguarded(ddl: Ddl) -> Self {
        Self {
            guard: Guard::Always,
            ddl,
        }
    }

    /// Whether the step would execute against the current catalog state.
    pub async fn is_pending<C: Catalog + ?Sized>(&self, catalog: &C) -> Result<bool> {
        self.guard.is_met(catalog).await
    }

    /// Check the guard, then execute the statement if it is met.
    pub async fn apply<C: Catalog + ?Sized>(&self, catalog: &mut C) -> Result<StepOutcome> {
        if !self.guard.is_met(&*catalog).await? {
            tracing::debug!(step = %self, "precondition already satisfied, skipping");
            return Ok(StepOutcome::Skipped);
        }
        catalog.execute(&self.ddl).await?;
        tracing::debug!(step = %self, "applied");
        Ok(StepOutcome::Applied)
    }

    /// Standalone SQL for scripts.
    pub fn to_script(&self) -> String {
        match self.guard {
            Guard::Always => self.ddl.to_sql(),
            _ => self.ddl.to_guarded_sql(),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ddl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryCatalog;
    use tempo_sql::{Expr, PgType, Value};

    fn users() -> TableDef {
        TableDef::new("users")
            .column(ColumnDef::new("id", PgType::BigInt).primary_key())
            .column(ColumnDef::new("email", PgType::Text))
    }

    fn calendar_events() -> TableDef {
        TableDef::new("calendar_events")
            .column(ColumnDef::new("id", PgType::Serial).primary_key())
            .column(ColumnDef::new("task_id", PgType::Integer).not_null())
    }

    #[tokio::test]
    async fn add_column_runs_once() {
        let mut catalog = MemoryCatalog::new();
        Step::new(Ddl::CreateTable(users()))
            .apply(&mut catalog)
            .await
            .unwrap();

        let step = Step::new(Ddl::add_column(
            "users",
            ColumnDef::new("gold_cups", PgType::Integer).default_value(0),
        ));
        assert_eq!(
            step.apply(&mut catalog).await.unwrap(),
            StepOutcome::Applied
        );
        let after_first = catalog.schema().clone();
        assert_eq!(
            step.apply(&mut catalog).await.unwrap(),
            StepOutcome::Skipped
        );
        assert_eq!(catalog.schema(), &after_first);
    }

    #[tokio::test]
    async fn unguarded_add_fails_on_rerun() {
        let mut catalog = MemoryCatalog::new();
        Step::new(Ddl::CreateTable(users()))
            .apply(&mut catalog)
            .await
            .unwrap();

        let step = Step::unguarded(Ddl::add_column(
            "users",
            ColumnDef::new("plan", PgType::Text),
        ));
        step.apply(&mut catalog).await.unwrap();
        let err = step.apply(&mut catalog).await.unwrap_err();
        assert!(matches!(
            err.catalog_error(),
            Some(crate::CatalogError::ColumnAlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn drop_not_null_is_skipped_once_nullable() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .apply_ddl(&Ddl::CreateTable(calendar_events()))
            .unwrap();

        let step = Step::new(Ddl::drop_not_null("calendar_events", "task_id"));
        assert!(step.is_pending(&catalog).await.unwrap());
        assert_eq!(
            step.apply(&mut catalog).await.unwrap(),
            StepOutcome::Applied
        );
        assert!(!step.is_pending(&catalog).await.unwrap());
    }

    #[tokio::test]
    async fn set_not_null_waits_for_a_nullable_column() {
        let mut catalog = MemoryCatalog::new();
        catalog
            .apply_ddl(&Ddl::CreateTable(calendar_events()))
            .unwrap();

        let tighten = Step::new(Ddl::set_not_null("calendar_events", "task_id"));
        assert!(!tighten.is_pending(&catalog).await.unwrap());

        catalog
            .apply_ddl(&Ddl::drop_not_null("calendar_events", "task_id"))
            .unwrap();
        catalog
            .insert("calendar_events", [("task_id", Value::Null)])
            .unwrap();
        let err = tighten.apply(&mut catalog).await.unwrap_err();
        assert!(matches!(
            err.catalog_error(),
            Some(crate::CatalogError::NotNullViolation { .. })
        ));
    }

    #[test]
    fn guarded_sql_for_tables_and_indexes() {
        insta::assert_snapshot!(Ddl::CreateTable(users()).to_guarded_sql(), @r#"
        CREATE TABLE IF NOT EXISTS "users" (
            "id" BIGINT PRIMARY KEY,
            "email" TEXT
        );
        "#);

        let drop_table = Ddl::DropTable("users".to_string());
        insta::assert_snapshot!(
            drop_table.to_guarded_sql(),
            @r#"DROP TABLE IF EXISTS "users";"#
        );

        let index = Ddl::CreateIndex(IndexDef::on("habits", &["user_id"]));
        insta::assert_snapshot!(
            index.to_guarded_sql(),
            @r#"CREATE INDEX IF NOT EXISTS "idx_habits_user_id" ON "habits" ("user_id");"#
        );

        let drop_index = Ddl::drop_index("habits", "idx_habits_user_id");
        insta::assert_snapshot!(
            drop_index.to_guarded_sql(),
            @r#"DROP INDEX IF EXISTS "idx_habits_user_id";"#
        );
    }

    #[test]
    fn guarded_sql_for_columns() {
        let add = Ddl::add_column(
            "calendar_events",
            ColumnDef::new("event_type", PgType::Varchar(20))
                .not_null()
                .default_value("task"),
        );
        insta::assert_snapshot!(
            add.to_guarded_sql(),
            @r#"ALTER TABLE "calendar_events" ADD COLUMN IF NOT EXISTS "event_type" VARCHAR(20) NOT NULL DEFAULT 'task';"#
        );

        let drop = Ddl::drop_column("tasks", "google_event_id");
        insta::assert_snapshot!(
            drop.to_guarded_sql(),
            @r#"ALTER TABLE "tasks" DROP COLUMN IF EXISTS "google_event_id";"#
        );

        let relax = Ddl::drop_not_null("calendar_events", "task_id");
        insta::assert_snapshot!(relax.to_guarded_sql(), @r#"
        DO $$
        BEGIN
            IF EXISTS (SELECT 1 FROM information_schema.columns WHERE table_schema = current_schema() AND table_name = 'calendar_events' AND column_name = 'task_id' AND is_nullable = 'NO') THEN
                ALTER TABLE "calendar_events" ALTER COLUMN "task_id" DROP NOT NULL;
            END IF;
        END $$;
        "#);

        let tighten = Ddl::set_not_null("calendar_events", "task_id");
        insta::assert_snapshot!(tighten.to_guarded_sql(), @r#"
        DO $$
        BEGIN
            IF EXISTS (SELECT 1 FROM information_schema.columns WHERE table_schema = current_schema() AND table_name = 'calendar_events' AND column_name = 'task_id' AND is_nullable = 'YES') THEN
                ALTER TABLE "calendar_events" ALTER COLUMN "task_id" SET NOT NULL;
            END IF;
        END $$;
        "#);
    }

    #[test]
    fn guarded_sql_for_constraints() {
        let check = Ddl::add_constraint(
            "challenge_participants",
            ConstraintDef::check(
                "challenge_participants_rank_check",
                Expr::column("rank").ge(Expr::int(1)),
            ),
        );
        insta::assert_snapshot!(check.to_guarded_sql(), @r#"
        DO $$
        BEGIN
            IF NOT EXISTS (SELECT 1 FROM information_schema.table_constraints WHERE table_schema = current_schema() AND table_name = 'challenge_participants' AND constraint_name = 'challenge_participants_rank_check') THEN
                ALTER TABLE "challenge_participants" ADD CONSTRAINT "challenge_participants_rank_check" CHECK ("rank" >= 1);
            END IF;
        END $$;
        "#);

        let drop = Ddl::drop_constraint("calendar_events", "calendar_events_task_id_key");
        insta::assert_snapshot!(
            drop.to_guarded_sql(),
            @r#"ALTER TABLE "calendar_events" DROP CONSTRAINT IF EXISTS "calendar_events_task_id_key";"#
        );
    }

    #[test]
    fn unguarded_step_renders_bare_statement() {
        let step = Step::unguarded(Ddl::drop_column("tasks", "google_event_id"));
        assert_eq!(
            step.to_script(),
            r#"ALTER TABLE "tasks" DROP COLUMN "google_event_id";"#
        );
    }
}
