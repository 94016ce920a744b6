//! Migration: habits_calendar_fix
//! Created: 2025-12-10 11:00:00 UTC
//!
//! Calendar events can belong to a habit instead of a task. Exactly one of
//! `task_id` / `habit_id` is set, and a task may have many events.

use tempo_migrate::{ColumnDef, ConstraintDef, Ddl, FkAction, Migration, SchemaObject, Verification};
use tempo_sql::{Expr, PgType};

pub(crate) const TABLE: &str = "calendar_events";
pub(crate) const CONTENT_CHECK: &str = "calendar_events_content_check";
const TASK_UNIQUE: &str = "calendar_events_task_id_key";
const HABIT_FKEY: &str = "calendar_events_habit_id_fkey";

pub(crate) fn exactly_one_target() -> Expr {
    Expr::any([
        Expr::all([
            Expr::column("task_id").is_not_null(),
            Expr::column("habit_id").is_null(),
        ]),
        Expr::all([
            Expr::column("task_id").is_null(),
            Expr::column("habit_id").is_not_null(),
        ]),
    ])
}

pub fn migration() -> Migration {
    Migration::new("20251210110000", "habits_calendar_fix")
        .step(Ddl::drop_not_null(TABLE, "task_id"))
        .step(Ddl::add_column(
            TABLE,
            ColumnDef::new("habit_id", PgType::Integer),
        ))
        .step(Ddl::add_constraint(
            TABLE,
            ConstraintDef::foreign_key(HABIT_FKEY, "habit_id", "habits", Some(FkAction::Cascade)),
        ))
        .step(Ddl::add_column(
            TABLE,
            ColumnDef::new("event_type", PgType::Varchar(20))
                .not_null()
                .default_value("task"),
        ))
        .step(Ddl::drop_constraint(TABLE, TASK_UNIQUE))
        .step(Ddl::add_constraint(
            TABLE,
            ConstraintDef::check(CONTENT_CHECK, exactly_one_target()),
        ))
        .step(Ddl::create_index(TABLE, &["habit_id"]))
        .step(Ddl::create_index(TABLE, &["event_type"]))
        .verify(Verification::nullable(TABLE, "task_id", true))
        .verify(Verification::nullable(TABLE, "habit_id", true))
        .verify(Verification::nullable(TABLE, "event_type", false))
        .verify(Verification::absent(SchemaObject::constraint(
            TABLE,
            TASK_UNIQUE,
        )))
        .verify(Verification::exists(SchemaObject::constraint(
            TABLE,
            CONTENT_CHECK,
        )))
        .down(Ddl::drop_index(TABLE, "idx_calendar_events_event_type"))
        .down(Ddl::drop_index(TABLE, "idx_calendar_events_habit_id"))
        .down(Ddl::drop_constraint(TABLE, CONTENT_CHECK))
        .down(Ddl::add_constraint(
            TABLE,
            ConstraintDef::unique(TASK_UNIQUE, &["task_id"]),
        ))
        .down(Ddl::drop_column(TABLE, "event_type"))
        .down(Ddl::drop_constraint(TABLE, HABIT_FKEY))
        .down(Ddl::drop_column(TABLE, "habit_id"))
        .down(Ddl::set_not_null(TABLE, "task_id"))
}
