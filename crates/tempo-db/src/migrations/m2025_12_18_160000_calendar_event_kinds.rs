//! Migration: calendar_event_kinds
//! Created: 2025-12-18 16:00:00 UTC
//!
//! Challenge and generic events reference neither a task nor a habit.

use super::m2025_12_10_110000_habits_calendar_fix::{CONTENT_CHECK, TABLE, exactly_one_target};
use tempo_migrate::{ConstraintDef, Ddl, Migration, SchemaObject, Verification};
use tempo_sql::Expr;

fn content_matches_kind() -> Expr {
    let task = Expr::column("task_id");
    let habit = Expr::column("habit_id");
    let kind = Expr::column("event_type");
    Expr::any([
        Expr::all([
            kind.clone().eq(Expr::text("task")),
            task.clone().is_not_null(),
            habit.clone().is_null(),
        ]),
        Expr::all([
            kind.clone().eq(Expr::text("habit")),
            task.clone().is_null(),
            habit.clone().is_not_null(),
        ]),
        Expr::all([
            kind.in_list(["challenge", "event"]),
            task.is_null(),
            habit.is_null(),
        ]),
    ])
}

pub fn migration() -> Migration {
    Migration::new("20251218160000", "calendar_event_kinds")
        .step(Ddl::drop_constraint(TABLE, CONTENT_CHECK))
        .step(Ddl::add_constraint(
            TABLE,
            ConstraintDef::check(CONTENT_CHECK, content_matches_kind()),
        ))
        .verify(Verification::exists(SchemaObject::constraint(
            TABLE,
            CONTENT_CHECK,
        )))
        .down(Ddl::drop_constraint(TABLE, CONTENT_CHECK))
        .down(Ddl::add_constraint(
            TABLE,
            ConstraintDef::check(CONTENT_CHECK, exactly_one_target()),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_kind_check() {
        insta::assert_snapshot!(content_matches_kind().to_string(), @r#"("event_type" = 'task' AND "task_id" IS NOT NULL AND "habit_id" IS NULL) OR ("event_type" = 'habit' AND "task_id" IS NULL AND "habit_id" IS NOT NULL) OR ("event_type" IN ('challenge', 'event') AND "task_id" IS NULL AND "habit_id" IS NULL)"#);
    }
}
