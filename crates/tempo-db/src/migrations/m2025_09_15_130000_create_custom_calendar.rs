//! Migration: create_custom_calendar
//! Created: 2025-09-15 13:00:00 UTC
//!
//! One calendar event per task (`task_id` NOT NULL and unique).

use tempo_migrate::{ColumnDef, ConstraintDef, Ddl, Migration, SchemaObject, TableDef, Verification};
use tempo_sql::PgType;

pub fn migration() -> Migration {
    Migration::new("20250915130000", "create_custom_calendar")
        .step(Ddl::CreateTable(
            TableDef::new("calendar_events")
                .column(ColumnDef::new("id", PgType::Serial).primary_key())
                .column(ColumnDef::new("user_id", PgType::BigInt).not_null())
                .column(ColumnDef::new("task_id", PgType::Integer).not_null())
                .column(ColumnDef::new("start_time", PgType::Timestamp).not_null())
                .column(ColumnDef::new("end_time", PgType::Timestamp).not_null())
                .column(
                    ColumnDef::new("created_at", PgType::Timestamp).default_now(),
                )
                .column(
                    ColumnDef::new("notification_sent", PgType::Boolean).default_value(false),
                )
                .references("user_id", "users", None)
                .references("task_id", "tasks", None)
                .constraint(ConstraintDef::unique(
                    "calendar_events_task_id_key",
                    &["task_id"],
                )),
        ))
        .step(Ddl::create_index("calendar_events", &["user_id"]))
        .step(Ddl::create_index("calendar_events", &["start_time"]))
        .verify(Verification::exists(SchemaObject::table("calendar_events")))
        .verify(Verification::exists(SchemaObject::index(
            "calendar_events",
            "idx_calendar_events_user_id",
        )))
        .verify(Verification::exists(SchemaObject::index(
            "calendar_events",
            "idx_calendar_events_start_time",
        )))
        .down(Ddl::drop_table("calendar_events"))
}
