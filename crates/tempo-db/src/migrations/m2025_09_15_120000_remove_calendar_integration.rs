//! Migration: remove_calendar_integration
//! Created: 2025-09-15 12:00:00 UTC
//!
//! Drops the Google Calendar sync columns. Events now live in
//! `calendar_events`.

use tempo_migrate::{ColumnDef, Ddl, Migration, SchemaObject, Verification};
use tempo_sql::PgType;

pub fn migration() -> Migration {
    Migration::new("20250915120000", "remove_calendar_integration")
        .step(Ddl::drop_column("tasks", "google_event_id"))
        .step(Ddl::drop_column("users", "google_calendar_token"))
        .step(Ddl::drop_column("users", "google_refresh_token"))
        .verify(Verification::absent(SchemaObject::column(
            "tasks",
            "google_event_id",
        )))
        .verify(Verification::absent(SchemaObject::column(
            "users",
            "google_calendar_token",
        )))
        .verify(Verification::absent(SchemaObject::column(
            "users",
            "google_refresh_token",
        )))
        .down(Ddl::add_column("users", text("google_refresh_token")))
        .down(Ddl::add_column("users", text("google_calendar_token")))
        .down(Ddl::add_column("tasks", text("google_event_id")))
}

fn text(name: &str) -> ColumnDef {
    ColumnDef::new(name, PgType::Text)
}
