//! Migration: baseline
//! Created: 2025-06-01 09:00:00 UTC
//!
//! Tables that predate the tracked history. On an existing database every
//! step here is skipped.

use tempo_migrate::{ColumnDef, Ddl, FkAction, Migration, SchemaObject, TableDef, Verification};
use tempo_sql::PgType;

pub fn migration() -> Migration {
    Migration::new("20250601090000", "baseline")
        .step(Ddl::CreateTable(
            TableDef::new("users")
                .column(ColumnDef::new("id", PgType::BigInt).primary_key())
                .column(ColumnDef::new("email", PgType::Text))
                .column(ColumnDef::new("name", PgType::Text))
                .column(ColumnDef::new("google_calendar_token", PgType::Text))
                .column(ColumnDef::new("google_refresh_token", PgType::Text))
                .column(
                    ColumnDef::new("created_at", PgType::Timestamp).default_now(),
                ),
        ))
        .step(Ddl::CreateTable(
            TableDef::new("tasks")
                .column(ColumnDef::new("id", PgType::Serial).primary_key())
                .column(ColumnDef::new("owner_id", PgType::BigInt))
                .column(ColumnDef::new("title", PgType::Text))
                .column(ColumnDef::new("description", PgType::Text))
                .column(ColumnDef::new("status", PgType::Text))
                .column(ColumnDef::new("due_date", PgType::Timestamp))
                .column(ColumnDef::new("google_event_id", PgType::Text))
                .column(
                    ColumnDef::new("created_at", PgType::Timestamp).default_now(),
                )
                .references("owner_id", "users", None),
        ))
        .step(Ddl::CreateTable(
            TableDef::new("habits")
                .column(ColumnDef::new("id", PgType::Serial).primary_key())
                .column(ColumnDef::new("user_id", PgType::BigInt).not_null())
                .column(ColumnDef::new("name", PgType::Varchar(255)).not_null())
                .column(ColumnDef::new("description", PgType::Text))
                .column(ColumnDef::new("frequency", PgType::Varchar(20)).not_null())
                .column(
                    ColumnDef::new("duration_minutes", PgType::Integer)
                        .not_null()
                        .default_value(30),
                )
                .column(
                    ColumnDef::new("is_active", PgType::Boolean)
                        .not_null()
                        .default_value(true),
                )
                .column(
                    ColumnDef::new("created_at", PgType::Timestamp).default_now(),
                )
                .references("user_id", "users", Some(FkAction::Cascade)),
        ))
        .step(Ddl::create_index("habits", &["user_id"]))
        .verify(Verification::exists(SchemaObject::table("users")))
        .verify(Verification::exists(SchemaObject::table("tasks")))
        .verify(Verification::exists(SchemaObject::table("habits")))
        .down(Ddl::drop_table("habits"))
        .down(Ddl::drop_table("tasks"))
        .down(Ddl::drop_table("users"))
}
