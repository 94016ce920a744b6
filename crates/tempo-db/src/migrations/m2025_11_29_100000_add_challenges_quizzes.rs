//! Migration: add_challenges_quizzes
//! Created: 2025-11-29 10:00:00 UTC
//!
//! Timed challenges between users, optionally backed by a quiz.

use tempo_migrate::{
    ColumnDef, ConstraintDef, Ddl, FkAction, Migration, SchemaObject, TableDef, Verification,
};
use tempo_sql::{Expr, PgType};

pub(crate) const STATUS_CHECK: &str = "challenge_participants_status_check";
pub(crate) const RANK_CHECK: &str = "challenge_participants_rank_check";
const PARTICIPANTS: &str = "challenge_participants";

pub(crate) fn status_check() -> ConstraintDef {
    ConstraintDef::check(
        STATUS_CHECK,
        Expr::column("status").in_list(["invited", "accepted", "rejected", "completed"]),
    )
}

/// Only the podium is ranked.
pub(crate) fn rank_check() -> ConstraintDef {
    ConstraintDef::check(
        RANK_CHECK,
        Expr::any([
            Expr::column("rank").is_null(),
            Expr::column("rank").between(1, 3),
        ]),
    )
}

pub fn migration() -> Migration {
    Migration::new("20251129100000", "add_challenges_quizzes")
        .step(Ddl::CreateTable(
            TableDef::new("challenges")
                .column(ColumnDef::new("id", PgType::Serial).primary_key())
                .column(ColumnDef::new("creator_id", PgType::BigInt).not_null())
                .column(ColumnDef::new("name", PgType::Text).not_null())
                .column(ColumnDef::new("description", PgType::Text))
                .column(
                    ColumnDef::new("duration_minutes", PgType::Integer).not_null(),
                )
                .column(
                    ColumnDef::new("is_quiz", PgType::Boolean).default_value(false),
                )
                .column(
                    ColumnDef::new("lifespan_hours", PgType::Integer).default_value(24),
                )
                .column(
                    ColumnDef::new("created_at", PgType::Timestamp).default_now(),
                )
                .column(ColumnDef::new("expires_at", PgType::Timestamp).not_null())
                .references("creator_id", "users", Some(FkAction::Cascade)),
        ))
        .step(Ddl::create_index("challenges", &["creator_id"]))
        .step(Ddl::CreateTable(
            TableDef::new(PARTICIPANTS)
                .column(ColumnDef::new("id", PgType::Serial).primary_key())
                .column(ColumnDef::new("challenge_id", PgType::Integer).not_null())
                .column(ColumnDef::new("user_id", PgType::BigInt).not_null())
                .column(
                    ColumnDef::new("status", PgType::Varchar(20)).default_value("invited"),
                )
                .column(ColumnDef::new("start_time", PgType::Timestamp))
                .column(ColumnDef::new("end_time", PgType::Timestamp))
                .column(ColumnDef::new("time_taken_seconds", PgType::Integer))
                .column(ColumnDef::new("score", PgType::DoublePrecision))
                .column(ColumnDef::new("rank", PgType::Integer))
                .references("challenge_id", "challenges", Some(FkAction::Cascade))
                .references("user_id", "users", Some(FkAction::Cascade))
                .constraint(status_check())
                .constraint(rank_check()),
        ))
        .step(Ddl::create_index(PARTICIPANTS, &["challenge_id"]))
        .step(Ddl::create_index(PARTICIPANTS, &["user_id"]))
        .step(Ddl::CreateTable(
            TableDef::new("quizzes")
                .column(ColumnDef::new("id", PgType::Serial).primary_key())
                .column(ColumnDef::new("challenge_id", PgType::Integer).not_null())
                .column(
                    ColumnDef::new("duration_minutes", PgType::Integer).not_null(),
                )
                .references("challenge_id", "challenges", Some(FkAction::Cascade))
                .constraint(ConstraintDef::unique(
                    "quizzes_challenge_id_key",
                    &["challenge_id"],
                )),
        ))
        .step(Ddl::CreateTable(
            TableDef::new("questions")
                .column(ColumnDef::new("id", PgType::Serial).primary_key())
                .column(ColumnDef::new("quiz_id", PgType::Integer).not_null())
                .column(ColumnDef::new("text", PgType::Text).not_null())
                .column(ColumnDef::new("type", PgType::Varchar(20)).not_null())
                .column(ColumnDef::new("explanation", PgType::Text))
                .references("quiz_id", "quizzes", Some(FkAction::Cascade))
                .constraint(ConstraintDef::check(
                    "questions_type_check",
                    Expr::column("type").in_list(["mcq", "true_false"]),
                )),
        ))
        .step(Ddl::create_index("questions", &["quiz_id"]))
        .step(Ddl::CreateTable(
            TableDef::new("question_options")
                .column(ColumnDef::new("id", PgType::Serial).primary_key())
                .column(ColumnDef::new("question_id", PgType::Integer).not_null())
                .column(ColumnDef::new("text", PgType::Text).not_null())
                .column(
                    ColumnDef::new("is_correct", PgType::Boolean).default_value(false),
                )
                .references("question_id", "questions", Some(FkAction::Cascade)),
        ))
        .step(Ddl::create_index("question_options", &["question_id"]))
        .verify(Verification::exists(SchemaObject::table("challenges")))
        .verify(Verification::exists(SchemaObject::table(PARTICIPANTS)))
        .verify(Verification::exists(SchemaObject::constraint(
            "quizzes",
            "quizzes_challenge_id_key",
        )))
        .verify(Verification::exists(SchemaObject::table("questions")))
        .verify(Verification::exists(SchemaObject::table(
            "question_options",
        )))
        .down(Ddl::drop_table("question_options"))
        .down(Ddl::drop_table("questions"))
        .down(Ddl::drop_table("quizzes"))
        .down(Ddl::drop_table(PARTICIPANTS))
        .down(Ddl::drop_table("challenges"))
}
