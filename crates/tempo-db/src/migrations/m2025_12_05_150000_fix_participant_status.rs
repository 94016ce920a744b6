//! Migration: fix_participant_status
//! Created: 2025-12-05 15:00:00 UTC
//!
//! Participants move through `started` and `finished` while a challenge is
//! live, and every finisher gets a rank, not only the podium.

use super::m2025_11_29_100000_add_challenges_quizzes::{
    RANK_CHECK, STATUS_CHECK, rank_check, status_check,
};
use tempo_migrate::{ConstraintDef, Ddl, Migration, SchemaObject, Verification};
use tempo_sql::Expr;

const TABLE: &str = "challenge_participants";

pub fn migration() -> Migration {
    Migration::new("20251205150000", "fix_participant_status")
        .step(Ddl::drop_constraint(TABLE, STATUS_CHECK))
        .step(Ddl::add_constraint(
            TABLE,
            ConstraintDef::check(
                STATUS_CHECK,
                Expr::column("status").in_list([
                    "invited",
                    "accepted",
                    "rejected",
                    "started",
                    "finished",
                    "completed",
                ]),
            ),
        ))
        .step(Ddl::drop_constraint(TABLE, RANK_CHECK))
        .step(Ddl::add_constraint(
            TABLE,
            ConstraintDef::check(
                RANK_CHECK,
                Expr::any([
                    Expr::column("rank").is_null(),
                    Expr::column("rank").ge(Expr::int(1)),
                ]),
            ),
        ))
        .verify(Verification::exists(SchemaObject::constraint(
            TABLE,
            STATUS_CHECK,
        )))
        .verify(Verification::exists(SchemaObject::constraint(
            TABLE,
            RANK_CHECK,
        )))
        .down(Ddl::drop_constraint(TABLE, RANK_CHECK))
        .down(Ddl::add_constraint(TABLE, rank_check()))
        .down(Ddl::drop_constraint(TABLE, STATUS_CHECK))
        .down(Ddl::add_constraint(TABLE, status_check()))
}
