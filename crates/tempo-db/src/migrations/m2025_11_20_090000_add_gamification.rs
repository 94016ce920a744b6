//! Migration: add_gamification
//! Created: 2025-11-20 09:00:00 UTC

use tempo_migrate::{ColumnDef, Ddl, Migration, SchemaObject, Verification};
use tempo_sql::PgType;

const COUNTERS: [&str; 4] = [
    "gold_cups",
    "silver_cups",
    "bronze_cups",
    "challenges_count",
];

pub fn migration() -> Migration {
    let mut migration = Migration::new("20251120090000", "add_gamification");
    for counter in COUNTERS {
        migration = migration.step(Ddl::add_column(
            "users",
            ColumnDef::new(counter, PgType::Integer).default_value(0),
        ));
    }
    for counter in COUNTERS {
        let column = SchemaObject::column("users", counter);
        migration = migration.verify(Verification::exists(column));
    }
    for counter in COUNTERS.into_iter().rev() {
        migration = migration.down(Ddl::drop_column("users", counter));
    }
    migration
}
