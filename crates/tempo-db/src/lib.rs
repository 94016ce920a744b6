//! Schema migrations for the tempo task, habit, and challenge tracker.
//!
//! [`migrations`] returns the full set in version order. Migration files are
//! named `m{date}_{time}_{name}.rs`; the version is the date and time with the
//! separators removed.

use tempo_migrate::Migration;

pub mod migrations;

use migrations::*;

/// Every migration, oldest first.
pub fn migrations() -> Vec<Migration> {
    vec![
        m2025_06_01_090000_baseline::migration(),
        m2025_09_15_120000_remove_calendar_integration::migration(),
        m2025_09_15_130000_create_custom_calendar::migration(),
        m2025_11_20_090000_add_gamification::migration(),
        m2025_11_29_100000_add_challenges_quizzes::migration(),
        m2025_12_05_150000_fix_participant_status::migration(),
        m2025_12_10_110000_habits_calendar_fix::migration(),
        m2025_12_18_160000_calendar_event_kinds::migration(),
    ]
}

/// Migrations up to and including `version`.
pub fn migrations_through(version: &str) -> Vec<Migration> {
    migrations()
        .into_iter()
        .take_while(|m| m.version.as_str() <= version)
        .collect()
}
