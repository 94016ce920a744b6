pub mod m2025_06_01_090000_baseline;
pub mod m2025_09_15_120000_remove_calendar_integration;
pub mod m2025_09_15_130000_create_custom_calendar;
pub mod m2025_11_20_090000_add_gamification;
pub mod m2025_11_29_100000_add_challenges_quizzes;
pub mod m2025_12_05_150000_fix_participant_status;
pub mod m2025_12_10_110000_habits_calendar_fix;
pub mod m2025_12_18_160000_calendar_event_kinds;
