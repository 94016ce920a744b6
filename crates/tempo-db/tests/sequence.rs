use proptest::prelude::*;
use tempo_db::{migrations, migrations_through};
use tempo_migrate::{
    Catalog, CatalogError, Error, MemoryCatalog, MigrationRunner, RunOptions, SchemaObject,
    SchemaState,
};
use tempo_sql::Value;

const ADD_CHALLENGES: &str = "20251129100000";
const FIX_PARTICIPANT_STATUS: &str = "20251205150000";
const HABITS_CALENDAR_FIX: &str = "20251210110000";

fn without_ledger() -> RunOptions {
    RunOptions {
        ledger: false,
        ..RunOptions::default()
    }
}

async fn migrate(catalog: &mut MemoryCatalog, through: Option<&str>) {
    let list = match through {
        Some(version) => migrations_through(version),
        None => migrations(),
    };
    MigrationRunner::new(catalog).run(&list).await.unwrap();
}

async fn terminal_schema() -> SchemaState {
    let mut catalog = MemoryCatalog::new();
    migrate(&mut catalog, None).await;
    catalog.schema().clone()
}

/// A user, a task, and a habit to point calendar events at.
fn seed(catalog: &mut MemoryCatalog) -> (i64, i64) {
    let user = [("id", Value::Int(1)), ("email", Value::text("a@b.c"))];
    catalog.insert("users", user).unwrap();
    let task = [("owner_id", Value::Int(1)), ("title", Value::text("read"))];
    let task = catalog.insert("tasks", task).unwrap();
    let habit = catalog
        .insert(
            "habits",
            [
                ("user_id", Value::Int(1)),
                ("name", Value::text("walk")),
                ("frequency", Value::text("daily")),
            ],
        )
        .unwrap();
    let id = |row: &tempo_migrate::Row| match row["id"] {
        Value::Int(id) => id,
        ref other => panic!("unexpected id {other:?}"),
    };
    (id(&task), id(&habit))
}

fn insert_event(
    catalog: &mut MemoryCatalog,
    task: Option<i64>,
    habit: Option<i64>,
    kind: &str,
) -> Result<tempo_migrate::Row, CatalogError> {
    catalog.insert(
        "calendar_events",
        [
            ("user_id", Value::Int(1)),
            ("task_id", task.into()),
            ("habit_id", habit.into()),
            ("event_type", Value::text(kind)),
            ("start_time", Value::text("2025-12-20 09:00:00")),
            ("end_time", Value::text("2025-12-20 10:00:00")),
        ],
    )
}

fn insert_participant(
    catalog: &mut MemoryCatalog,
    status: &str,
    rank: Option<i64>,
) -> Result<tempo_migrate::Row, CatalogError> {
    if catalog.rows("challenges").is_empty() {
        catalog
            .insert(
                "challenges",
                [
                    ("creator_id", Value::Int(1)),
                    ("name", Value::text("sprint")),
                    ("duration_minutes", Value::Int(25)),
                    ("expires_at", Value::text("2025-12-21 00:00:00")),
                ],
            )
            .unwrap();
    }
    catalog.insert(
        "challenge_participants",
        [
            ("challenge_id", Value::Int(1)),
            ("user_id", Value::Int(1)),
            ("status", Value::text(status)),
            ("rank", rank.into()),
        ],
    )
}

#[tokio::test]
async fn every_step_is_idempotent() {
    let mut catalog = MemoryCatalog::new();
    for migration in migrations() {
        for step in &migration.steps {
            step.apply(&mut catalog).await.unwrap();
            let once = catalog.schema().clone();
            step.apply(&mut catalog).await.unwrap();
            assert_eq!(catalog.schema(), &once, "{} / {}", migration.id(), step);
        }
    }
    assert_eq!(catalog.schema(), &terminal_schema().await);
}

#[tokio::test]
async fn terminal_calendar_events_columns() {
    let mut catalog = MemoryCatalog::new();
    migrate(&mut catalog, None).await;

    for column in ["task_id", "habit_id"] {
        let info = catalog
            .describe_column("calendar_events", column)
            .await
            .unwrap()
            .unwrap();
        assert!(info.nullable, "{column} should be nullable");
        assert_eq!(info.data_type, "integer");
    }
    let kind = catalog
        .describe_column("calendar_events", "event_type")
        .await
        .unwrap()
        .unwrap();
    assert!(!kind.nullable);
    assert_eq!(kind.data_type, "character varying");
    assert_eq!(kind.default.as_deref(), Some("'task'"));

    let unique = SchemaObject::constraint("calendar_events", "calendar_events_task_id_key");
    assert!(!catalog.contains(&unique));
    let event_id = SchemaObject::column("tasks", "google_event_id");
    assert!(!catalog.contains(&event_id));
}

#[tokio::test]
async fn full_run_passes_every_verification() {
    let mut catalog = MemoryCatalog::new();
    let report = MigrationRunner::new(&mut catalog)
        .run(&migrations())
        .await
        .unwrap();
    let mismatches: Vec<_> = report.mismatches().map(|v| &v.description).collect();
    assert!(mismatches.is_empty(), "{mismatches:?}");

    // Post-conditions are durable: they still hold once everything has run
    let reports = MigrationRunner::new(&mut catalog)
        .verify(&migrations())
        .await
        .unwrap();
    for report in reports {
        for result in report.results {
            assert!(result.passed, "{}: {}", report.version, result);
        }
    }
}

#[tokio::test]
async fn challenge_event_needs_the_kind_aware_check() {
    let mut catalog = MemoryCatalog::new();
    migrate(&mut catalog, Some(HABITS_CALENDAR_FIX)).await;
    seed(&mut catalog);

    match insert_event(&mut catalog, None, None, "challenge") {
        Err(CatalogError::CheckViolation { constraint, .. }) => {
            assert_eq!(constraint, "calendar_events_content_check")
        }
        other => panic!("expected a check violation, got {other:?}"),
    }

    migrate(&mut catalog, None).await;
    insert_event(&mut catalog, None, None, "challenge").unwrap();
}

#[tokio::test]
async fn finished_status_needs_the_participant_fix() {
    let mut catalog = MemoryCatalog::new();
    migrate(&mut catalog, Some(ADD_CHALLENGES)).await;
    seed(&mut catalog);

    assert!(matches!(
        insert_participant(&mut catalog, "finished", None),
        Err(CatalogError::CheckViolation { .. })
    ));
    assert!(matches!(
        insert_participant(&mut catalog, "completed", Some(5)),
        Err(CatalogError::CheckViolation { .. })
    ));
    insert_participant(&mut catalog, "completed", Some(3)).unwrap();

    migrate(&mut catalog, Some(FIX_PARTICIPANT_STATUS)).await;
    insert_participant(&mut catalog, "finished", None).unwrap();
    insert_participant(&mut catalog, "finished", Some(5)).unwrap();
    assert!(
        insert_participant(&mut catalog, "finished", Some(0)).is_err()
    );
    assert!(insert_participant(&mut catalog, "abandoned", None).is_err());
}

#[tokio::test]
async fn terminal_content_check_accepts_and_rejects() {
    let mut catalog = MemoryCatalog::new();
    migrate(&mut catalog, None).await;
    let (task, habit) = seed(&mut catalog);

    insert_event(&mut catalog, Some(task), None, "task").unwrap();
    insert_event(&mut catalog, None, Some(habit), "habit").unwrap();
    insert_event(&mut catalog, None, None, "challenge").unwrap();
    insert_event(&mut catalog, None, None, "event").unwrap();

    // Many events per task now
    insert_event(&mut catalog, Some(task), None, "task").unwrap();

    for (t, h, kind) in [
        (Some(task), Some(habit), "task"),
        (None, None, "task"),
        (Some(task), None, "habit"),
        (Some(task), None, "challenge"),
        (None, None, "meeting"),
    ] {
        let err = insert_event(&mut catalog, t, h, kind).unwrap_err();
        assert!(
            matches!(err, CatalogError::CheckViolation { .. }),
            "({t:?}, {h:?}, {kind}) gave {err:?}"
        );
    }
}

#[tokio::test]
async fn interrupted_run_resumes_from_the_top() {
    let total = {
        let mut catalog = MemoryCatalog::new();
        migrate(&mut catalog, None).await;
        catalog.executed()
    };
    let terminal = terminal_schema().await;

    for fail_at in 0..total {
        for options in [RunOptions::default(), without_ledger()] {
            let mut catalog = MemoryCatalog::new();
            catalog.fail_after(fail_at);
            let err = MigrationRunner::new(&mut catalog)
                .with_options(options)
                .run(&migrations())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Step { .. }));
            assert_eq!(err.catalog_error(), Some(&CatalogError::Disconnected));
            assert_eq!(catalog.executed(), fail_at);

            catalog.reconnect();
            MigrationRunner::new(&mut catalog)
                .with_options(options)
                .run(&migrations())
                .await
                .unwrap();
            assert_eq!(catalog.schema(), &terminal, "failed at statement {fail_at}");
        }
    }
}

#[tokio::test]
async fn rerun_without_ledger_keeps_challenge_events_valid() {
    let mut catalog = MemoryCatalog::new();
    migrate(&mut catalog, None).await;
    seed(&mut catalog);
    insert_event(&mut catalog, None, None, "challenge").unwrap();
    let terminal = catalog.schema().clone();

    let report = MigrationRunner::new(&mut catalog)
        .run(&migrations())
        .await
        .unwrap();
    assert_eq!(report.applied_steps(), 0);

    // The exactly-one-target check is only added while no content check
    // exists, so the kind-aware one survives and the challenge row with it
    let report = MigrationRunner::new(&mut catalog)
        .with_options(without_ledger())
        .run(&migrations())
        .await
        .unwrap();
    assert_eq!(report.mismatches().count(), 0);
    assert_eq!(catalog.schema(), &terminal);
    assert_eq!(catalog.rows("calendar_events").len(), 1);
    insert_event(&mut catalog, None, None, "event").unwrap();
}

#[tokio::test]
async fn revert_to_each_version_matches_a_partial_run() {
    let all = migrations();
    let terminal = terminal_schema().await;

    for target in &all[..all.len() - 1] {
        let mut catalog = MemoryCatalog::new();
        migrate(&mut catalog, None).await;
        MigrationRunner::new(&mut catalog)
            .revert(&all, Some(target.version.as_str()))
            .await
            .unwrap();

        let mut expected = MemoryCatalog::new();
        migrate(&mut expected, Some(target.version.as_str())).await;
        let id = target.id();
        assert_eq!(catalog.schema(), expected.schema(), "revert to {id}");

        // Reverted migrations left the ledger, so they apply again
        migrate(&mut catalog, None).await;
        assert_eq!(catalog.schema(), &terminal, "re-run after {id}");
    }
}

#[tokio::test]
async fn revert_everything_leaves_an_empty_schema() {
    let mut catalog = MemoryCatalog::new();
    migrate(&mut catalog, None).await;

    let report = MigrationRunner::new(&mut catalog)
        .revert(&migrations(), None)
        .await
        .unwrap();
    assert_eq!(report.migrations.len(), migrations().len());
    assert!(catalog.schema().tables.is_empty());
    assert!(catalog.schema().indexes.is_empty());

    let status = MigrationRunner::new(&mut catalog)
        .status(&migrations())
        .await
        .unwrap();
    for s in &status {
        assert!(s.recorded.is_none());
        assert!(s.is_pending(), "{} should be pending", s.version);
    }
}

#[tokio::test]
async fn revert_over_rows_the_old_check_rejects_fails() {
    let mut catalog = MemoryCatalog::new();
    migrate(&mut catalog, None).await;
    seed(&mut catalog);
    insert_participant(&mut catalog, "finished", Some(7)).unwrap();

    let err = MigrationRunner::new(&mut catalog)
        .revert(&migrations(), Some(ADD_CHALLENGES))
        .await
        .unwrap_err();
    match &err {
        Error::Step { version, .. } => assert_eq!(version, FIX_PARTICIPANT_STATUS),
        other => panic!("expected step error, got {other:?}"),
    }
    assert!(matches!(
        err.catalog_error(),
        Some(CatalogError::CheckViolation { .. })
    ));
    assert!(!catalog.is_locked());
}

#[tokio::test]
async fn status_on_fresh_and_migrated_catalogs() {
    let mut catalog = MemoryCatalog::new();
    let before = MigrationRunner::new(&mut catalog)
        .status(&migrations())
        .await
        .unwrap();
    assert!(before[0].is_pending());
    assert!(before.iter().all(|s| s.recorded.is_none()));

    migrate(&mut catalog, None).await;
    let after = MigrationRunner::new(&mut catalog)
        .status(&migrations())
        .await
        .unwrap();
    for status in &after {
        assert!(status.recorded.is_some());
        assert!(!status.checksum_drift);
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prefix_reruns_reach_the_same_terminal_schema(
        prefixes in prop::collection::vec(0usize..=8, 0..5),
        use_ledger in any::<bool>(),
    ) {
        let terminal = block_on(terminal_schema());
        let options = RunOptions {
            ledger: use_ledger,
            ..RunOptions::default()
        };
        let all = migrations();

        let schema = block_on(async {
            let mut catalog = MemoryCatalog::new();
            for len in &prefixes {
                MigrationRunner::new(&mut catalog)
                    .with_options(options)
                    .run(&all[..*len])
                    .await
                    .unwrap();
            }
            MigrationRunner::new(&mut catalog)
                .with_options(options)
                .run(&all)
                .await
                .unwrap();
            catalog.schema().clone()
        });
        prop_assert_eq!(schema, terminal);
    }

    #[test]
    fn revert_then_migrate_reaches_the_terminal_schema(
        target in 0usize..8,
        use_ledger in any::<bool>(),
    ) {
        let terminal = block_on(terminal_schema());
        let options = RunOptions {
            ledger: use_ledger,
            ..RunOptions::default()
        };
        let all = migrations();

        let version = all[target].version.as_str();

        let (reverted, expected, rerun) = block_on(async {
            let mut catalog = MemoryCatalog::new();
            let mut runner = MigrationRunner::new(&mut catalog).with_options(options);
            runner.run(&all).await.unwrap();
            runner.revert(&all, Some(version)).await.unwrap();
            let reverted = catalog.schema().clone();

            let mut partial = MemoryCatalog::new();
            migrate(&mut partial, Some(version)).await;

            MigrationRunner::new(&mut catalog)
                .with_options(options)
                .run(&all)
                .await
                .unwrap();
            (reverted, partial.schema().clone(), catalog.schema().clone())
        });
        prop_assert_eq!(reverted, expected);
        prop_assert_eq!(rerun, terminal);
    }
}
