use tempo_migrate::{
    Catalog, CatalogError, ColumnDef, ConstraintDef, Ddl, Error, MemoryCatalog, Migration,
    MigrationRunner, RunOptions, SchemaObject, TableDef, Verification,
};
use tempo_sql::{Expr, PgType, Value};

fn create_users() -> Migration {
    Migration::new("001", "create_users")
        .step(Ddl::CreateTable(
            TableDef::new("users")
                .column(ColumnDef::new("id", PgType::BigInt).primary_key())
                .column(ColumnDef::new("email", PgType::Text).not_null()),
        ))
        .verify(Verification::exists(SchemaObject::table("users")))
        .down(Ddl::drop_table("users"))
}

fn add_cups() -> Migration {
    Migration::new("002", "add_cups")
        .step(Ddl::add_column(
            "users",
            ColumnDef::new("gold_cups", PgType::Integer).default_value(0),
        ))
        .step(Ddl::add_column(
            "users",
            ColumnDef::new("silver_cups", PgType::Integer).default_value(0),
        ))
        .verify(Verification::exists(SchemaObject::column(
            "users",
            "gold_cups",
        )))
        .down(Ddl::drop_column("users", "silver_cups"))
        .down(Ddl::drop_column("users", "gold_cups"))
}

fn without_ledger() -> RunOptions {
    RunOptions {
        ledger: false,
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn runs_in_order_and_records() {
    let mut catalog = MemoryCatalog::new();
    let report = MigrationRunner::new(&mut catalog)
        .run(&[create_users(), add_cups()])
        .await
        .unwrap();

    assert_eq!(report.applied_steps(), 3);
    assert_eq!(report.mismatches().count(), 0);
    let silver = SchemaObject::column("users", "silver_cups");
    assert!(catalog.contains(&silver));

    let ledger = catalog.applied_migrations().await.unwrap();
    let versions: Vec<_> = ledger.iter().map(|m| m.version.as_str()).collect();
    assert_eq!(versions, ["001", "002"]);
    assert_eq!(ledger[1].checksum, add_cups().checksum());
}

#[tokio::test]
async fn rerun_skips_recorded_migrations() {
    let mut catalog = MemoryCatalog::new();
    let migrations = [create_users(), add_cups()];
    MigrationRunner::new(&mut catalog)
        .run(&migrations)
        .await
        .unwrap();
    let executed = catalog.executed();

    let report = MigrationRunner::new(&mut catalog)
        .run(&migrations)
        .await
        .unwrap();
    assert!(report.migrations.iter().all(|m| m.already_recorded));
    assert_eq!(catalog.executed(), executed);
}

#[tokio::test]
async fn rerun_without_ledger_skips_every_step() {
    let mut catalog = MemoryCatalog::new();
    let migrations = [create_users(), add_cups()];
    MigrationRunner::new(&mut catalog)
        .with_options(without_ledger())
        .run(&migrations)
        .await
        .unwrap();
    let schema = catalog.schema().clone();

    let report = MigrationRunner::new(&mut catalog)
        .with_options(without_ledger())
        .run(&migrations)
        .await
        .unwrap();
    assert_eq!(report.applied_steps(), 0);
    assert_eq!(report.migrations[1].skipped, 2);
    assert_eq!(catalog.schema(), &schema);
    assert!(catalog.applied_migrations().await.unwrap().is_empty());
}

#[tokio::test]
async fn changed_migration_is_rechecked_and_rechecksummed() {
    let mut catalog = MemoryCatalog::new();
    MigrationRunner::new(&mut catalog)
        .run(&[create_users(), add_cups()])
        .await
        .unwrap();

    let bronze = ColumnDef::new("bronze_cups", PgType::Integer);
    let edited = add_cups().step(Ddl::add_column("users", bronze));
    let report = MigrationRunner::new(&mut catalog)
        .run(&[create_users(), edited.clone()])
        .await
        .unwrap();

    let second = &report.migrations[1];
    assert!(!second.already_recorded);
    assert_eq!((second.applied, second.skipped), (1, 2));
    let ledger = catalog.applied_migrations().await.unwrap();
    assert_eq!(ledger[1].checksum, edited.checksum());
}

#[tokio::test]
async fn out_of_order_is_rejected_before_any_step() {
    let mut catalog = MemoryCatalog::new();
    let err = MigrationRunner::new(&mut catalog)
        .run(&[add_cups(), create_users()])
        .await
        .unwrap_err();
    match &err {
        Error::OutOfOrder { version, .. } => assert_eq!(version, "001"),
        other => panic!("expected out-of-order error, got {other:?}"),
    }
    assert_eq!(catalog.executed(), 0);
    assert!(!catalog.is_locked());
}

#[tokio::test]
async fn duplicate_version_is_rejected() {
    let mut catalog = MemoryCatalog::new();
    let err = MigrationRunner::new(&mut catalog)
        .run(&[create_users(), create_users()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateVersion { .. }));
}

#[tokio::test]
async fn failure_stops_the_run_and_releases_the_lock() {
    let mut catalog = MemoryCatalog::new();
    catalog.fail_after(2);
    let err = MigrationRunner::new(&mut catalog)
        .run(&[create_users(), add_cups()])
        .await
        .unwrap_err();

    match &err {
        Error::Step { version, index, .. } => {
            assert_eq!(version, "002");
            assert_eq!(*index, 1);
        }
        other => panic!("expected step error, got {other:?}"),
    }
    assert_eq!(err.catalog_error(), Some(&CatalogError::Disconnected));
    assert!(!catalog.is_locked());

    // Partial state: the first column landed, the second did not
    catalog.reconnect();
    let gold = SchemaObject::column("users", "gold_cups");
    let silver = SchemaObject::column("users", "silver_cups");
    assert!(catalog.contains(&gold));
    assert!(!catalog.contains(&silver));
    let recorded = catalog.applied_migrations().await.unwrap();
    assert_eq!(recorded.len(), 1);

    let report = MigrationRunner::new(&mut catalog)
        .run(&[create_users(), add_cups()])
        .await
        .unwrap();
    let second = &report.migrations[1];
    assert_eq!((second.applied, second.skipped), (1, 1));
    assert!(catalog.contains(&silver));
}

#[tokio::test]
async fn lock_held_by_another_session_blocks_the_run() {
    let mut catalog = MemoryCatalog::new();
    catalog.hold_lock_in_other_session();
    let err = MigrationRunner::new(&mut catalog)
        .run(&[create_users()])
        .await
        .unwrap_err();
    assert_eq!(err.catalog_error(), Some(&CatalogError::LockHeld));
    assert!(!catalog.contains(&SchemaObject::table("users")));

    catalog.release_other_session_lock();
    MigrationRunner::new(&mut catalog)
        .run(&[create_users()])
        .await
        .unwrap();
    assert!(catalog.contains(&SchemaObject::table("users")));
}

#[tokio::test]
async fn run_nests_inside_a_lock_the_session_holds() {
    let mut catalog = MemoryCatalog::new();
    catalog.lock().await.unwrap();
    MigrationRunner::new(&mut catalog)
        .run(&[create_users()])
        .await
        .unwrap();
    assert!(catalog.is_locked());

    catalog.unlock().await.unwrap();
    assert!(!catalog.is_locked());
}

#[tokio::test]
async fn tightening_check_over_bad_rows_is_a_step_error() {
    let mut catalog = MemoryCatalog::new();
    MigrationRunner::new(&mut catalog)
        .run(&[create_users()])
        .await
        .unwrap();
    catalog
        .insert("users", [("id", Value::Int(1)), ("email", Value::text(""))])
        .unwrap();

    let check = ConstraintDef::check(
        "users_email_check",
        Expr::column("email").ne(Expr::text("")),
    );
    let tighten = Migration::new("002", "email_not_blank")
        .step(Ddl::add_constraint("users", check));
    let err = MigrationRunner::new(&mut catalog)
        .run(&[create_users(), tighten])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Step { index: 0, .. }));
    assert_eq!(
        err.catalog_error(),
        Some(&CatalogError::CheckViolation {
            table: "users".into(),
            constraint: "users_email_check".into(),
        })
    );
}

#[tokio::test]
async fn verification_mismatch_is_reported_not_fatal() {
    let mut catalog = MemoryCatalog::new();
    let gone = Verification::absent(SchemaObject::table("users"));
    let report = MigrationRunner::new(&mut catalog)
        .run(&[create_users().verify(gone)])
        .await
        .unwrap();
    let mismatches: Vec<_> = report.mismatches().collect();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].description, "table users is gone");
}

#[tokio::test]
async fn status_counts_pending_steps_and_drift() {
    let mut catalog = MemoryCatalog::new();
    let status = MigrationRunner::new(&mut catalog)
        .status(&[create_users(), add_cups()])
        .await
        .unwrap();
    assert_eq!(status[0].pending_steps, 1);
    assert_eq!(status[1].pending_steps, 2);
    assert!(status.iter().all(|s| s.recorded.is_none()));

    MigrationRunner::new(&mut catalog)
        .run(&[create_users(), add_cups()])
        .await
        .unwrap();
    let nullable = Verification::nullable("users", "gold_cups", true);
    let status = MigrationRunner::new(&mut catalog)
        .status(&[create_users(), add_cups().verify(nullable)])
        .await
        .unwrap();
    assert!(status.iter().all(|s| !s.is_pending()));
    assert!(!status[0].checksum_drift);
    assert!(status[1].checksum_drift);
}

#[tokio::test]
async fn verify_runs_without_mutating() {
    let mut catalog = MemoryCatalog::new();
    let reports = MigrationRunner::new(&mut catalog)
        .verify(&[create_users(), add_cups()])
        .await
        .unwrap();
    assert!(reports.iter().all(|r| r.results.iter().all(|v| !v.passed)));
    assert_eq!(catalog.executed(), 0);
}

#[tokio::test]
async fn revert_to_a_version_undoes_newer_migrations() {
    let mut expected = MemoryCatalog::new();
    MigrationRunner::new(&mut expected)
        .run(&[create_users()])
        .await
        .unwrap();

    let mut catalog = MemoryCatalog::new();
    let migrations = [create_users(), add_cups()];
    MigrationRunner::new(&mut catalog)
        .run(&migrations)
        .await
        .unwrap();
    let report = MigrationRunner::new(&mut catalog)
        .revert(&migrations, Some("001"))
        .await
        .unwrap();

    assert_eq!(report.migrations.len(), 1);
    assert_eq!(report.migrations[0].version, "002");
    assert_eq!(report.applied_steps(), 2);
    assert_eq!(catalog.schema(), expected.schema());
    let ledger = catalog.applied_migrations().await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].version, "001");
    assert!(!catalog.is_locked());
}

#[tokio::test]
async fn revert_everything_then_again_is_a_noop() {
    let mut catalog = MemoryCatalog::new();
    let migrations = [create_users(), add_cups()];
    MigrationRunner::new(&mut catalog)
        .with_options(without_ledger())
        .run(&migrations)
        .await
        .unwrap();

    let report = MigrationRunner::new(&mut catalog)
        .with_options(without_ledger())
        .revert(&migrations, None)
        .await
        .unwrap();
    let versions: Vec<_> = report
        .migrations
        .iter()
        .map(|m| m.version.as_str())
        .collect();
    assert_eq!(versions, ["002", "001"]);
    assert!(catalog.schema().tables.is_empty());

    let again = MigrationRunner::new(&mut catalog)
        .with_options(without_ledger())
        .revert(&migrations, None)
        .await
        .unwrap();
    assert_eq!(again.applied_steps(), 0);
}

#[tokio::test]
async fn revert_leaves_unrecorded_migrations_alone() {
    let mut catalog = MemoryCatalog::new();
    MigrationRunner::new(&mut catalog)
        .run(&[create_users()])
        .await
        .unwrap();

    let report = MigrationRunner::new(&mut catalog)
        .revert(&[create_users(), add_cups()], None)
        .await
        .unwrap();
    assert_eq!(report.migrations.len(), 1);
    assert_eq!(report.migrations[0].version, "001");
    assert!(!catalog.contains(&SchemaObject::table("users")));
    assert!(catalog.applied_migrations().await.unwrap().is_empty());
}

#[tokio::test]
async fn irreversible_migration_is_refused_up_front() {
    let mut catalog = MemoryCatalog::new();
    let one_way = Migration {
        down_steps: Vec::new(),
        ..add_cups()
    };
    let migrations = [create_users(), one_way];
    MigrationRunner::new(&mut catalog)
        .run(&migrations)
        .await
        .unwrap();
    let executed = catalog.executed();

    let err = MigrationRunner::new(&mut catalog)
        .revert(&migrations, None)
        .await
        .unwrap_err();
    match &err {
        Error::Irreversible { version } => assert_eq!(version, "002"),
        other => panic!("expected irreversible error, got {other:?}"),
    }
    assert_eq!(catalog.executed(), executed);
    assert!(!catalog.is_locked());
}

#[tokio::test]
async fn revert_to_an_unknown_version_is_rejected() {
    let mut catalog = MemoryCatalog::new();
    let err = MigrationRunner::new(&mut catalog)
        .revert(&[create_users(), add_cups()], Some("999"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownVersion { .. }));
    assert_eq!(catalog.executed(), 0);
}
