//! Migration sequencing.
//!
//! Migrations run strictly in version order, steps strictly in list order, one
//! statement at a time. No transaction spans steps: if a step fails the run
//! stops, and running again from the top resumes where it left off because
//! every completed step is then skipped by its guard.
//!
//! Reverting walks the same list backwards through each migration's down
//! steps, which are guarded the same way.

use crate::{
    AppliedMigration, Catalog, Error, Migration, Result, Step, StepOutcome, VerificationResult,
};
use std::collections::HashMap;
use tracing::Instrument;

/// Knobs for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Hold the catalog's migration lock for the whole run.
    pub lock: bool,
    /// Read and write the applied-migrations ledger. Migrations recorded with
    /// an unchanged checksum are skipped without probing.
    pub ledger: bool,
    /// Run each migration's verifications after its steps.
    pub verify: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            lock: true,
            ledger: true,
            verify: true,
        }
    }
}

/// What happened to one migration during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReport {
    pub version: String,
    pub name: String,
    /// Steps that executed.
    pub applied: usize,
    /// Steps whose guard was already satisfied.
    pub skipped: usize,
    /// Skipped wholesale because the ledger already had it.
    pub already_recorded: bool,
    pub verifications: Vec<VerificationResult>,
}

impl MigrationReport {
    /// Nothing was executed.
    pub fn is_noop(&self) -> bool {
        self.applied == 0
    }
}

/// Result of [`MigrationRunner::run`] and [`MigrationRunner::revert`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub migrations: Vec<MigrationReport>,
}

impl RunReport {
    /// Total number of statements executed.
    pub fn applied_steps(&self) -> usize {
        self.migrations.iter().map(|m| m.applied).sum()
    }

    /// Verifications that did not hold.
    pub fn mismatches(&self) -> impl Iterator<Item = &VerificationResult> {
        self.migrations
            .iter()
            .flat_map(|m| m.verifications.iter())
            .filter(|v| !v.passed)
    }
}

/// Per-migration state as seen by [`MigrationRunner::status`].
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStatus {
    pub version: String,
    pub name: String,
    /// Steps whose guard is currently met, i.e. that would execute now.
    pub pending_steps: usize,
    pub total_steps: usize,
    pub recorded: Option<AppliedMigration>,
    /// The ledger checksum differs from the current script.
    pub checksum_drift: bool,
}

impl MigrationStatus {
    pub fn is_pending(&self) -> bool {
        self.pending_steps > 0
    }
}

/// Verification results for one migration.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyReport {
    pub version: String,
    pub name: String,
    pub results: Vec<VerificationResult>,
}

/// Applies migrations against a catalog.
pub struct MigrationRunner<'c, C: Catalog + ?Sized> {
    catalog: &'c mut C,
    options: RunOptions,
}

impl<'c, C: Catalog + ?Sized> MigrationRunner<'c, C> {
    pub fn new(catalog: &'c mut C) -> Self {
        Self {
            catalog,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// Apply every migration in order.
    ///
    /// The list is validated before anything touches the catalog. The lock,
    /// when enabled, is released whether or not the run succeeded.
    pub async fn run(&mut self, migrations: &[Migration]) -> Result<RunReport> {
        validate_order(migrations)?;

        let span = tracing::info_span!("migrate.run", migrations = migrations.len());
        async {
            if self.options.lock {
                self.catalog.lock().await?;
            }

            let result = self.run_all(migrations).await;
            let report = self.release_lock(result).await?;
            tracing::info!(
                migrations = report.migrations.len(),
                statements = report.applied_steps(),
                "migration run complete"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Release the lock taken for an operation. When both fail, the
    /// operation's own error wins.
    async fn release_lock<T>(&mut self, result: Result<T>) -> Result<T> {
        if self.options.lock {
            if let Err(unlock_err) = self.catalog.unlock().await {
                if result.is_ok() {
                    return Err(unlock_err);
                }
                tracing::warn!(error = %unlock_err, "failed to release migration lock");
            }
        }
        result
    }

    async fn run_all(&mut self, migrations: &[Migration]) -> Result<RunReport> {
        let ledger = self.ledger().await?;
        let mut report = RunReport::default();

        for migration in migrations {
            let checksum = migration.checksum();
            if let Some(recorded) = ledger.get(&migration.version) {
                if recorded.checksum == checksum {
                    tracing::debug!(version = %migration.version, "already recorded, skipping");
                    report.migrations.push(MigrationReport {
                        version: migration.version.clone(),
                        name: migration.name.clone(),
                        applied: 0,
                        skipped: migration.steps.len(),
                        already_recorded: true,
                        verifications: Vec::new(),
                    });
                    continue;
                }
                tracing::warn!(
                    version = %migration.version,
                    recorded = %recorded.checksum,
                    current = %checksum,
                    "migration changed since it was recorded, re-checking its steps"
                );
            }

            let span = tracing::info_span!(
                "migration",
                version = %migration.version,
                name = %migration.name
            );
            let migration_report = self.apply(migration).instrument(span).await?;

            if self.options.ledger {
                self.catalog
                    .record_migration(&migration.version, &migration.name, &checksum)
                    .await?;
            }
            report.migrations.push(migration_report);
        }

        Ok(report)
    }

    async fn apply(&mut self, migration: &Migration) -> Result<MigrationReport> {
        let (applied, skipped) = self.apply_steps(migration, &migration.steps).await?;

        let verifications = if self.options.verify {
            self.check_all(migration).await?
        } else {
            Vec::new()
        };

        if applied == 0 {
            tracing::info!("up to date");
        } else {
            tracing::info!(applied, skipped, "applied");
        }

        Ok(MigrationReport {
            version: migration.version.clone(),
            name: migration.name.clone(),
            applied,
            skipped,
            already_recorded: false,
            verifications,
        })
    }

    /// Apply `steps` in order, returning `(applied, skipped)`.
    async fn apply_steps(
        &mut self,
        migration: &Migration,
        steps: &[Step],
    ) -> Result<(usize, usize)> {
        let mut applied = 0;
        let mut skipped = 0;

        for (index, step) in steps.iter().enumerate() {
            let span = tracing::debug_span!("step", index, step = %step);
            let outcome = step
                .apply(&mut *self.catalog)
                .instrument(span)
                .await
                .map_err(|source| Error::Step {
                    version: migration.version.clone(),
                    index,
                    step: step.to_string(),
                    source: Box::new(source),
                })?;
            match outcome {
                StepOutcome::Applied => applied += 1,
                StepOutcome::Skipped => skipped += 1,
            }
        }
        Ok((applied, skipped))
    }

    /// Revert migrations newest first, stopping above `target`, or revert
    /// all of them when `target` is `None`.
    ///
    /// Every migration to revert must have down steps; that is checked
    /// before anything touches the catalog. With the ledger on, migrations
    /// that were never recorded are left alone and reverted ones are removed
    /// from it.
    pub async fn revert(
        &mut self,
        migrations: &[Migration],
        target: Option<&str>,
    ) -> Result<RunReport> {
        validate_order(migrations)?;
        let keep = match target {
            Some(version) => {
                let position = migrations
                    .iter()
                    .position(|m| m.version == version)
                    .ok_or_else(|| Error::UnknownVersion {
                        version: version.to_string(),
                    })?;
                position + 1
            }
            None => 0,
        };
        let to_revert = &migrations[keep..];
        if let Some(migration) = to_revert.iter().find(|m| !m.is_reversible()) {
            return Err(Error::Irreversible {
                version: migration.version.clone(),
            });
        }

        let span = tracing::info_span!("migrate.revert", migrations = to_revert.len());
        async {
            if self.options.lock {
                self.catalog.lock().await?;
            }

            let result = self.revert_all(to_revert).await;
            let report = self.release_lock(result).await?;
            tracing::info!(
                migrations = report.migrations.len(),
                statements = report.applied_steps(),
                "revert complete"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn revert_all(&mut self, migrations: &[Migration]) -> Result<RunReport> {
        let ledger = self.ledger().await?;
        let mut report = RunReport::default();

        for migration in migrations.iter().rev() {
            if self.options.ledger && !ledger.contains_key(&migration.version) {
                tracing::debug!(version = %migration.version, "not recorded, nothing to revert");
                continue;
            }

            let span = tracing::info_span!(
                "revert",
                version = %migration.version,
                name = %migration.name
            );
            let (applied, skipped) = self
                .apply_steps(migration, &migration.down_steps)
                .instrument(span)
                .await?;

            if self.options.ledger {
                self.catalog.forget_migration(&migration.version).await?;
            }
            report.migrations.push(MigrationReport {
                version: migration.version.clone(),
                name: migration.name.clone(),
                applied,
                skipped,
                already_recorded: false,
                verifications: Vec::new(),
            });
        }

        Ok(report)
    }

    async fn check_all(&self, migration: &Migration) -> Result<Vec<VerificationResult>> {
        let mut results = Vec::with_capacity(migration.verifications.len());
        for verification in &migration.verifications {
            let result = verification.check(&*self.catalog).await?;
            if !result.passed {
                tracing::warn!(
                    version = %migration.version,
                    check = %result.description,
                    observed = %result.detail,
                    "verification mismatch"
                );
            }
            results.push(result);
        }
        Ok(results)
    }

    async fn ledger(&mut self) -> Result<HashMap<String, AppliedMigration>> {
        if !self.options.ledger {
            return Ok(HashMap::new());
        }
        let applied = self.catalog.applied_migrations().await?;
        Ok(applied
            .into_iter()
            .map(|m| (m.version.clone(), m))
            .collect())
    }

    /// Pending steps and ledger state per migration. Read-only.
    pub async fn status(&mut self, migrations: &[Migration]) -> Result<Vec<MigrationStatus>> {
        validate_order(migrations)?;
        let mut ledger = self.ledger().await?;

        let mut statuses = Vec::with_capacity(migrations.len());
        for migration in migrations {
            let mut pending_steps = 0;
            for step in &migration.steps {
                if step.is_pending(&*self.catalog).await? {
                    pending_steps += 1;
                }
            }
            let recorded = ledger.remove(&migration.version);
            let checksum_drift = recorded
                .as_ref()
                .is_some_and(|r| r.checksum != migration.checksum());
            statuses.push(MigrationStatus {
                version: migration.version.clone(),
                name: migration.name.clone(),
                pending_steps,
                total_steps: migration.steps.len(),
                recorded,
                checksum_drift,
            });
        }
        Ok(statuses)
    }

    /// Run every migration's verifications without mutating anything.
    pub async fn verify(&self, migrations: &[Migration]) -> Result<Vec<VerifyReport>> {
        let mut reports = Vec::with_capacity(migrations.len());
        for migration in migrations {
            reports.push(VerifyReport {
                version: migration.version.clone(),
                name: migration.name.clone(),
                results: self.check_all(migration).await?,
            });
        }
        Ok(reports)
    }
}

/// Versions must be unique and strictly increasing.
pub fn validate_order(migrations: &[Migration]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for migration in migrations {
        if !seen.insert(migration.version.as_str()) {
            return Err(Error::DuplicateVersion {
                version: migration.version.clone(),
            });
        }
    }
    for pair in migrations.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(Error::OutOfOrder {
                previous: pair[0].version.clone(),
                version: pair[1].version.clone(),
            });
        }
    }
    Ok(())
}

/// Render every migration as one re-runnable SQL script.
pub fn render_script(migrations: &[Migration]) -> String {
    migrations
        .iter()
        .map(Migration::to_script)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the revert of every migration, newest first, as one SQL script.
/// Migrations without down steps are left out.
pub fn render_down_script(migrations: &[Migration]) -> String {
    migrations
        .iter()
        .rev()
        .filter(|m| m.is_reversible())
        .map(Migration::to_down_script)
        .collect::<Vec<_>>()
        .join("\n")
}
