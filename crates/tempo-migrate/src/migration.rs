use crate::{Ddl, Step, Verification};

/// A versioned, named, ordered list of steps plus post-conditions.
///
/// Versions compare as strings; the `YYYYMMDDHHMMSS` timestamps used by the
/// migration set sort chronologically that way.
///
/// `down_steps` undo `steps` and run in the order they were added. A
/// migration without them cannot be reverted.
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    pub version: String,
    pub name: String,
    pub steps: Vec<Step>,
    pub verifications: Vec<Verification>,
    pub down_steps: Vec<Step>,
}

impl Migration {
    pub fn new(version: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            name: name.into(),
            steps: Vec::new(),
            verifications: Vec::new(),
            down_steps: Vec::new(),
        }
    }

    /// Append a step guarded by its natural precondition.
    pub fn step(mut self, ddl: Ddl) -> Self {
        self.steps.push(Step::new(ddl));
        self
    }

    /// Append a bare statement with no guard.
    pub fn unguarded(mut self, ddl: Ddl) -> Self {
        self.steps.push(Step::unguarded(ddl));
        self
    }

    pub fn verify(mut self, verification: Verification) -> Self {
        self.verifications.push(verification);
        self
    }

    /// Append a guarded revert step.
    pub fn down(mut self, ddl: Ddl) -> Self {
        self.down_steps.push(Step::new(ddl));
        self
    }

    pub fn is_reversible(&self) -> bool {
        !self.down_steps.is_empty()
    }

    /// `{version}-{name}`
    pub fn id(&self) -> String {
        format!("{}-{}", self.version, self.name)
    }

    /// Standalone, re-runnable SQL for this migration.
    pub fn to_script(&self) -> String {
        let mut out = format!("-- Migration: {}\n", self.id());
        for step in &self.steps {
            out.push('\n');
            out.push_str(&step.to_script());
            out.push('\n');
        }
        for verification in &self.verifications {
            out.push('\n');
            out.push_str(&verification.to_sql());
            out.push('\n');
        }
        out
    }

    /// Standalone, re-runnable SQL undoing this migration.
    pub fn to_down_script(&self) -> String {
        let mut out = format!("-- Revert: {}\n", self.id());
        for step in &self.down_steps {
            out.push('\n');
            out.push_str(&step.to_script());
            out.push('\n');
        }
        out
    }

    /// Fingerprint of the rendered script, stored in the ledger. Revert
    /// steps are not part of it.
    pub fn checksum(&self) -> String {
        tempo_sql::fingerprint(&self.to_script())
    }
}
