//! In-memory schema catalog.
//!
//! Holds an explicit schema state (tables, columns, constraints, indexes) and
//! applies [`Ddl`] against it with the same preconditions Postgres enforces.
//! Rows can be inserted so CHECK, NOT NULL, UNIQUE, and FOREIGN KEY
//! constraints can be exercised, including when a constraint is added over
//! existing data.
//!
//! Tests use a fresh `MemoryCatalog` per case instead of a shared database.

use crate::{
    AppliedMigration, Catalog, CatalogError, CatalogFuture, ColumnDef, ColumnInfo, ConstraintDef,
    ConstraintKind, Ddl, IndexDef, SchemaObject, TableDef,
};
use chrono::Utc;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tempo_sql::{DefaultExpr, Value};

/// A stored row, column name to value.
pub type Row = IndexMap<String, Value>;

/// Structure of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableState {
    pub columns: IndexMap<String, ColumnDef>,
    pub constraints: IndexMap<String, ConstraintDef>,
}

impl TableState {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.get(name)
    }

    pub fn constraint(&self, name: &str) -> Option<&ConstraintDef> {
        self.constraints.get(name)
    }
}

/// Structure of the whole schema. Comparisons ignore declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaState {
    pub tables: IndexMap<String, TableState>,
    /// Indexes by name; names are unique per schema
    pub indexes: IndexMap<String, IndexDef>,
}

impl SchemaState {
    pub fn table(&self, name: &str) -> Option<&TableState> {
        self.tables.get(name)
    }
}

/// A schema catalog that lives in memory.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    schema: SchemaState,
    rows: HashMap<String, Vec<Row>>,
    sequences: HashMap<(String, String), i64>,
    ledger: Vec<AppliedMigration>,
    lock_depth: usize,
    locked_elsewhere: bool,
    disconnected: bool,
    fail_after: Option<usize>,
    executed: usize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current schema structure.
    pub fn schema(&self) -> &SchemaState {
        &self.schema
    }

    pub fn table(&self, name: &str) -> Option<&TableState> {
        self.schema.table(name)
    }

    /// Rows stored in a table.
    pub fn rows(&self, table: &str) -> &[Row] {
        self.rows.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of DDL statements executed so far.
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Whether this session holds the migration lock.
    pub fn is_locked(&self) -> bool {
        self.lock_depth > 0
    }

    /// Simulate a second session taking the migration lock. Until
    /// [`MemoryCatalog::release_other_session_lock`], `lock` fails with
    /// [`CatalogError::LockHeld`].
    pub fn hold_lock_in_other_session(&mut self) {
        self.locked_elsewhere = true;
    }

    pub fn release_other_session_lock(&mut self) {
        self.locked_elsewhere = false;
    }

    /// Simulate a dropped connection: every operation fails until
    /// [`MemoryCatalog::reconnect`]. Locks held by the session are released.
    pub fn disconnect(&mut self) {
        self.disconnected = true;
        self.lock_depth = 0;
    }

    pub fn reconnect(&mut self) {
        self.disconnected = false;
    }

    /// Drop the connection right before the statement that would follow the
    /// next `statements` successful ones.
    pub fn fail_after(&mut self, statements: usize) {
        self.fail_after = Some(statements);
    }

    fn ensure_connected(&self) -> Result<(), CatalogError> {
        if self.disconnected {
            Err(CatalogError::Disconnected)
        } else {
            Ok(())
        }
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut TableState, CatalogError> {
        self.schema
            .tables
            .get_mut(table)
            .ok_or_else(|| CatalogError::TableNotFound {
                table: table.to_string(),
            })
    }

    fn require_table(&self, table: &str) -> Result<&TableState, CatalogError> {
        self.schema
            .table(table)
            .ok_or_else(|| CatalogError::TableNotFound {
                table: table.to_string(),
            })
    }

    /// Whether an object exists.
    pub fn contains(&self, object: &SchemaObject) -> bool {
        match object {
            SchemaObject::Table { table } => self.schema.tables.contains_key(table),
            SchemaObject::Column { table, column } => self
                .schema
                .table(table)
                .is_some_and(|t| t.columns.contains_key(column)),
            SchemaObject::Constraint { table, name } => self
                .schema
                .table(table)
                .is_some_and(|t| t.constraints.contains_key(name)),
            SchemaObject::Index { table, name } => self
                .schema
                .indexes
                .get(name)
                .is_some_and(|idx| &idx.table == table),
        }
    }

    /// Column metadata in `information_schema` terms.
    pub fn column_info(&self, table: &str, column: &str) -> Option<ColumnInfo> {
        let col = self.schema.table(table)?.column(column)?;
        Some(ColumnInfo {
            name: col.name.clone(),
            data_type: col.pg_type.information_schema_name().to_string(),
            nullable: col.nullable,
            default: col.default.as_ref().map(|d| d.to_string()),
        })
    }

    /// Apply one DDL statement, validating it first. On error nothing changes.
    pub fn apply_ddl(&mut self, ddl: &Ddl) -> Result<(), CatalogError> {
        self.ensure_connected()?;
        if let Some(remaining) = self.fail_after {
            if remaining == 0 {
                self.fail_after = None;
                self.disconnect();
                return Err(CatalogError::Disconnected);
            }
            self.fail_after = Some(remaining - 1);
        }

        match ddl {
            Ddl::CreateTable(t) => self.create_table(t)?,
            Ddl::DropTable(name) => self.drop_table(name)?,
            Ddl::AddColumn { table, column } => self.add_column(table, column)?,
            Ddl::DropColumn { table, column } => self.drop_column(table, column)?,
            Ddl::DropNotNull { table, column } => {
                let t = self.table_mut(table)?;
                let col = t
                    .columns
                    .get_mut(column)
                    .ok_or_else(|| CatalogError::ColumnNotFound {
                        table: table.clone(),
                        column: column.clone(),
                    })?;
                col.nullable = true;
            }
            Ddl::SetNotNull { table, column } => self.set_not_null(table, column)?,
            Ddl::AddConstraint { table, constraint } => self.add_constraint(table, constraint)?,
            Ddl::DropConstraint { table, name } => {
                let t = self.table_mut(table)?;
                if t.constraints.shift_remove(name).is_none() {
                    return Err(CatalogError::ConstraintNotFound {
                        table: table.clone(),
                        name: name.clone(),
                    });
                }
            }
            Ddl::CreateIndex(idx) => self.create_index(idx)?,
            Ddl::DropIndex { name, .. } => {
                if self.schema.indexes.shift_remove(name).is_none() {
                    return Err(CatalogError::IndexNotFound { name: name.clone() });
                }
            }
        }

        self.executed += 1;
        Ok(())
    }

    fn create_table(&mut self, def: &TableDef) -> Result<(), CatalogError> {
        if self.schema.tables.contains_key(&def.name) {
            return Err(CatalogError::TableAlreadyExists {
                table: def.name.clone(),
            });
        }

        let mut table = TableState {
            columns: IndexMap::new(),
            constraints: IndexMap::new(),
        };
        for col in &def.columns {
            if table.columns.insert(col.name.clone(), col.clone()).is_some() {
                return Err(CatalogError::ColumnAlreadyExists {
                    table: def.name.clone(),
                    column: col.name.clone(),
                });
            }
        }

        let pk: Vec<String> = def
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        if !pk.is_empty() {
            table.constraints.insert(
                def.pkey_name(),
                ConstraintDef {
                    name: def.pkey_name(),
                    kind: ConstraintKind::PrimaryKey(pk),
                },
            );
        }

        for constraint in &def.constraints {
            self.validate_constraint(&def.name, &table, constraint)?;
            if table
                .constraints
                .insert(constraint.name.clone(), constraint.clone())
                .is_some()
            {
                return Err(CatalogError::ConstraintAlreadyExists {
                    table: def.name.clone(),
                    name: constraint.name.clone(),
                });
            }
        }

        self.schema.tables.insert(def.name.clone(), table);
        self.rows.insert(def.name.clone(), Vec::new());
        Ok(())
    }

    fn drop_table(&mut self, name: &str) -> Result<(), CatalogError> {
        self.require_table(name)?;
        for (other_name, other) in &self.schema.tables {
            if other_name == name {
                continue;
            }
            for constraint in other.constraints.values() {
                if let ConstraintKind::ForeignKey(fk) = &constraint.kind {
                    if fk.references_table == name {
                        return Err(CatalogError::DependentObjects {
                            object: format!("table {}", name),
                            dependent: format!(
                                "constraint {} on table {}",
                                constraint.name, other_name
                            ),
                        });
                    }
                }
            }
        }

        self.schema.tables.shift_remove(name);
        self.schema.indexes.retain(|_, idx| idx.table != name);
        self.rows.remove(name);
        self.sequences.retain(|(table, _), _| table != name);
        Ok(())
    }

    fn add_column(&mut self, table: &str, column: &ColumnDef) -> Result<(), CatalogError> {
        let t = self.require_table(table)?;
        if t.columns.contains_key(&column.name) {
            return Err(CatalogError::ColumnAlreadyExists {
                table: table.to_string(),
                column: column.name.clone(),
            });
        }

        let existing = self.rows.get(table).map(Vec::len).unwrap_or(0);
        let mut values = Vec::with_capacity(existing);
        for _ in 0..existing {
            values.push(self.fill_value(table, column));
        }
        if !column.nullable && values.iter().any(Value::is_null) {
            return Err(CatalogError::NotNullViolation {
                table: table.to_string(),
                column: column.name.clone(),
            });
        }

        if let Some(rows) = self.rows.get_mut(table) {
            for (row, value) in rows.iter_mut().zip(values) {
                row.insert(column.name.clone(), value);
            }
        }
        self.table_mut(table)?
            .columns
            .insert(column.name.clone(), column.clone());
        Ok(())
    }

    fn drop_column(&mut self, table: &str, column: &str) -> Result<(), CatalogError> {
        let t = self.require_table(table)?;
        if !t.columns.contains_key(column) {
            return Err(CatalogError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            });
        }

        // Foreign keys elsewhere pointing at this column block the drop
        for (other_name, other) in &self.schema.tables {
            for constraint in other.constraints.values() {
                if let ConstraintKind::ForeignKey(fk) = &constraint.kind {
                    if fk.references_table == table
                        && fk.references_columns.iter().any(|c| c == column)
                    {
                        return Err(CatalogError::DependentObjects {
                            object: format!("column {}.{}", table, column),
                            dependent: format!(
                                "constraint {} on table {}",
                                constraint.name, other_name
                            ),
                        });
                    }
                }
            }
        }

        let t = self.table_mut(table)?;
        t.columns.shift_remove(column);
        t.constraints.retain(|_, c| !c.columns().contains(&column));
        self.schema
            .indexes
            .retain(|_, idx| !(idx.table == table && idx.columns.iter().any(|c| c == column)));
        if let Some(rows) = self.rows.get_mut(table) {
            for row in rows {
                row.shift_remove(column);
            }
        }
        Ok(())
    }

    fn set_not_null(&mut self, table: &str, column: &str) -> Result<(), CatalogError> {
        let t = self.require_table(table)?;
        if !t.columns.contains_key(column) {
            return Err(CatalogError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
        let has_null = self
            .rows(table)
            .iter()
            .any(|row| row.get(column).is_none_or(Value::is_null));
        if has_null {
            return Err(CatalogError::NotNullViolation {
                table: table.to_string(),
                column: column.to_string(),
            });
        }

        if let Some(col) = self.table_mut(table)?.columns.get_mut(column) {
            col.nullable = false;
        }
        Ok(())
    }

    fn add_constraint(
        &mut self,
        table: &str,
        constraint: &ConstraintDef,
    ) -> Result<(), CatalogError> {
        let t = self.require_table(table)?;
        if t.constraints.contains_key(&constraint.name) {
            return Err(CatalogError::ConstraintAlreadyExists {
                table: table.to_string(),
                name: constraint.name.clone(),
            });
        }
        self.validate_constraint(table, t, constraint)?;

        // Existing rows must satisfy the new constraint
        let rows = self.rows(table);
        for (i, row) in rows.iter().enumerate() {
            self.check_row(table, constraint, row, &rows[..i])?;
        }

        self.table_mut(table)?
            .constraints
            .insert(constraint.name.clone(), constraint.clone());
        Ok(())
    }

    fn create_index(&mut self, idx: &IndexDef) -> Result<(), CatalogError> {
        let t = self.require_table(&idx.table)?;
        if self.schema.indexes.contains_key(&idx.name) {
            return Err(CatalogError::IndexAlreadyExists {
                name: idx.name.clone(),
            });
        }
        for column in &idx.columns {
            if !t.columns.contains_key(column) {
                return Err(CatalogError::ColumnNotFound {
                    table: idx.table.clone(),
                    column: column.clone(),
                });
            }
        }
        self.schema.indexes.insert(idx.name.clone(), idx.clone());
        Ok(())
    }

    /// Referenced columns exist, and foreign key targets exist.
    fn validate_constraint(
        &self,
        table: &str,
        state: &TableState,
        constraint: &ConstraintDef,
    ) -> Result<(), CatalogError> {
        for column in constraint.columns() {
            if !state.columns.contains_key(column) {
                return Err(CatalogError::ColumnNotFound {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
        }

        if let ConstraintKind::ForeignKey(fk) = &constraint.kind {
            // Self-references resolve against the table being defined
            let target = if fk.references_table == table {
                Some(state)
            } else {
                self.schema.table(&fk.references_table)
            };
            let Some(target) = target else {
                return Err(CatalogError::ForeignKeyTargetNotFound {
                    table: table.to_string(),
                    target: fk.references_table.clone(),
                });
            };
            for column in &fk.references_columns {
                if !target.columns.contains_key(column) {
                    return Err(CatalogError::ColumnNotFound {
                        table: fk.references_table.clone(),
                        column: column.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Check one row against one constraint. `others` are the rows already
    /// stored (or preceding it, when validating existing data).
    fn check_row(
        &self,
        table: &str,
        constraint: &ConstraintDef,
        row: &Row,
        others: &[Row],
    ) -> Result<(), CatalogError> {
        let lookup = |name: &str| row.get(name).cloned().unwrap_or(Value::Null);
        match &constraint.kind {
            ConstraintKind::Check(expr) => {
                if !expr.accepts(&lookup) {
                    return Err(CatalogError::CheckViolation {
                        table: table.to_string(),
                        constraint: constraint.name.clone(),
                    });
                }
            }
            ConstraintKind::PrimaryKey(cols) | ConstraintKind::Unique(cols) => {
                let key: Vec<Value> = cols.iter().map(|c| lookup(c.as_str())).collect();
                // NULLs are distinct for UNIQUE
                if key.iter().any(Value::is_null) {
                    return Ok(());
                }
                let duplicate = others.iter().any(|other| {
                    cols.iter()
                        .zip(&key)
                        .all(|(c, v)| other.get(c.as_str()) == Some(v))
                });
                if duplicate {
                    return Err(CatalogError::UniqueViolation {
                        table: table.to_string(),
                        constraint: constraint.name.clone(),
                    });
                }
            }
            ConstraintKind::ForeignKey(fk) => {
                let key: Vec<Value> = fk.columns.iter().map(|c| lookup(c.as_str())).collect();
                if key.iter().any(Value::is_null) {
                    return Ok(());
                }
                let targets = if fk.references_table == table {
                    others
                } else {
                    self.rows(&fk.references_table)
                };
                let found = targets.iter().any(|target| {
                    fk.references_columns
                        .iter()
                        .zip(&key)
                        .all(|(c, v)| target.get(c.as_str()) == Some(v))
                });
                if !found {
                    return Err(CatalogError::ForeignKeyViolation {
                        table: table.to_string(),
                        constraint: constraint.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Value a column takes when a row does not provide one.
    fn fill_value(&mut self, table: &str, column: &ColumnDef) -> Value {
        if column.pg_type.is_serial() {
            let next = self
                .sequences
                .entry((table.to_string(), column.name.clone()))
                .or_insert(0);
            *next += 1;
            return Value::Int(*next);
        }
        match &column.default {
            Some(DefaultExpr::Value(v)) => v.clone(),
            Some(DefaultExpr::Now) => {
                Value::Text(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string())
            }
            None => Value::Null,
        }
    }

    /// Insert a row, enforcing types and every constraint on the table.
    ///
    /// Returns the stored row, including defaults and serial values.
    pub fn insert<'v>(
        &mut self,
        table: &str,
        values: impl IntoIterator<Item = (&'v str, Value)>,
    ) -> Result<Row, CatalogError> {
        self.ensure_connected()?;
        let provided: HashMap<&str, Value> = values.into_iter().collect();
        let state = self.require_table(table)?.clone();

        let known: HashSet<&str> = state.columns.keys().map(String::as_str).collect();
        if let Some(unknown) = provided.keys().find(|c| !known.contains(*c)) {
            return Err(CatalogError::ColumnNotFound {
                table: table.to_string(),
                column: unknown.to_string(),
            });
        }

        let mut row = Row::new();
        for col in state.columns.values() {
            let value = match provided.get(col.name.as_str()) {
                Some(v) => v.clone(),
                None => self.fill_value(table, col),
            };
            if !col.pg_type.accepts(&value) {
                return Err(CatalogError::TypeMismatch {
                    table: table.to_string(),
                    column: col.name.clone(),
                    pg_type: col.pg_type.to_string(),
                });
            }
            if !col.nullable && value.is_null() {
                return Err(CatalogError::NotNullViolation {
                    table: table.to_string(),
                    column: col.name.clone(),
                });
            }
            row.insert(col.name.clone(), value);
        }

        let existing = self.rows(table);
        for constraint in state.constraints.values() {
            self.check_row(table, constraint, &row, existing)?;
        }

        self.rows
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }
}

impl Catalog for MemoryCatalog {
    fn exists<'a>(&'a self, object: &'a SchemaObject) -> CatalogFuture<'a, bool> {
        let result: crate::Result<bool> = self
            .ensure_connected()
            .map(|()| self.contains(object))
            .map_err(Into::into);
        Box::pin(std::future::ready(result))
    }

    fn describe_column<'a>(
        &'a self,
        table: &'a str,
        column: &'a str,
    ) -> CatalogFuture<'a, Option<ColumnInfo>> {
        let result: crate::Result<Option<ColumnInfo>> = self
            .ensure_connected()
            .map(|()| self.column_info(table, column))
            .map_err(Into::into);
        Box::pin(std::future::ready(result))
    }

    fn execute<'a>(&'a mut self, ddl: &'a Ddl) -> CatalogFuture<'a, ()> {
        let span = tracing::debug_span!("db.execute", sql = %ddl.to_sql());
        let result: crate::Result<()> = span.in_scope(|| self.apply_ddl(ddl)).map_err(Into::into);
        Box::pin(std::future::ready(result))
    }

    fn lock(&mut self) -> CatalogFuture<'_, ()> {
        // Re-entrant within the session, like pg_try_advisory_lock
        let result = self.ensure_connected().and_then(|()| {
            if self.locked_elsewhere {
                Err(CatalogError::LockHeld)
            } else {
                self.lock_depth += 1;
                Ok(())
            }
        });
        Box::pin(std::future::ready(result.map_err(crate::Error::from)))
    }

    fn unlock(&mut self) -> CatalogFuture<'_, ()> {
        // Unlocking works even after a dropped connection; the session is gone
        self.lock_depth = self.lock_depth.saturating_sub(1);
        Box::pin(std::future::ready(Ok(())))
    }

    fn applied_migrations(&mut self) -> CatalogFuture<'_, Vec<AppliedMigration>> {
        let result = self.ensure_connected().map(|()| {
            let mut ledger = self.ledger.clone();
            ledger.sort_by(|a, b| a.version.cmp(&b.version));
            ledger
        });
        Box::pin(std::future::ready(result.map_err(crate::Error::from)))
    }

    fn record_migration<'a>(
        &'a mut self,
        version: &'a str,
        name: &'a str,
        checksum: &'a str,
    ) -> CatalogFuture<'a, ()> {
        let result = self.ensure_connected().map(|()| {
            match self.ledger.iter_mut().find(|m| m.version == version) {
                Some(existing) => {
                    existing.name = name.to_string();
                    existing.checksum = checksum.to_string();
                }
                None => self.ledger.push(AppliedMigration {
                    version: version.to_string(),
                    name: name.to_string(),
                    checksum: checksum.to_string(),
                    applied_at: Utc::now(),
                }),
            }
        });
        Box::pin(std::future::ready(result.map_err(crate::Error::from)))
    }

    fn forget_migration<'a>(&'a mut self, version: &'a str) -> CatalogFuture<'a, ()> {
        let result = self
            .ensure_connected()
            .map(|()| self.ledger.retain(|m| m.version != version));
        Box::pin(std::future::ready(result.map_err(crate::Error::from)))
    }
}
