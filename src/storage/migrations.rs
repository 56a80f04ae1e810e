// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Versioned forward migrations for the invoicing tables.
//!
//! Migrations are hand-authored lists of [`SchemaOp`]s compiled into the
//! binary. Applied versions are recorded in `schema_migrations` together
//! with the SHA-256 of their definition, so an edited migration is caught
//! the next time the database is opened.
//!
//! ## Built-in History
//!
//! | Version | Name | Change |
//! |---------|------|--------|
//! | 1 | `initial` | fiscal entities, users (+ email index), registries, service contracts |
//! | 2 | `contract_invoicing_terms` | rename `invoice_currency` → `invoicing_currency`, add `invoicing_description` |
//! | 3 | `time_invoices` | time invoices |

use std::time::Instant;

use chrono::{DateTime, Utc};
use redb::{ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::database::{DbError, DbResult, InvoiceDatabase, SCHEMA_MIGRATIONS};

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Storage(#[from] DbError),

    #[error(
        "migration {version} ({name}) was modified after being applied: \
         stored checksum {stored}, current checksum {current}"
    )]
    ChecksumMismatch {
        version: u32,
        name: String,
        stored: String,
        current: String,
    },

    #[error("database has migration {version} ({name}) applied, which this build does not know")]
    UnknownVersion { version: u32, name: String },
}

impl From<redb::StorageError> for MigrationError {
    fn from(e: redb::StorageError) -> Self {
        MigrationError::Storage(e.into())
    }
}

impl From<redb::TableError> for MigrationError {
    fn from(e: redb::TableError) -> Self {
        MigrationError::Storage(e.into())
    }
}

impl From<redb::CommitError> for MigrationError {
    fn from(e: redb::CommitError) -> Self {
        MigrationError::Storage(e.into())
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(e: serde_json::Error) -> Self {
        MigrationError::Storage(e.into())
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;

// =============================================================================
// Definitions
// =============================================================================

/// One schema change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SchemaOp {
    /// Create an `id → JSON row` table.
    CreateTable { table: &'static str },
    /// Create a `key → id` unique index table.
    CreateIndex { table: &'static str },
    /// Add a field to every row that lacks it.
    AddField {
        table: &'static str,
        field: &'static str,
        default: Value,
    },
    RenameField {
        table: &'static str,
        from: &'static str,
        to: &'static str,
    },
    RemoveField {
        table: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub operations: Vec<SchemaOp>,
}

impl Migration {
    /// Hex SHA-256 of the canonical JSON definition.
    pub fn checksum(&self) -> MigrationResult<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(format!("{:x}", Sha256::digest(&canonical)))
    }
}

/// Row of `schema_migrations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub version: u32,
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMigration {
    pub version: u32,
    pub name: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationStatus {
    pub applied: Vec<MigrationRecord>,
    pub pending: Vec<PendingMigration>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

// =============================================================================
// Applying Operations
// =============================================================================

fn rows(name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(name)
}

/// Rewrite every JSON row of `table` in place.
fn rewrite_rows(
    txn: &WriteTransaction,
    table: &'static str,
    edit: impl Fn(&mut Map<String, Value>),
) -> DbResult<usize> {
    let mut handle = txn.open_table(rows(table))?;

    let mut existing = Vec::new();
    for entry in handle.iter()? {
        let (key, value) = entry?;
        existing.push((key.value(), value.value().to_vec()));
    }

    for (id, bytes) in &existing {
        let mut row: Value = serde_json::from_slice(bytes)?;
        let object = row.as_object_mut().ok_or_else(|| DbError::Corrupt {
            kind: table,
            id: *id,
            reason: "row is not a JSON object".to_string(),
        })?;
        edit(object);
        let json = serde_json::to_vec(&row)?;
        handle.insert(*id, json.as_slice())?;
    }
    Ok(existing.len())
}

fn apply(txn: &WriteTransaction, op: &SchemaOp) -> DbResult<()> {
    match op {
        SchemaOp::CreateTable { table } => {
            txn.open_table(rows(table))?;
        }
        SchemaOp::CreateIndex { table } => {
            txn.open_table(TableDefinition::<&str, u64>::new(*table))?;
        }
        SchemaOp::AddField {
            table,
            field,
            default,
        } => {
            rewrite_rows(txn, *table, |row| {
                row.entry(field.to_string())
                    .or_insert_with(|| default.clone());
            })?;
        }
        SchemaOp::RenameField { table, from, to } => {
            rewrite_rows(txn, *table, |row| {
                if let Some(value) = row.remove(*from) {
                    row.insert(to.to_string(), value);
                }
            })?;
        }
        SchemaOp::RemoveField { table, field } => {
            rewrite_rows(txn, *table, |row| {
                row.remove(*field);
            })?;
        }
    }
    Ok(())
}

// =============================================================================
// Migrator
// =============================================================================

/// Applies a fixed, ordered set of migrations to an [`InvoiceDatabase`].
#[derive(Debug, Clone)]
pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    pub fn new(mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self { migrations }
    }

    /// The migration history shipped with this build.
    pub fn builtin() -> Self {
        Self::new(vec![
            Migration {
                version: 1,
                name: "initial",
                operations: vec![
                    SchemaOp::CreateTable {
                        table: "fiscal_entities",
                    },
                    SchemaOp::CreateTable { table: "users" },
                    SchemaOp::CreateIndex {
                        table: "user_emails",
                    },
                    SchemaOp::CreateTable {
                        table: "registries",
                    },
                    SchemaOp::CreateTable {
                        table: "service_contracts",
                    },
                ],
            },
            Migration {
                version: 2,
                name: "contract_invoicing_terms",
                operations: vec![
                    SchemaOp::RenameField {
                        table: "service_contracts",
                        from: "invoice_currency",
                        to: "invoicing_currency",
                    },
                    SchemaOp::AddField {
                        table: "service_contracts",
                        field: "invoicing_description",
                        default: Value::String(String::new()),
                    },
                ],
            },
            Migration {
                version: 3,
                name: "time_invoices",
                operations: vec![SchemaOp::CreateTable {
                    table: "time_invoices",
                }],
            },
        ])
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    fn applied_records(db: &InvoiceDatabase) -> MigrationResult<Vec<MigrationRecord>> {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SCHEMA_MIGRATIONS)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    /// Compare the recorded history with this migrator's.
    ///
    /// Fails on checksum drift or on a recorded version this build lacks.
    pub fn status(&self, db: &InvoiceDatabase) -> MigrationResult<MigrationStatus> {
        let recorded = Self::applied_records(db)?;

        if let Some(unknown) = recorded
            .iter()
            .find(|r| !self.migrations.iter().any(|m| m.version == r.version))
        {
            return Err(MigrationError::UnknownVersion {
                version: unknown.version,
                name: unknown.name.clone(),
            });
        }

        let mut status = MigrationStatus::default();
        for migration in &self.migrations {
            let checksum = migration.checksum()?;
            match recorded.iter().find(|r| r.version == migration.version) {
                Some(record) if record.checksum != checksum => {
                    return Err(MigrationError::ChecksumMismatch {
                        version: migration.version,
                        name: migration.name.to_string(),
                        stored: record.checksum.clone(),
                        current: checksum,
                    });
                }
                Some(record) => status.applied.push(record.clone()),
                None => status.pending.push(PendingMigration {
                    version: migration.version,
                    name: migration.name.to_string(),
                    checksum,
                }),
            }
        }
        Ok(status)
    }

    /// Apply every pending migration in version order.
    ///
    /// Each migration commits together with its record. Returns the records
    /// written by this call (empty when already up to date).
    pub fn up(&self, db: &InvoiceDatabase) -> MigrationResult<Vec<MigrationRecord>> {
        let status = self.status(db)?;
        let mut applied = Vec::with_capacity(status.pending.len());

        for pending in &status.pending {
            let Some(migration) = self.migrations.iter().find(|m| m.version == pending.version)
            else {
                continue;
            };
            let start = Instant::now();

            let write_txn = db.begin_write()?;
            for op in &migration.operations {
                apply(&write_txn, op)?;
            }
            let record = MigrationRecord {
                version: migration.version,
                name: migration.name.to_string(),
                checksum: pending.checksum.clone(),
                applied_at: Utc::now(),
                execution_time_ms: start.elapsed().as_millis() as u64,
            };
            {
                let mut table = write_txn.open_table(SCHEMA_MIGRATIONS)?;
                let json = serde_json::to_vec(&record)?;
                table.insert(record.version, json.as_slice())?;
            }
            write_txn.commit()?;

            tracing::info!(
                version = record.version,
                name = %record.name,
                execution_time_ms = record.execution_time_ms,
                "Migration applied"
            );
            applied.push(record);
        }
        Ok(applied)
    }
}
