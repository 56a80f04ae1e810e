// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded invoicing database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `fiscal_entities`, `users`, `registries`, `service_contracts`,
//!   `time_invoices`: row id → JSON-encoded row
//! - `user_emails`: normalised email → user id (unique index)
//! - `sequences`: table name → last assigned row id
//! - `schema_migrations`: version → JSON-encoded [`MigrationRecord`]
//!
//! Entity tables are created by the migrations in
//! [`super::migrations`]; only the bookkeeping tables exist after
//! [`InvoiceDatabase::open`].
//!
//! [`MigrationRecord`]: super::migrations::MigrationRecord

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, Table, TableDefinition,
    WriteTransaction,
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};

use crate::auth::PasswordError;
use crate::models::ValidationError;

// =============================================================================
// Table Definitions
// =============================================================================

/// Fiscal entities: id → serialized FiscalEntity.
pub const FISCAL_ENTITIES: TableDefinition<u64, &[u8]> = TableDefinition::new("fiscal_entities");

/// User accounts: id → serialized User.
pub const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");

/// Unique index: normalised email → user id.
pub const USER_EMAILS: TableDefinition<&str, u64> = TableDefinition::new("user_emails");

/// Invoicing registries: id → serialized Registry.
pub const REGISTRIES: TableDefinition<u64, &[u8]> = TableDefinition::new("registries");

/// Service contracts: id → serialized ServiceContract.
pub const SERVICE_CONTRACTS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("service_contracts");

/// Time invoices: id → serialized TimeInvoice.
pub const TIME_INVOICES: TableDefinition<u64, &[u8]> = TableDefinition::new("time_invoices");

/// Auto-increment state: table name → last id handed out.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Applied schema migrations: version → serialized MigrationRecord.
pub const SCHEMA_MIGRATIONS: TableDefinition<u32, &[u8]> =
    TableDefinition::new("schema_migrations");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid value: {0}")]
    Validation(#[from] ValidationError),

    #[error("password error: {0}")]
    Password(#[from] PasswordError),

    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("{kind}.{field} references missing row {id}")]
    ForeignKey {
        kind: &'static str,
        field: &'static str,
        id: u64,
    },

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("cannot delete {kind} {id}: referenced by {referrer} {referrer_id} through {field}")]
    Restricted {
        kind: &'static str,
        id: u64,
        referrer: &'static str,
        referrer_id: u64,
        field: &'static str,
    },

    #[error("{kind} {id} cannot be decoded: {reason}")]
    Corrupt {
        kind: &'static str,
        id: u64,
        reason: String,
    },
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    pub(crate) fn not_found(kind: &'static str, key: impl fmt::Display) -> Self {
        DbError::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

// =============================================================================
// Typed Row Identifiers
// =============================================================================

/// Primary key of a row in the table holding `T`.
///
/// The phantom type keeps a `Id<User>` from being passed where an
/// `Id<FiscalEntity>` is expected. Serialized as a bare integer.
pub struct Id<T> {
    raw: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    pub const fn new(raw: u64) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub const fn get(self) -> u64 {
        self.raw
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.raw)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.raw)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(Id::new)
    }
}

// =============================================================================
// Records
// =============================================================================

/// A row type persisted in its own `id → JSON` table.
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Backing table.
    const TABLE: TableDefinition<'static, u64, &'static [u8]>;
    /// Table name, also used as the sequence key.
    const TABLE_NAME: &'static str;
    /// Singular name used in errors and logs.
    const KIND: &'static str;
}

/// A row together with its primary key.
///
/// Dereferences to the row fields, so `contract.currency` works directly
/// on a `Stored<ServiceContract>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Stored<T> {
    pub id: Id<T>,
    pub fields: T,
}

impl<T> Deref for Stored<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.fields
    }
}

impl<T> DerefMut for Stored<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.fields
    }
}

fn decode<T: Record>(id: u64, bytes: &[u8]) -> DbResult<T> {
    serde_json::from_slice(bytes).map_err(|e| DbError::Corrupt {
        kind: T::KIND,
        id,
        reason: e.to_string(),
    })
}

fn fetch<T: Record>(
    table: &impl ReadableTable<u64, &'static [u8]>,
    id: Id<T>,
) -> DbResult<Option<Stored<T>>> {
    match table.get(id.get())? {
        Some(value) => Ok(Some(Stored {
            id,
            fields: decode(id.get(), value.value())?,
        })),
        None => Ok(None),
    }
}

fn fetch_all<T: Record>(table: &impl ReadableTable<u64, &'static [u8]>) -> DbResult<Vec<Stored<T>>> {
    let mut rows = Vec::new();
    for entry in table.iter()? {
        let (key, value) = entry?;
        let id = key.value();
        rows.push(Stored {
            id: Id::new(id),
            fields: decode(id, value.value())?,
        });
    }
    Ok(rows)
}

fn put<T: Record>(table: &mut Table<'_, u64, &'static [u8]>, id: Id<T>, fields: &T) -> DbResult<()> {
    let json = serde_json::to_vec(fields)?;
    table.insert(id.get(), json.as_slice())?;
    Ok(())
}

// =============================================================================
// Write-Transaction Helpers
// =============================================================================
//
// Each helper opens the tables it needs and closes them before returning,
// so helpers compose freely inside one write transaction.

/// Hand out the next id for `T`'s table.
pub(crate) fn next_id<T: Record>(txn: &WriteTransaction) -> DbResult<Id<T>> {
    let mut sequences = txn.open_table(SEQUENCES)?;
    let last = sequences.get(T::TABLE_NAME)?.map(|v| v.value()).unwrap_or(0);
    let next = last + 1;
    sequences.insert(T::TABLE_NAME, next)?;
    Ok(Id::new(next))
}

/// Load a row, failing with `NotFound` when it is absent.
pub(crate) fn load<T: Record>(txn: &WriteTransaction, id: Id<T>) -> DbResult<Stored<T>> {
    let table = txn.open_table(T::TABLE)?;
    fetch(&table, id)?.ok_or_else(|| DbError::not_found(T::KIND, id))
}

pub(crate) fn load_all<T: Record>(txn: &WriteTransaction) -> DbResult<Vec<Stored<T>>> {
    let table = txn.open_table(T::TABLE)?;
    fetch_all(&table)
}

/// Insert a new row under a freshly allocated id.
pub(crate) fn insert<T: Record>(txn: &WriteTransaction, fields: T) -> DbResult<Stored<T>> {
    let id = next_id::<T>(txn)?;
    {
        let mut table = txn.open_table(T::TABLE)?;
        put(&mut table, id, &fields)?;
    }
    Ok(Stored { id, fields })
}

/// Overwrite an existing row.
pub(crate) fn replace<T: Record>(txn: &WriteTransaction, row: &Stored<T>) -> DbResult<()> {
    let mut table = txn.open_table(T::TABLE)?;
    let exists = table.get(row.id.get())?.is_some();
    if !exists {
        return Err(DbError::not_found(T::KIND, row.id));
    }
    put(&mut table, row.id, &row.fields)
}

/// Remove rows by id; absent ids are ignored.
pub(crate) fn remove_all<T: Record>(txn: &WriteTransaction, ids: &[Id<T>]) -> DbResult<usize> {
    let mut table = txn.open_table(T::TABLE)?;
    let mut removed = 0;
    for id in ids {
        if table.remove(id.get())?.is_some() {
            removed += 1;
        }
    }
    Ok(removed)
}

// =============================================================================
// InvoiceDatabase
// =============================================================================

/// Embedded ACID invoicing database.
pub struct InvoiceDatabase {
    db: Database,
}

impl InvoiceDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Bookkeeping tables must exist before migrations can be inspected
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(SEQUENCES)?;
            write_txn.open_table(SCHEMA_MIGRATIONS)?;
        }
        write_txn.commit()?;

        tracing::debug!(path = %path.display(), "Invoice database opened");
        Ok(Self { db })
    }

    pub(crate) fn begin_read(&self) -> DbResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    pub(crate) fn begin_write(&self) -> DbResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Cheap liveness check: a read transaction over the bookkeeping tables.
    pub fn ping(&self) -> DbResult<()> {
        let read_txn = self.db.begin_read()?;
        read_txn.open_table(SCHEMA_MIGRATIONS)?;
        Ok(())
    }

    /// Look up a row by id.
    pub(crate) fn find_row<T: Record>(&self, id: Id<T>) -> DbResult<Option<Stored<T>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::TABLE)?;
        fetch(&table, id)
    }

    /// Look up a row by id, failing with `NotFound` when it is absent.
    pub(crate) fn get_row<T: Record>(&self, id: Id<T>) -> DbResult<Stored<T>> {
        self.find_row(id)?
            .ok_or_else(|| DbError::not_found(T::KIND, id))
    }

    /// All rows of `T`, in id order.
    pub(crate) fn list_rows<T: Record>(&self) -> DbResult<Vec<Stored<T>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::TABLE)?;
        fetch_all(&table)
    }

    /// Rows of `T` matching a predicate, in id order.
    pub(crate) fn filter_rows<T: Record>(
        &self,
        predicate: impl Fn(&T) -> bool,
    ) -> DbResult<Vec<Stored<T>>> {
        let mut rows = self.list_rows::<T>()?;
        rows.retain(|row| predicate(&row.fields));
        Ok(rows)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::repository::FiscalEntity;
    use crate::storage::test_support::{fiscal_entity, temp_db};

    #[test]
    fn open_creates_bookkeeping_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db = InvoiceDatabase::open(&dir.path().join("nested/test.redb")).unwrap();
        db.ping().unwrap();
    }

    #[test]
    fn ids_are_sequential_per_table() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let first = insert(&txn, fiscal_entity("A")).unwrap();
        let second = insert(&txn, fiscal_entity("B")).unwrap();
        txn.commit().unwrap();

        assert_eq!(first.id.get(), 1);
        assert_eq!(second.id.get(), 2);
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let first = insert(&txn, fiscal_entity("A")).unwrap();
        remove_all(&txn, &[first.id]).unwrap();
        let second = insert(&txn, fiscal_entity("B")).unwrap();
        txn.commit().unwrap();

        assert_eq!(second.id.get(), 2);
        assert!(db.find_row(first.id).unwrap().is_none());
    }

    #[test]
    fn replace_requires_existing_row() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        let ghost = Stored {
            id: Id::<FiscalEntity>::new(42),
            fields: fiscal_entity("Ghost"),
        };
        let err = replace(&txn, &ghost).unwrap_err();
        assert!(matches!(err, DbError::NotFound { kind: "fiscal entity", .. }));
    }

    #[test]
    fn undecodable_rows_surface_as_corrupt() {
        let (db, _dir) = temp_db();
        let txn = db.begin_write().unwrap();
        {
            let mut table = txn.open_table(FISCAL_ENTITIES).unwrap();
            table.insert(7u64, b"not json".as_slice()).unwrap();
        }
        txn.commit().unwrap();

        let err = db.get_row(Id::<FiscalEntity>::new(7)).unwrap_err();
        assert!(matches!(err, DbError::Corrupt { id: 7, .. }));
    }

    #[test]
    fn id_serializes_as_bare_integer() {
        let id = Id::<FiscalEntity>::new(5);
        assert_eq!(serde_json::to_string(&id).unwrap(), "5");
        let back: Id<FiscalEntity> = serde_json::from_str("5").unwrap();
        assert_eq!(back, id);
    }
}
