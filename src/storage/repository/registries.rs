// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Invoicing registry repository.
//!
//! A registry is one invoice numbering series owned by a user. Contracts
//! and invoices hang off it and go with it when it is deleted.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::super::database::{
    insert, load, replace, DbResult, Id, InvoiceDatabase, Record, Stored, REGISTRIES,
};
use super::super::integrity::{delete_cascading, require, DeletionRoot, DeletionSummary};
use super::User;
use crate::models::{require_text, ValidationError, ValidationResult, REALLY_SHORT, SHORT_TEXT};

/// Registry row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Registry {
    pub user: Id<User>,
    pub display_name: String,
    /// Series code printed in front of every invoice number
    pub invoice_series: String,
    /// Number the next issued invoice receives
    pub next_invoice_no: u32,
}

impl Registry {
    pub fn new(user: Id<User>, display_name: impl Into<String>, invoice_series: impl Into<String>) -> Self {
        Self {
            user,
            display_name: display_name.into(),
            invoice_series: invoice_series.into(),
            next_invoice_no: 1,
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        require_text("display_name", &self.display_name, SHORT_TEXT)?;
        require_text("invoice_series", &self.invoice_series, REALLY_SHORT)?;
        if self.next_invoice_no == 0 {
            return Err(ValidationError::Invariant(
                "next_invoice_no starts at 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, series {}", self.display_name, self.invoice_series)
    }
}

impl Record for Registry {
    const TABLE: redb::TableDefinition<'static, u64, &'static [u8]> = REGISTRIES;
    const TABLE_NAME: &'static str = "registries";
    const KIND: &'static str = "registry";
}

/// Hand out the registry's next invoice number inside `txn`.
pub(crate) fn take_invoice_number(
    txn: &redb::WriteTransaction,
    id: Id<Registry>,
) -> DbResult<(String, u32)> {
    let mut registry = load(txn, id)?;
    let number = registry.next_invoice_no;
    registry.next_invoice_no = number.checked_add(1).ok_or_else(|| {
        ValidationError::Invariant(format!("registry {id} ran out of invoice numbers"))
    })?;
    replace(txn, &registry)?;
    Ok((registry.fields.invoice_series, number))
}

/// Repository for invoicing registries.
pub struct RegistryRepository<'a> {
    db: &'a InvoiceDatabase,
}

impl<'a> RegistryRepository<'a> {
    pub fn new(db: &'a InvoiceDatabase) -> Self {
        Self { db }
    }

    pub fn create(&self, registry: Registry) -> DbResult<Stored<Registry>> {
        registry.validate()?;

        let write_txn = self.db.begin_write()?;
        require(&write_txn, Registry::KIND, "user", registry.user)?;
        let stored = insert(&write_txn, registry)?;
        write_txn.commit()?;

        tracing::debug!(registry_id = %stored.id, user_id = %stored.user, "Registry created");
        Ok(stored)
    }

    pub fn get(&self, id: Id<Registry>) -> DbResult<Stored<Registry>> {
        self.db.get_row(id)
    }

    pub fn find(&self, id: Id<Registry>) -> DbResult<Option<Stored<Registry>>> {
        self.db.find_row(id)
    }

    pub fn list(&self) -> DbResult<Vec<Stored<Registry>>> {
        self.db.list_rows()
    }

    /// Registries owned by a user.
    pub fn list_for_user(&self, user: Id<User>) -> DbResult<Vec<Stored<Registry>>> {
        self.db.filter_rows(|r: &Registry| r.user == user)
    }

    /// Overwrite a registry's profile fields.
    ///
    /// The stored `next_invoice_no` is kept; only
    /// [`allocate_invoice_number`](Self::allocate_invoice_number) and invoice
    /// issuing advance it.
    pub fn update(&self, registry: &Stored<Registry>) -> DbResult<()> {
        registry.validate()?;

        let write_txn = self.db.begin_write()?;
        require(&write_txn, Registry::KIND, "user", registry.user)?;
        let current = load(&write_txn, registry.id)?;
        let mut row = registry.clone();
        row.next_invoice_no = current.next_invoice_no;
        replace(&write_txn, &row)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Reserve the next invoice number, returning `(series, number)`.
    pub fn allocate_invoice_number(&self, id: Id<Registry>) -> DbResult<(String, u32)> {
        let write_txn = self.db.begin_write()?;
        let allocated = take_invoice_number(&write_txn, id)?;
        write_txn.commit()?;
        Ok(allocated)
    }

    /// Delete a registry with its contracts and invoices.
    pub fn delete(&self, id: Id<Registry>) -> DbResult<DeletionSummary> {
        let write_txn = self.db.begin_write()?;
        let summary = delete_cascading(&write_txn, DeletionRoot::Registry(id))?;
        write_txn.commit()?;

        tracing::info!(registry_id = %id, removed = summary.total(), "Registry deleted");
        Ok(summary)
    }
}
