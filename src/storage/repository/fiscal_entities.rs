// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fiscal entity repository.
//!
//! A fiscal entity is a legal party able to issue or receive invoices. Users
//! point at one as their seller, contracts as their buyer, and every invoice
//! keeps its own seller/buyer snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::super::database::{
    insert, replace, DbResult, Id, InvoiceDatabase, Record, Stored, FISCAL_ENTITIES,
};
use super::super::integrity::{delete_cascading, DeletionRoot, DeletionSummary};
use crate::models::{require_text, ValidationResult, LONG_TEXT, SHORT_TEXT};

/// Fiscal entity row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FiscalEntity {
    /// Registered name of the company or person
    pub name: String,
    /// Full name of the owner / legal representative
    pub owner_fullname: String,
    /// Trade registry number
    pub registration_id: String,
    /// Fiscal identification code (CIF)
    pub fiscal_code: String,
    /// Registered address
    pub address: String,
    /// IBAN or local account number
    pub bank_account: String,
    /// Bank holding `bank_account`
    pub bank_name: String,
}

impl FiscalEntity {
    pub fn validate(&self) -> ValidationResult<()> {
        require_text("name", &self.name, LONG_TEXT)?;
        require_text("owner_fullname", &self.owner_fullname, LONG_TEXT)?;
        require_text("registration_id", &self.registration_id, SHORT_TEXT)?;
        require_text("fiscal_code", &self.fiscal_code, SHORT_TEXT)?;
        require_text("address", &self.address, usize::MAX)?;
        require_text("bank_account", &self.bank_account, SHORT_TEXT)?;
        require_text("bank_name", &self.bank_name, LONG_TEXT)?;
        Ok(())
    }
}

impl fmt::Display for FiscalEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [CIF: {}]", self.name, self.fiscal_code)
    }
}

impl Record for FiscalEntity {
    const TABLE: redb::TableDefinition<'static, u64, &'static [u8]> = FISCAL_ENTITIES;
    const TABLE_NAME: &'static str = "fiscal_entities";
    const KIND: &'static str = "fiscal entity";
}

/// Repository for fiscal entity rows.
pub struct FiscalEntityRepository<'a> {
    db: &'a InvoiceDatabase,
}

impl<'a> FiscalEntityRepository<'a> {
    pub fn new(db: &'a InvoiceDatabase) -> Self {
        Self { db }
    }

    /// Insert a new fiscal entity.
    pub fn create(&self, entity: FiscalEntity) -> DbResult<Stored<FiscalEntity>> {
        entity.validate()?;

        let write_txn = self.db.begin_write()?;
        let stored = insert(&write_txn, entity)?;
        write_txn.commit()?;

        tracing::debug!(fiscal_entity_id = %stored.id, "Fiscal entity created");
        Ok(stored)
    }

    pub fn get(&self, id: Id<FiscalEntity>) -> DbResult<Stored<FiscalEntity>> {
        self.db.get_row(id)
    }

    pub fn find(&self, id: Id<FiscalEntity>) -> DbResult<Option<Stored<FiscalEntity>>> {
        self.db.find_row(id)
    }

    pub fn list(&self) -> DbResult<Vec<Stored<FiscalEntity>>> {
        self.db.list_rows()
    }

    /// Overwrite an existing fiscal entity.
    pub fn update(&self, entity: &Stored<FiscalEntity>) -> DbResult<()> {
        entity.validate()?;

        let write_txn = self.db.begin_write()?;
        replace(&write_txn, entity)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Delete a fiscal entity.
    ///
    /// Cascades to the user selling as this entity and to the contract buying
    /// as it; refused while an invoice outside that cascade still names it.
    pub fn delete(&self, id: Id<FiscalEntity>) -> DbResult<DeletionSummary> {
        let write_txn = self.db.begin_write()?;
        let summary = delete_cascading(&write_txn, DeletionRoot::FiscalEntity(id))?;
        write_txn.commit()?;

        tracing::info!(fiscal_entity_id = %id, removed = summary.total(), "Fiscal entity deleted");
        Ok(summary)
    }
}
