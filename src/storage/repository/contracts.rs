// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service contract repository.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::super::database::{
    insert, replace, DbResult, Id, InvoiceDatabase, Record, Stored, SERVICE_CONTRACTS,
};
use super::super::integrity::{
    delete_cascading, ensure_not_invoice_party, ensure_one_to_one, require, DeletionRoot,
    DeletionSummary,
};
use super::{FiscalEntity, Registry};
use crate::models::{
    check_decimal, check_non_negative, limit_text, require_text, Currency, InvoicingUnit,
    ValidationResult, DECIMAL_MAX_DIGITS, LONG_TEXT, RATE_PLACES, SHORT_TEXT,
};

/// Agreement to bill a buyer for time at a fixed rate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceContract {
    /// Client being invoiced
    pub buyer: Id<FiscalEntity>,
    pub registry: Id<Registry>,
    pub registration_no: String,
    pub registration_date: NaiveDate,
    /// Currency the unit rate is agreed in
    pub currency: Currency,
    pub unit: InvoicingUnit,
    pub unit_rate: Decimal,
    /// Currency invoices are issued in
    pub invoicing_currency: Currency,
    /// Line description printed on invoices
    pub invoicing_description: String,
}

impl ServiceContract {
    pub fn validate(&self) -> ValidationResult<()> {
        require_text("registration_no", &self.registration_no, SHORT_TEXT)?;
        check_non_negative("unit_rate", self.unit_rate)?;
        check_decimal("unit_rate", self.unit_rate, DECIMAL_MAX_DIGITS, RATE_PLACES)?;
        limit_text("invoicing_description", &self.invoicing_description, LONG_TEXT)?;
        Ok(())
    }
}

impl fmt::Display for ServiceContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no {} from {}",
            self.registration_no, self.registration_date
        )
    }
}

impl Record for ServiceContract {
    const TABLE: redb::TableDefinition<'static, u64, &'static [u8]> = SERVICE_CONTRACTS;
    const TABLE_NAME: &'static str = "service_contracts";
    const KIND: &'static str = "service contract";
}

fn check_references(
    txn: &redb::WriteTransaction,
    contract: &ServiceContract,
    current: Option<Id<ServiceContract>>,
) -> DbResult<()> {
    require(txn, ServiceContract::KIND, "registry", contract.registry)?;
    require(txn, ServiceContract::KIND, "buyer", contract.buyer)?;
    ensure_one_to_one::<ServiceContract, FiscalEntity>(txn, "buyer", contract.buyer, current, |c| {
        Some(c.buyer)
    })?;
    ensure_not_invoice_party(txn, ServiceContract::KIND, "buyer", contract.buyer)
}

/// Repository for service contracts.
pub struct ServiceContractRepository<'a> {
    db: &'a InvoiceDatabase,
}

impl<'a> ServiceContractRepository<'a> {
    pub fn new(db: &'a InvoiceDatabase) -> Self {
        Self { db }
    }

    pub fn create(&self, contract: ServiceContract) -> DbResult<Stored<ServiceContract>> {
        contract.validate()?;

        let write_txn = self.db.begin_write()?;
        check_references(&write_txn, &contract, None)?;
        let stored = insert(&write_txn, contract)?;
        write_txn.commit()?;

        tracing::debug!(
            contract_id = %stored.id,
            registry_id = %stored.registry,
            "Service contract created"
        );
        Ok(stored)
    }

    pub fn get(&self, id: Id<ServiceContract>) -> DbResult<Stored<ServiceContract>> {
        self.db.get_row(id)
    }

    pub fn find(&self, id: Id<ServiceContract>) -> DbResult<Option<Stored<ServiceContract>>> {
        self.db.find_row(id)
    }

    pub fn list(&self) -> DbResult<Vec<Stored<ServiceContract>>> {
        self.db.list_rows()
    }

    /// Contracts filed under a registry.
    pub fn list_for_registry(
        &self,
        registry: Id<Registry>,
    ) -> DbResult<Vec<Stored<ServiceContract>>> {
        self.db
            .filter_rows(|c: &ServiceContract| c.registry == registry)
    }

    pub fn update(&self, contract: &Stored<ServiceContract>) -> DbResult<()> {
        contract.validate()?;

        let write_txn = self.db.begin_write()?;
        check_references(&write_txn, contract, Some(contract.id))?;
        replace(&write_txn, contract)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Delete a contract. Refused while an invoice still bills it.
    pub fn delete(&self, id: Id<ServiceContract>) -> DbResult<DeletionSummary> {
        let write_txn = self.db.begin_write()?;
        let summary = delete_cascading(&write_txn, DeletionRoot::ServiceContract(id))?;
        write_txn.commit()?;

        tracing::info!(contract_id = %id, "Service contract deleted");
        Ok(summary)
    }
}
