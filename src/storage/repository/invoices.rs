// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Time invoice repository.
//!
//! ## Issuing
//!
//! [`TimeInvoiceRepository::issue`] builds a draft invoice from a contract in
//! one write transaction:
//!
//! 1. take the registry's next number
//! 2. copy the owner's seller and the contract's buyer into fresh fiscal
//!    entity rows, so the invoice keeps the parties as they were on the
//!    issue date
//! 3. copy unit, unit rate and invoicing currency from the contract
//!
//! Nothing is written when any step fails, including the number.
//!
//! ## Parties
//!
//! Seller and buyer are two distinct rows that no user, contract or other
//! invoice refers to. Deleting the invoice deletes them too.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::super::database::{
    insert, load, load_all, replace, DbError, DbResult, Id, InvoiceDatabase, Record, Stored,
    TIME_INVOICES,
};
use super::super::integrity::{
    delete_cascading, ensure_one_to_one, ensure_unclaimed_party, require, DeletionRoot,
    DeletionSummary,
};
use super::registries::take_invoice_number;
use super::{FiscalEntity, Registry, ServiceContract};
use crate::models::{
    check_decimal, check_non_negative, limit_text, require_text, Currency, InvoiceStatus,
    InvoicingUnit, ValidationError, ValidationResult, CONVERSION_PLACES, DECIMAL_MAX_DIGITS,
    LONG_TEXT, RATE_PLACES, REALLY_SHORT,
};

/// Time invoice row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeInvoice {
    pub registry: Id<Registry>,
    pub seller: Id<FiscalEntity>,
    pub buyer: Id<FiscalEntity>,
    pub contract: Id<ServiceContract>,
    pub series: String,
    pub number: u32,
    pub status: InvoiceStatus,
    pub description: String,
    pub issue_date: NaiveDate,
    /// Currency the invoice is issued in
    pub currency: Currency,
    /// Contract currency → invoice currency, when they differ
    pub conversion_rate: Option<Decimal>,
    pub unit: InvoicingUnit,
    pub unit_rate: Decimal,
    pub quantity: u32,
}

impl TimeInvoice {
    pub fn validate(&self) -> ValidationResult<()> {
        require_text("series", &self.series, REALLY_SHORT)?;
        limit_text("description", &self.description, LONG_TEXT)?;
        check_non_negative("unit_rate", self.unit_rate)?;
        check_decimal("unit_rate", self.unit_rate, DECIMAL_MAX_DIGITS, RATE_PLACES)?;
        if let Some(rate) = self.conversion_rate {
            check_non_negative("conversion_rate", rate)?;
            check_decimal("conversion_rate", rate, DECIMAL_MAX_DIGITS, CONVERSION_PLACES)?;
        }
        if self.amount().is_none() {
            return Err(ValidationError::Invariant(format!(
                "amount of {} × {} overflows the decimal range",
                self.unit_rate, self.quantity
            )));
        }
        Ok(())
    }

    /// `unit_rate × quantity`, in the contract currency.
    ///
    /// `None` when the product leaves the decimal range.
    pub fn contract_amount(&self) -> Option<Decimal> {
        self.unit_rate.checked_mul(Decimal::from(self.quantity))
    }

    /// Invoiced amount in the invoice currency, rounded to cents.
    pub fn amount(&self) -> Option<Decimal> {
        let amount = self.contract_amount()?;
        match self.conversion_rate {
            Some(rate) => amount
                .checked_mul(rate)
                .map(|converted| converted.round_dp(RATE_PLACES)),
            None => Some(amount),
        }
    }
}

impl fmt::Display for TimeInvoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} from {} ({})",
            self.series, self.number, self.issue_date, self.status
        )
    }
}

impl Record for TimeInvoice {
    const TABLE: redb::TableDefinition<'static, u64, &'static [u8]> = TIME_INVOICES;
    const TABLE_NAME: &'static str = "time_invoices";
    const KIND: &'static str = "time invoice";
}

/// Request for [`TimeInvoiceRepository::issue`].
#[derive(Debug, Clone)]
pub struct IssueInvoice {
    pub registry: Id<Registry>,
    pub contract: Id<ServiceContract>,
    pub issue_date: NaiveDate,
    pub quantity: u32,
    /// Required when the contract bills in another currency than it is agreed in
    pub conversion_rate: Option<Decimal>,
    /// Defaults to the contract's invoicing description
    pub description: Option<String>,
}

fn check_references(
    txn: &redb::WriteTransaction,
    invoice: &TimeInvoice,
    current: Option<Id<TimeInvoice>>,
) -> DbResult<()> {
    require(txn, TimeInvoice::KIND, "registry", invoice.registry)?;
    require(txn, TimeInvoice::KIND, "seller", invoice.seller)?;
    require(txn, TimeInvoice::KIND, "buyer", invoice.buyer)?;
    let contract = require(txn, TimeInvoice::KIND, "contract", invoice.contract)?;

    if contract.registry != invoice.registry {
        return Err(ValidationError::Invariant(format!(
            "contract {} belongs to registry {}, not {}",
            contract.id, contract.registry, invoice.registry
        ))
        .into());
    }
    match (invoice.currency != contract.currency, invoice.conversion_rate) {
        (true, None) => {
            return Err(ValidationError::Invariant(format!(
                "conversion_rate is required to invoice a {} contract in {}",
                contract.currency, invoice.currency
            ))
            .into())
        }
        (false, Some(_)) => {
            return Err(ValidationError::Invariant(format!(
                "conversion_rate must be empty when invoicing in the contract currency {}",
                contract.currency
            ))
            .into())
        }
        _ => {}
    }

    if invoice.seller == invoice.buyer {
        return Err(ValidationError::Invariant(format!(
            "seller and buyer are the same fiscal entity {}",
            invoice.seller
        ))
        .into());
    }
    ensure_unclaimed_party(txn, "seller", invoice.seller)?;
    ensure_unclaimed_party(txn, "buyer", invoice.buyer)?;

    ensure_one_to_one::<TimeInvoice, FiscalEntity>(txn, "seller", invoice.seller, current, |i| {
        Some(i.seller)
    })?;
    ensure_one_to_one::<TimeInvoice, FiscalEntity>(txn, "buyer", invoice.buyer, current, |i| {
        Some(i.buyer)
    })?;
    ensure_one_to_one::<TimeInvoice, ServiceContract>(
        txn,
        "contract",
        invoice.contract,
        current,
        |i| Some(i.contract),
    )?;
    ensure_unique_number(txn, invoice, current)
}

fn ensure_unique_number(
    txn: &redb::WriteTransaction,
    invoice: &TimeInvoice,
    current: Option<Id<TimeInvoice>>,
) -> DbResult<()> {
    let clash = load_all::<TimeInvoice>(txn)?.into_iter().find(|row| {
        Some(row.id) != current
            && row.registry == invoice.registry
            && row.series == invoice.series
            && row.number == invoice.number
    });

    match clash {
        Some(row) => Err(DbError::UniqueViolation(format!(
            "invoice {} {} already exists in registry {} as {} {}",
            invoice.series,
            invoice.number,
            invoice.registry,
            TimeInvoice::KIND,
            row.id
        ))),
        None => Ok(()),
    }
}

/// Repository for time invoices.
pub struct TimeInvoiceRepository<'a> {
    db: &'a InvoiceDatabase,
}

impl<'a> TimeInvoiceRepository<'a> {
    pub fn new(db: &'a InvoiceDatabase) -> Self {
        Self { db }
    }

    /// Insert a fully specified invoice.
    pub fn create(&self, invoice: TimeInvoice) -> DbResult<Stored<TimeInvoice>> {
        invoice.validate()?;

        let write_txn = self.db.begin_write()?;
        check_references(&write_txn, &invoice, None)?;
        let stored = insert(&write_txn, invoice)?;
        write_txn.commit()?;

        tracing::debug!(invoice_id = %stored.id, "Time invoice created");
        Ok(stored)
    }

    /// Issue a draft invoice for a contract (see the module docs).
    pub fn issue(&self, request: IssueInvoice) -> DbResult<Stored<TimeInvoice>> {
        let write_txn = self.db.begin_write()?;

        let registry = require(&write_txn, TimeInvoice::KIND, "registry", request.registry)?;
        let contract = require(&write_txn, TimeInvoice::KIND, "contract", request.contract)?;
        let owner = load(&write_txn, registry.user)?;
        let seller_id = owner.seller.ok_or_else(|| {
            ValidationError::Invariant(format!(
                "user {} has no seller fiscal entity to invoice as",
                owner.id
            ))
        })?;
        let seller = load(&write_txn, seller_id)?;
        let buyer = load(&write_txn, contract.buyer)?;

        let (series, number) = take_invoice_number(&write_txn, registry.id)?;
        let seller = insert(&write_txn, seller.fields)?;
        let buyer = insert(&write_txn, buyer.fields)?;

        let invoice = TimeInvoice {
            registry: registry.id,
            seller: seller.id,
            buyer: buyer.id,
            contract: contract.id,
            series,
            number,
            status: InvoiceStatus::Draft,
            description: request
                .description
                .unwrap_or_else(|| contract.invoicing_description.clone()),
            issue_date: request.issue_date,
            currency: contract.invoicing_currency,
            conversion_rate: request.conversion_rate,
            unit: contract.unit,
            unit_rate: contract.unit_rate,
            quantity: request.quantity,
        };
        invoice.validate()?;
        check_references(&write_txn, &invoice, None)?;
        let stored = insert(&write_txn, invoice)?;
        write_txn.commit()?;

        tracing::info!(
            invoice_id = %stored.id,
            registry_id = %stored.registry,
            series = %stored.series,
            number = stored.number,
            "Time invoice issued"
        );
        Ok(stored)
    }

    pub fn get(&self, id: Id<TimeInvoice>) -> DbResult<Stored<TimeInvoice>> {
        self.db.get_row(id)
    }

    pub fn find(&self, id: Id<TimeInvoice>) -> DbResult<Option<Stored<TimeInvoice>>> {
        self.db.find_row(id)
    }

    pub fn list(&self) -> DbResult<Vec<Stored<TimeInvoice>>> {
        self.db.list_rows()
    }

    /// Invoices of a registry, in issue order.
    pub fn list_for_registry(&self, registry: Id<Registry>) -> DbResult<Vec<Stored<TimeInvoice>>> {
        let mut invoices = self
            .db
            .filter_rows(|i: &TimeInvoice| i.registry == registry)?;
        invoices.sort_by_key(|i| (i.issue_date, i.number));
        Ok(invoices)
    }

    /// Overwrite an invoice. Its registry, series and number are fixed once
    /// stored.
    pub fn update(&self, invoice: &Stored<TimeInvoice>) -> DbResult<()> {
        invoice.validate()?;

        let write_txn = self.db.begin_write()?;
        let current = load(&write_txn, invoice.id)?;
        if current.registry != invoice.registry
            || current.series != invoice.series
            || current.number != invoice.number
        {
            return Err(ValidationError::Invariant(format!(
                "{} {} keeps its number {} {} in registry {}",
                TimeInvoice::KIND,
                invoice.id,
                current.series,
                current.number,
                current.registry
            ))
            .into());
        }
        check_references(&write_txn, invoice, Some(invoice.id))?;
        replace(&write_txn, invoice)?;
        write_txn.commit()?;
        Ok(())
    }

    pub fn set_status(
        &self,
        id: Id<TimeInvoice>,
        status: InvoiceStatus,
    ) -> DbResult<Stored<TimeInvoice>> {
        let write_txn = self.db.begin_write()?;
        let mut invoice = load(&write_txn, id)?;
        invoice.status = status;
        replace(&write_txn, &invoice)?;
        write_txn.commit()?;

        tracing::info!(invoice_id = %id, %status, "Time invoice status changed");
        Ok(invoice)
    }

    pub fn delete(&self, id: Id<TimeInvoice>) -> DbResult<DeletionSummary> {
        let write_txn = self.db.begin_write()?;
        let summary = delete_cascading(&write_txn, DeletionRoot::TimeInvoice(id))?;
        write_txn.commit()?;

        tracing::info!(invoice_id = %id, "Time invoice deleted");
        Ok(summary)
    }
}
