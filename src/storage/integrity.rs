// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Referential integrity for the invoicing schema.
//!
//! ## Reference Rules
//!
//! | Referrer | Field | Target | One-to-one | On delete |
//! |----------|-------|--------|------------|-----------|
//! | User | `seller` | FiscalEntity | yes | cascade |
//! | Registry | `user` | User | no | cascade |
//! | ServiceContract | `buyer` | FiscalEntity | yes | cascade |
//! | ServiceContract | `registry` | Registry | no | cascade |
//! | TimeInvoice | `registry` | Registry | no | cascade |
//! | TimeInvoice | `seller` | FiscalEntity | yes | restrict |
//! | TimeInvoice | `buyer` | FiscalEntity | yes | restrict |
//! | TimeInvoice | `contract` | ServiceContract | yes | restrict |
//!
//! A restrict reference only blocks a deletion when the referring invoice
//! survives it; an invoice removed by the same cascade (for instance through
//! its registry) does not hold anything back.
//!
//! ## Party Snapshots
//!
//! An invoice's seller and buyer rows belong to that invoice alone: they are
//! never a user's seller, a contract's buyer, or a party of another invoice.
//! They are removed together with the invoice.

use std::collections::BTreeSet;

use redb::WriteTransaction;
use serde::Serialize;

use super::database::{
    load, load_all, remove_all, DbError, DbResult, Id, Record, Stored, USER_EMAILS,
};
use super::repository::{FiscalEntity, Registry, ServiceContract, TimeInvoice, User};

/// Load the row a foreign key points at, or fail with `ForeignKey`.
pub(crate) fn require<T: Record>(
    txn: &WriteTransaction,
    kind: &'static str,
    field: &'static str,
    id: Id<T>,
) -> DbResult<Stored<T>> {
    match load(txn, id) {
        Ok(row) => Ok(row),
        Err(DbError::NotFound { .. }) => Err(DbError::ForeignKey {
            kind,
            field,
            id: id.get(),
        }),
        Err(other) => Err(other),
    }
}

/// Fail when another `T` row already links to `target` through a
/// one-to-one field.
pub(crate) fn ensure_one_to_one<T: Record, R>(
    txn: &WriteTransaction,
    field: &'static str,
    target: Id<R>,
    current: Option<Id<T>>,
    link: impl Fn(&T) -> Option<Id<R>>,
) -> DbResult<()> {
    let clash = load_all::<T>(txn)?
        .into_iter()
        .find(|row| Some(row.id) != current && link(&row.fields) == Some(target));

    match clash {
        Some(row) => Err(DbError::UniqueViolation(format!(
            "{}.{field} = {target} is already used by {} {}",
            T::KIND,
            T::KIND,
            row.id
        ))),
        None => Ok(()),
    }
}

/// Fail when `entity` already acts as a user's seller or a contract's buyer.
pub(crate) fn ensure_unclaimed_party(
    txn: &WriteTransaction,
    field: &'static str,
    entity: Id<FiscalEntity>,
) -> DbResult<()> {
    if let Some(user) = load_all::<User>(txn)?
        .into_iter()
        .find(|u| u.seller == Some(entity))
    {
        return Err(DbError::UniqueViolation(format!(
            "{}.{field} = {entity} is the seller of user {}",
            TimeInvoice::KIND,
            user.id
        )));
    }
    if let Some(contract) = load_all::<ServiceContract>(txn)?
        .into_iter()
        .find(|c| c.buyer == entity)
    {
        return Err(DbError::UniqueViolation(format!(
            "{}.{field} = {entity} is the buyer of {} {}",
            TimeInvoice::KIND,
            ServiceContract::KIND,
            contract.id
        )));
    }
    Ok(())
}

/// Fail when `entity` is the seller or buyer of an invoice.
pub(crate) fn ensure_not_invoice_party(
    txn: &WriteTransaction,
    kind: &'static str,
    field: &'static str,
    entity: Id<FiscalEntity>,
) -> DbResult<()> {
    let invoice = load_all::<TimeInvoice>(txn)?
        .into_iter()
        .find(|i| i.seller == entity || i.buyer == entity);

    match invoice {
        Some(invoice) => Err(DbError::UniqueViolation(format!(
            "{kind}.{field} = {entity} is a party of {} {}",
            TimeInvoice::KIND,
            invoice.id
        ))),
        None => Ok(()),
    }
}

// =============================================================================
// Deletion
// =============================================================================

/// Row a deletion starts from.
#[derive(Debug, Clone, Copy)]
pub enum DeletionRoot {
    FiscalEntity(Id<FiscalEntity>),
    User(Id<User>),
    Registry(Id<Registry>),
    ServiceContract(Id<ServiceContract>),
    TimeInvoice(Id<TimeInvoice>),
}

/// Rows removed by one deletion, per table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionSummary {
    pub fiscal_entities: usize,
    pub users: usize,
    pub registries: usize,
    pub service_contracts: usize,
    pub time_invoices: usize,
}

impl DeletionSummary {
    pub fn total(&self) -> usize {
        self.fiscal_entities
            + self.users
            + self.registries
            + self.service_contracts
            + self.time_invoices
    }
}

#[derive(Default)]
struct Collected {
    fiscal_entities: BTreeSet<Id<FiscalEntity>>,
    users: BTreeSet<Id<User>>,
    registries: BTreeSet<Id<Registry>>,
    contracts: BTreeSet<Id<ServiceContract>>,
    invoices: BTreeSet<Id<TimeInvoice>>,
}

/// Delete `root` and everything that cascades from it.
///
/// Runs inside the caller's write transaction; nothing is removed when a
/// restrict reference blocks the deletion.
pub(crate) fn delete_cascading(
    txn: &WriteTransaction,
    root: DeletionRoot,
) -> DbResult<DeletionSummary> {
    let mut collected = Collected::default();
    match root {
        DeletionRoot::FiscalEntity(id) => {
            load(txn, id)?;
            collected.fiscal_entities.insert(id);
        }
        DeletionRoot::User(id) => {
            load(txn, id)?;
            collected.users.insert(id);
        }
        DeletionRoot::Registry(id) => {
            load(txn, id)?;
            collected.registries.insert(id);
        }
        DeletionRoot::ServiceContract(id) => {
            load(txn, id)?;
            collected.contracts.insert(id);
        }
        DeletionRoot::TimeInvoice(id) => {
            load(txn, id)?;
            collected.invoices.insert(id);
        }
    }

    let users = load_all::<User>(txn)?;
    let registries = load_all::<Registry>(txn)?;
    let contracts = load_all::<ServiceContract>(txn)?;
    let invoices = load_all::<TimeInvoice>(txn)?;

    // Follow cascade edges to a fixed point
    loop {
        let mut changed = false;

        for user in &users {
            if user
                .seller
                .is_some_and(|seller| collected.fiscal_entities.contains(&seller))
            {
                changed |= collected.users.insert(user.id);
            }
        }
        for registry in &registries {
            if collected.users.contains(&registry.user) {
                changed |= collected.registries.insert(registry.id);
            }
        }
        for contract in &contracts {
            if collected.fiscal_entities.contains(&contract.buyer)
                || collected.registries.contains(&contract.registry)
            {
                changed |= collected.contracts.insert(contract.id);
            }
        }
        for invoice in &invoices {
            if collected.registries.contains(&invoice.registry) {
                changed |= collected.invoices.insert(invoice.id);
            }
            // Party snapshots go with their invoice
            if collected.invoices.contains(&invoice.id) {
                changed |= collected.fiscal_entities.insert(invoice.seller);
                changed |= collected.fiscal_entities.insert(invoice.buyer);
            }
        }

        if !changed {
            break;
        }
    }

    // Restrict edges from surviving invoices block the whole deletion
    for invoice in invoices.iter().filter(|i| !collected.invoices.contains(&i.id)) {
        let references = [
            (
                "seller",
                FiscalEntity::KIND,
                invoice.seller.get(),
                collected.fiscal_entities.contains(&invoice.seller),
            ),
            (
                "buyer",
                FiscalEntity::KIND,
                invoice.buyer.get(),
                collected.fiscal_entities.contains(&invoice.buyer),
            ),
            (
                "contract",
                ServiceContract::KIND,
                invoice.contract.get(),
                collected.contracts.contains(&invoice.contract),
            ),
        ];
        if let Some((field, kind, id, _)) = references.into_iter().find(|(.., doomed)| *doomed) {
            return Err(DbError::Restricted {
                kind,
                id,
                referrer: TimeInvoice::KIND,
                referrer_id: invoice.id.get(),
                field,
            });
        }
    }

    let doomed_emails: Vec<&str> = users
        .iter()
        .filter(|u| collected.users.contains(&u.id))
        .map(|u| u.email.as_str())
        .collect();
    {
        let mut emails = txn.open_table(USER_EMAILS)?;
        for email in doomed_emails {
            emails.remove(email)?;
        }
    }

    let summary = DeletionSummary {
        time_invoices: remove_all(txn, &into_vec(collected.invoices))?,
        service_contracts: remove_all(txn, &into_vec(collected.contracts))?,
        registries: remove_all(txn, &into_vec(collected.registries))?,
        users: remove_all(txn, &into_vec(collected.users))?,
        fiscal_entities: remove_all(txn, &into_vec(collected.fiscal_entities))?,
    };

    tracing::debug!(?root, ?summary, "Cascading delete collected");
    Ok(summary)
}

fn into_vec<T>(ids: BTreeSet<Id<T>>) -> Vec<Id<T>> {
    ids.into_iter().collect()
}
