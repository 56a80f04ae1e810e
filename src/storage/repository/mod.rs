// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the invoicing tables.
//!
//! Each repository borrows the [`InvoiceDatabase`] and runs every mutation
//! in a single write transaction, checking field rules and references
//! before anything is written.
//!
//! [`InvoiceDatabase`]: super::InvoiceDatabase

pub mod contracts;
pub mod fiscal_entities;
pub mod invoices;
pub mod registries;
pub mod users;

pub use contracts::{ServiceContract, ServiceContractRepository};
pub use fiscal_entities::{FiscalEntity, FiscalEntityRepository};
pub use invoices::{IssueInvoice, TimeInvoice, TimeInvoiceRepository};
pub use registries::{Registry, RegistryRepository};
pub use users::{normalize_email, User, UserRepository, EMPTY_CRC};
