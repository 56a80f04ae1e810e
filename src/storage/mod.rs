// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Invoicing Storage
//!
//! Relational invoicing data in a single embedded redb file.
//!
//! ## Layers
//!
//! - [`database`]: tables, typed ids, row encoding
//! - [`integrity`]: foreign keys, one-to-one links, cascade/restrict deletes
//! - [`migrations`]: versioned schema history
//! - [`repository`]: one repository per entity
//!
//! ## Entities
//!
//! ```text
//! FiscalEntity ◄─seller── User ◄─user── Registry ◄─registry── ServiceContract ──buyer─► FiscalEntity
//!                                          ▲                        ▲
//!                                          └──registry── TimeInvoice ┘ contract
//!                                                        │  seller/buyer
//!                                                        ▼
//!                                                   FiscalEntity (snapshots)
//! ```

pub mod database;
pub mod integrity;
pub mod migrations;
pub mod repository;

pub use database::{DbError, DbResult, Id, InvoiceDatabase, Record, Stored};
pub use integrity::{DeletionRoot, DeletionSummary};
pub use migrations::{
    Migration, MigrationError, MigrationRecord, MigrationStatus, Migrator, PendingMigration,
    SchemaOp,
};
pub use repository::{
    FiscalEntity, FiscalEntityRepository, IssueInvoice, Registry, RegistryRepository,
    ServiceContract, ServiceContractRepository, TimeInvoice, TimeInvoiceRepository, User,
    UserRepository, EMPTY_CRC,
};
