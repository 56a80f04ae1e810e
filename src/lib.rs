// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Microinvoicer - Time-Based Invoicing Service
//!
//! Sellers keep a registry of service contracts and issue time invoices
//! against them. Every user also carries a private datastore, encrypted at
//! rest and guarded by a CRC32 checksum.
//!
//! ## Modules
//!
//! - `api` - health probes and OpenAPI docs (Axum)
//! - `auth` - password hashing, roles, and login
//! - `datastore` - encrypted per-user datastore codec
//! - `storage` - relational schema and migrations (redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod datastore;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;
pub mod telemetry;
