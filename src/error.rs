// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Startup errors of the server binary.

use crate::config::ConfigError;
use crate::datastore::CryptoError;
use crate::storage::{DbError, MigrationError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("datastore key error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
