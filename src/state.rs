// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::storage::{InvoiceDatabase, Migrator};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<InvoiceDatabase>,
    /// Migration history the readiness probe compares against
    pub migrator: Arc<Migrator>,
}

impl AppState {
    pub fn new(db: InvoiceDatabase, migrator: Migrator) -> Self {
        Self {
            db: Arc::new(db),
            migrator: Arc::new(migrator),
        }
    }
}
