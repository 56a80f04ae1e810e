// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use microinvoicer::api::router;
use microinvoicer::config::AppConfig;
use microinvoicer::datastore::CryptoEngine;
use microinvoicer::error::AppError;
use microinvoicer::state::AppState;
use microinvoicer::storage::{InvoiceDatabase, Migrator};
use microinvoicer::telemetry;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    if std::env::args().nth(1).as_deref() == Some("generate-key") {
        println!("{}", CryptoEngine::generate_key()?);
        return Ok(());
    }

    let config = AppConfig::from_env()?;
    telemetry::init(config.log_format);

    // A malformed datastore key stops startup before anything is served
    CryptoEngine::from_base64(&config.datastore_key)?;

    let db = InvoiceDatabase::open(&config.database_path())?;
    let migrator = Migrator::builtin();
    let applied = migrator.up(&db)?;
    tracing::info!(applied = applied.len(), "Database schema is up to date");

    let state = AppState::new(db, migrator);
    let app = router(state);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Microinvoicer listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for Ctrl-C");
    }
}
