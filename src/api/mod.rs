// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operational HTTP surface: health probes and their OpenAPI document.

use axum::{routing::get, Router};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

pub mod health;

pub fn router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(health::health, health::liveness, health::readiness),
    components(schemas(
        health::ReadyResponse,
        health::HealthChecks,
        health::HealthResponse
    )),
    tags((name = "Health", description = "Liveness and readiness probes"))
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::storage::{InvoiceDatabase, Migration, Migrator};

    fn state_with(migrator: Migrator, apply: bool) -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = InvoiceDatabase::open(&dir.path().join("test.redb")).unwrap();
        if apply {
            migrator.up(&db).unwrap();
        }
        (AppState::new(db, migrator), dir)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (state, _dir) = state_with(Migrator::builtin(), false);
        let (status, body) = get_json(router(state), "/health/live").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn ready_when_fully_migrated() {
        let (state, _dir) = state_with(Migrator::builtin(), true);
        let (status, body) = get_json(router(state), "/health/ready").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["checks"]["database"], "ok");
        assert_eq!(body["checks"]["migrations"], "ok");
        assert!(body["checks"].get("pending_migrations").is_none());
    }

    #[tokio::test]
    async fn not_ready_with_pending_migrations() {
        let (state, _dir) = state_with(Migrator::builtin(), false);
        let (status, body) = get_json(router(state), "/health/ready").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["checks"]["migrations"], "pending");
        assert_eq!(body["checks"]["pending_migrations"], serde_json::json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn not_ready_when_history_diverges() {
        let dir = tempfile::tempdir().unwrap();
        let db = InvoiceDatabase::open(&dir.path().join("test.redb")).unwrap();
        Migrator::builtin().up(&db).unwrap();

        let truncated: Vec<Migration> = Migrator::builtin()
            .migrations()
            .iter()
            .filter(|m| m.version < 3)
            .cloned()
            .collect();
        let state = AppState::new(db, Migrator::new(truncated));

        let (status, body) = get_json(router(state), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["checks"]["migrations"], "error");
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (state, _dir) = state_with(Migrator::builtin(), true);
        let (status, body) = get_json(router(state), "/api-doc/openapi.json").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"].get("/health/ready").is_some());
    }
}
