//! HTTP API for the Backforge store.
//!
//! # Endpoints
//!
//! - `GET /health`: health check (no auth required)
//! - `POST /api/v1/waitlist`: waitlist signup (no auth required)
//! - `GET /api/v1/me`: the caller's account, created on first access
//! - `GET|POST /api/v1/projects`, `GET|PATCH|DELETE /api/v1/projects/{id}`
//! - `GET|POST /api/v1/projects/{id}/{modules,endpoints,tasks}`
//! - `GET|PATCH|DELETE /api/v1/{modules,endpoints,tasks}/{id}`
//! - `GET /api/v1/changes/{table}/{scope}`: WebSocket change feed

mod auth;
mod changes;
mod config;
mod error;
mod routes;

pub use auth::{auth_middleware, ApiKeyStore, AuthUser};
pub use config::ServerConfig;
pub use error::ApiError;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::models::{Endpoint, Module, Project, Task};
use crate::store::SqliteStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
    pub api_keys: Arc<ApiKeyStore>,
}

impl AppState {
    pub fn new(store: SqliteStore, api_keys: ApiKeyStore) -> Self {
        Self {
            store,
            api_keys: Arc::new(api_keys),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/waitlist", post(routes::join));

    let protected_routes = Router::new()
        .route("/api/v1/me", get(routes::me))
        .route(
            "/api/v1/projects",
            get(routes::list_projects).post(routes::create_project),
        )
        .route(
            "/api/v1/projects/{id}",
            get(routes::get_row::<Project>)
                .patch(routes::update_row::<Project>)
                .delete(routes::delete_row::<Project>),
        )
        .route(
            "/api/v1/projects/{id}/modules",
            get(routes::list_rows::<Module>).post(routes::create_row::<Module>),
        )
        .route(
            "/api/v1/projects/{id}/endpoints",
            get(routes::list_rows::<Endpoint>).post(routes::create_row::<Endpoint>),
        )
        .route(
            "/api/v1/projects/{id}/tasks",
            get(routes::list_rows::<Task>).post(routes::create_row::<Task>),
        )
        .route(
            "/api/v1/modules/{id}",
            get(routes::get_row::<Module>)
                .patch(routes::update_row::<Module>)
                .delete(routes::delete_row::<Module>),
        )
        .route(
            "/api/v1/endpoints/{id}",
            get(routes::get_row::<Endpoint>)
                .patch(routes::update_row::<Endpoint>)
                .delete(routes::delete_row::<Endpoint>),
        )
        .route(
            "/api/v1/tasks/{id}",
            get(routes::get_row::<Task>)
                .patch(routes::update_row::<Task>)
                .delete(routes::delete_row::<Task>),
        )
        .route("/api/v1/changes/{table}/{scope}", get(changes::ws_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn test_app() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(&dir.path().join("api.db"), 3)
            .await
            .unwrap();
        let keys = ApiKeyStore::from_entries([("secret", "ada")]);
        (build_app(AppState::new(store, keys)), dir)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (app, _dir) = test_app().await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_protected_routes_reject_bad_auth() {
        let (app, _dir) = test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/v1/projects")
                    .header("Authorization", "Basic abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "invalid_auth");

        let response = app
            .oneshot(
                Request::get("/api/v1/projects?key=wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "invalid_key");
    }

    #[tokio::test]
    async fn test_query_key_authenticates() {
        let (app, _dir) = test_app().await;
        let response = app
            .oneshot(
                Request::get("/api/v1/me?key=secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["user_id"], "ada");
    }

    #[tokio::test]
    async fn test_unknown_change_table_is_rejected() {
        let (app, _dir) = test_app().await;
        let response = app
            .oneshot(
                Request::get(format!("/api/v1/changes/invoices/{}", uuid::Uuid::new_v4()))
                    .header("Authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_ne!(response.status(), StatusCode::OK);
    }
}
