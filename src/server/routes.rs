//! REST handlers. One generic set serves every synced table.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use super::AppState;
use crate::models::{Account, NewProject, Project, WaitlistSignup};
use crate::store::{EntityStore, Snapshot, SqliteBacked, Table};
use crate::waitlist::{join_waitlist, SignupOutcome, SignupStatus};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
pub struct WaitlistRequest {
    email: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    user_agent: Option<String>,
}

#[derive(Serialize)]
pub struct WaitlistResponse {
    status: SignupStatus,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    signup: Option<WaitlistSignup>,
}

/// Public signup form. Joining twice is a success both times.
pub async fn join(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<WaitlistRequest>,
) -> Result<(StatusCode, Json<WaitlistResponse>), ApiError> {
    let user_agent = request.user_agent.or_else(|| {
        headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
    });

    let outcome = join_waitlist(
        &state.store,
        &request.email,
        request.source.as_deref(),
        user_agent,
    )
    .await?;

    let status = match outcome {
        SignupOutcome::Joined(_) => StatusCode::CREATED,
        SignupOutcome::AlreadyJoined => StatusCode::OK,
    };
    let body = WaitlistResponse {
        status: outcome.status(),
        message: outcome.message(),
        signup: match outcome {
            SignupOutcome::Joined(signup) => Some(signup),
            SignupOutcome::AlreadyJoined => None,
        },
    };
    Ok((status, Json(body)))
}

pub(super) async fn account_for(state: &AppState, user: &AuthUser) -> Result<Account, ApiError> {
    Ok(state.store.ensure_account(&user.user_id).await?)
}

/// Fails with 404 unless `scope` of `table` belongs to `account`, so other
/// accounts' ids are indistinguishable from missing ones.
pub(super) async fn authorize_scope(
    state: &AppState,
    account: &Account,
    table: Table,
    scope: Uuid,
) -> Result<(), ApiError> {
    let owned = match table {
        Table::Projects => scope == account.id,
        _ => state
            .store
            .find::<Project>(scope)
            .await?
            .is_some_and(|project| project.account_id == account.id),
    };

    if owned {
        Ok(())
    } else {
        Err(ApiError::not_found(format!(
            "{} {} not found",
            table.scope_name(),
            scope
        )))
    }
}

async fn owned_row<E: SqliteBacked>(
    state: &AppState,
    account: &Account,
    id: Uuid,
) -> Result<E, ApiError> {
    let row = state
        .store
        .find::<E>(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{} {} not found", E::TABLE.singular(), id)))?;
    authorize_scope(state, account, E::TABLE, row.scope_id()).await?;
    Ok(row)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Account>, ApiError> {
    Ok(Json(account_for(&state, &user).await?))
}

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Snapshot<Project>>, ApiError> {
    let account = account_for(&state, &user).await?;
    let snapshot = EntityStore::<Project>::query(&state.store, account.id).await?;
    Ok(Json(snapshot))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(new): Json<NewProject>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let account = account_for(&state, &user).await?;
    let project = EntityStore::<Project>::insert(&state.store, account.id, new).await?;
    tracing::info!("User {} created project {}", user.user_id, project.code);
    Ok((StatusCode::CREATED, Json(project)))
}

/// Rows of one project.
pub async fn list_rows<E: SqliteBacked>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Snapshot<E>>, ApiError> {
    let account = account_for(&state, &user).await?;
    authorize_scope(&state, &account, E::TABLE, project_id).await?;
    let snapshot = EntityStore::<E>::query(&state.store, project_id).await?;
    Ok(Json(snapshot))
}

pub async fn create_row<E: SqliteBacked>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    Json(new): Json<E::New>,
) -> Result<(StatusCode, Json<E>), ApiError> {
    let account = account_for(&state, &user).await?;
    authorize_scope(&state, &account, E::TABLE, project_id).await?;
    let row = EntityStore::<E>::insert(&state.store, project_id, new).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn get_row<E: SqliteBacked>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<E>, ApiError> {
    let account = account_for(&state, &user).await?;
    Ok(Json(owned_row::<E>(&state, &account, id).await?))
}

pub async fn update_row<E: SqliteBacked>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(patch): Json<E::Patch>,
) -> Result<Json<E>, ApiError> {
    let account = account_for(&state, &user).await?;
    owned_row::<E>(&state, &account, id).await?;
    let row = EntityStore::<E>::update(&state.store, id, patch).await?;
    Ok(Json(row))
}

pub async fn delete_row<E: SqliteBacked>(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let account = account_for(&state, &user).await?;
    owned_row::<E>(&state, &account, id).await?;
    EntityStore::<E>::delete(&state.store, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
