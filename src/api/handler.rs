use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::*;
use crate::{
    distribution::{export_template, parse, Distributor},
    error::{AppResult, RegistryError},
    identity::{CooldownTracker, IdentityRegistry, SessionManager},
    ledger::LedgerApi,
    middleware::{Actor, ValidatedJson},
};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<IdentityRegistry>,
    pub ledger: Arc<dyn LedgerApi>,
    pub distributor: Arc<Distributor>,
    pub sessions: Arc<SessionManager>,
    pub cooldowns: Arc<CooldownTracker>,
    pub admin_token: Arc<str>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        identities: state.registry.len().await,
    })
}

/// The caller's own linked id
/// GET /identity
pub async fn get_identity(
    State(state): State<AppState>,
    Actor(user_id): Actor,
) -> AppResult<Json<IdentityResponse>> {
    let external_account_id = state
        .registry
        .get(&user_id)
        .await
        .ok_or_else(|| RegistryError::NotFound(user_id.clone()))?;

    Ok(Json(IdentityResponse {
        local_user_id: user_id,
        external_account_id,
    }))
}

/// DELETE /identity
pub async fn remove_identity(
    State(state): State<AppState>,
    Actor(user_id): Actor,
) -> AppResult<Json<RemovedResponse>> {
    let external_account_id = state.registry.remove(&user_id).await?;
    Ok(Json(RemovedResponse {
        local_user_id: user_id,
        external_account_id,
    }))
}

/// Open a submission for `set` / `edit`
/// POST /identity/session
pub async fn start_session(
    State(state): State<AppState>,
    Actor(user_id): Actor,
    Json(request): Json<StartSessionRequest>,
) -> AppResult<Json<SessionResponse>> {
    let now = Utc::now();
    state.cooldowns.try_acquire(&user_id, now)?;

    let reply = state
        .sessions
        .start(&user_id, request.kind, &state.registry, now)
        .await?;

    Ok(Json(SessionResponse::new(request.kind, reply)))
}

/// POST /identity/session/message
pub async fn session_message(
    State(state): State<AppState>,
    Actor(user_id): Actor,
    ValidatedJson(request): ValidatedJson<SessionMessageRequest>,
) -> AppResult<Json<SessionResponse>> {
    let (kind, reply) = state
        .sessions
        .submit(&user_id, &request.content, &state.registry, Utc::now())
        .await?;

    if reply.is_terminal() {
        info!("Submission for {} finished: {:?}", user_id, reply);
    }
    Ok(Json(SessionResponse::new(kind, reply)))
}

/// The `view` command: resolve the caller's wallet and read its balances
/// GET /account
pub async fn view_account(
    State(state): State<AppState>,
    Actor(user_id): Actor,
) -> AppResult<Json<AccountSummary>> {
    let external_account_id = state
        .registry
        .get(&user_id)
        .await
        .ok_or_else(|| RegistryError::NotFound(user_id.clone()))?;

    let wallet = state.ledger.resolve_wallet(&external_account_id).await?;
    let balance = state.ledger.fetch_balance(&wallet).await?;

    Ok(Json(AccountSummary {
        local_user_id: user_id,
        external_account_id,
        wallet: wallet.to_string(),
        balance,
    }))
}

/// GET /admin/identities
pub async fn list_identities(State(state): State<AppState>) -> Json<IdentityListResponse> {
    let identities: Vec<IdentityResponse> = state
        .registry
        .list()
        .await
        .into_iter()
        .map(IdentityResponse::from)
        .collect();

    Json(IdentityListResponse {
        count: identities.len(),
        identities,
    })
}

/// Batch template of every registered id, amounts zeroed
/// GET /admin/identities/export
pub async fn export_identities(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let records = state.registry.list().await;
    let csv = export_template(&records)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"epic_ids_list.csv\"",
            ),
        ],
        csv,
    ))
}

/// DELETE /admin/identities/:user_id
pub async fn admin_remove_identity(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<RemovedResponse>> {
    let external_account_id = state.registry.remove(&user_id).await?;
    warn!("Admin removed identity of user {}", user_id);
    Ok(Json(RemovedResponse {
        local_user_id: user_id,
        external_account_id,
    }))
}

/// GET /admin/pool
pub async fn get_pool_balance(State(state): State<AppState>) -> AppResult<Json<PoolResponse>> {
    let balance = state.distributor.pool_balance().await?;
    Ok(Json(PoolResponse {
        wallet: state.distributor.pool_wallet().to_string(),
        balance,
    }))
}

/// Distribute resources from an uploaded CSV body
/// POST /admin/distribute
pub async fn distribute(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<DistributionResponse>> {
    let batch = parse(&body)?;
    let snapshot = state.registry.snapshot().await;

    info!(
        "📦 Distribution requested: {} entries against {} identities",
        batch.len(),
        snapshot.len()
    );

    let report = state.distributor.run(&batch, &snapshot).await?;
    Ok(Json(DistributionResponse::from(report)))
}
