//! Request Handlers
//!
//! HTTP handlers and the shared application state.

use super::{
    errors::ApiError,
    middleware::RequestId,
    models::*,
    session::SessionManager,
};
use crate::{
    account::PlayerId,
    auth::{extract_bearer, resolve_player, TokenVerifier},
    events::{BalanceEvent, EventBus},
    factory::Services,
    metrics::Metrics,
    operations::BettingOperations,
    storage::BalanceStore,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub operations: Arc<BettingOperations>,
    pub store: Arc<dyn BalanceStore>,
    pub bus: Arc<EventBus<BalanceEvent>>,
    pub auth: Arc<dyn TokenVerifier>,
    pub sessions: SessionManager,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn from_services(services: &Services) -> Self {
        let auth: Arc<dyn TokenVerifier> = services.auth.clone();
        Self {
            operations: services.operations.clone(),
            store: services.store.clone(),
            bus: services.bus.clone(),
            sessions: SessionManager::new(
                services.store.clone(),
                auth.clone(),
                services.config.session.idle_timeout(),
                services.metrics.clone(),
            ),
            auth,
            metrics: services.metrics.clone(),
        }
    }

    async fn authenticate(&self, request_id: &RequestId, headers: &HeaderMap) -> Result<PlayerId, ApiError> {
        resolve_player(self.auth.as_ref(), self.store.as_ref(), extract_bearer(headers))
            .await
            .map_err(|e| ApiError::unauthorized(request_id.0.clone(), e))
    }
}

/// Health check handler
/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
    })
}

/// Prometheus metrics
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.to_prometheus_format(),
    )
}

/// Add funds to the wallet
/// POST /player/me/wallet/deposit
pub async fn deposit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WalletResponse>, ApiError> {
    let player = state.authenticate(&request_id, &headers).await?;

    let request: DepositRequest = serde_json::from_slice(&body).map_err(|_| {
        ApiError::bad_request(request_id.0.clone(), "Request is missing data (amountToDeposit)")
    })?;
    let amount = money_from_f64(request.amount_to_deposit).ok_or_else(|| {
        ApiError::bad_request(request_id.0.clone(), "Request is missing data (amountToDeposit)")
    })?;

    let receipt = state
        .operations
        .deposit(player, amount)
        .await
        .map_err(|e| ApiError::from_operation(request_id.0.clone(), e))?;

    Ok(Json(WalletResponse::deposit(receipt)))
}

/// Take funds out of the wallet
/// POST /player/me/wallet/withdraw
pub async fn withdraw_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WalletResponse>, ApiError> {
    let player = state.authenticate(&request_id, &headers).await?;

    let request: WithdrawRequest = serde_json::from_slice(&body).map_err(|_| {
        ApiError::bad_request(request_id.0.clone(), "Request is missing data (amountToWithdraw)")
    })?;
    let amount = money_from_f64(request.amount_to_withdraw).ok_or_else(|| {
        ApiError::bad_request(request_id.0.clone(), "Request is missing data (amountToWithdraw)")
    })?;

    let receipt = state
        .operations
        .withdraw(player, amount)
        .await
        .map_err(|e| ApiError::from_operation(request_id.0.clone(), e))?;

    Ok(Json(WalletResponse::withdrawal(receipt)))
}
