//! Route Definitions
//!
//! Maps URLs to handlers.

use super::{
    handlers::*,
    websocket::{end_play_ws_handler, play_ws_handler, wallet_ws_handler},
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        // Streaming endpoints
        .route("/ws/wallet", get(wallet_ws_handler))
        .route("/ws/play", get(play_ws_handler))
        .route("/ws/end-play", get(end_play_ws_handler))
        // Wallet transfers
        .route("/player/me/wallet/deposit", post(deposit_handler))
        .route("/player/me/wallet/withdraw", post(withdraw_handler))
        .with_state(state)
}
