//! WebSocket Endpoints
//!
//! - `/ws/wallet`: balance snapshot on open, then a push per committed
//!   balance change for the player
//! - `/ws/play`: place bets
//! - `/ws/end-play`: cash the bet balance back into the wallet
//!
//! Browsers cannot set headers on an upgrade request, so the bearer token
//! may also come as a `token` query parameter.

use super::{
    handlers::AppState,
    models::{
        parse_frame, BalancePush, CashInFrame, PlaceBetFrame, PlayReply, StatusFrame,
        WalletSnapshot,
    },
    session::{encode, Session, SessionError, SessionHandler},
};
use crate::{
    auth::extract_bearer,
    events::{balance_topic, BalanceEvent, EventBus},
    operations::BettingOperations,
    storage::BalanceStore,
};
use async_trait::async_trait;
use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::HeaderMap,
    response::Response,
};
use futures_util::SinkExt;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// WebSocket query parameters
#[derive(Debug, Default, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

fn credential(headers: &HeaderMap, query: WsAuthQuery) -> Option<String> {
    extract_bearer(headers).map(str::to_string).or(query.token)
}

/// Balance subscription session
pub struct WalletFeed {
    store: Arc<dyn BalanceStore>,
    bus: Arc<EventBus<BalanceEvent>>,
}

#[async_trait]
impl SessionHandler for WalletFeed {
    fn endpoint(&self) -> &'static str {
        "wallet"
    }

    async fn on_open(&self, session: &mut Session) -> Result<(), SessionError> {
        let player = session.player();
        let sink = session.sink();

        // Pushes queue behind this lock until the snapshot is out
        let mut writer = sink.lock().await;

        let push_sink = session.sink();
        let subscription = self.bus.subscribe_scoped(balance_topic(player), move |event| {
            let sink = push_sink.clone();
            async move {
                if let Err(e) = sink.send_json(&BalancePush::from(event)).await {
                    debug!("Balance push to player {} dropped: {}", player, e);
                }
            }
        });
        session.attach(subscription);

        let account = match self.store.load_account(player).await {
            Ok(account) => account,
            Err(e) => {
                warn!("Wallet snapshot for player {} failed: {}", player, e);
                let frame = StatusFrame {
                    code: 500,
                    message: e.to_string(),
                    errors_list: None,
                };
                writer.send(encode(&frame)?).await?;
                return Ok(());
            }
        };
        writer.send(encode(&WalletSnapshot::from(&account))?).await?;
        Ok(())
    }

    async fn on_message(&self, session: &mut Session, _text: String) -> Result<(), SessionError> {
        session.keep_alive();
        Ok(())
    }
}

/// Place-bet session
pub struct PlaySession {
    operations: Arc<BettingOperations>,
}

#[async_trait]
impl SessionHandler for PlaySession {
    fn endpoint(&self) -> &'static str {
        "play"
    }

    async fn on_message(&self, session: &mut Session, text: String) -> Result<(), SessionError> {
        let frame = match parse_frame(&text) {
            Ok(frame) => PlaceBetFrame::from_frame(&frame),
            Err(_) => return session.reply(&StatusFrame::invalid_json()).await,
        };

        let reply = match self
            .operations
            .place_bet(session.player(), frame.bet_type.as_deref(), frame.bet_amount)
            .await
        {
            Ok(result) => PlayReply::success(result),
            Err(e) => PlayReply::failure(&e),
        };
        session.reply(&reply).await
    }
}

/// Cash-in session
pub struct CashInSession {
    operations: Arc<BettingOperations>,
}

#[async_trait]
impl SessionHandler for CashInSession {
    fn endpoint(&self) -> &'static str {
        "end_play"
    }

    async fn on_message(&self, session: &mut Session, text: String) -> Result<(), SessionError> {
        let frame = match parse_frame(&text) {
            Ok(frame) => CashInFrame::from_frame(&frame),
            Err(_) => return session.reply(&StatusFrame::invalid_json()).await,
        };

        let reply = match self
            .operations
            .cash_in(session.player(), frame.cash_in_amount)
            .await
        {
            Ok(_) => StatusFrame::cash_in_success(),
            Err(e) => StatusFrame::failure("Error cashing bet balance, check error list", &e),
        };
        session.reply(&reply).await
    }
}

/// GET /ws/wallet
pub async fn wallet_ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<WsAuthQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let handler = WalletFeed {
        store: state.store.clone(),
        bus: state.bus.clone(),
    };
    state.sessions.upgrade(ws, credential(&headers, query), handler)
}

/// GET /ws/play
pub async fn play_ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<WsAuthQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let handler = PlaySession {
        operations: state.operations.clone(),
    };
    state.sessions.upgrade(ws, credential(&headers, query), handler)
}

/// GET /ws/end-play
pub async fn end_play_ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<WsAuthQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let handler = CashInSession {
        operations: state.operations.clone(),
    };
    state.sessions.upgrade(ws, credential(&headers, query), handler)
}
