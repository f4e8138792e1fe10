//! WebSocket Session Lifecycle
//!
//! Every streaming endpoint runs the same loop: authenticate, then receive
//! one message at a time under an idle timer. The timer is disarmed while a
//! message is being handled and re-armed once the reply is out. If it fires,
//! the session sends a policy-violation close frame and ends; the client
//! must reconnect.
//!
//! Outbound frames go through [`SessionSink`], the single writer of a
//! connection. Event-bus pushes and loop replies both take its lock, so
//! frames never interleave.

use super::models::StatusFrame;
use crate::{
    account::PlayerId,
    auth::{resolve_player, TokenVerifier},
    events::{BalanceEvent, Subscription},
    metrics::Metrics,
    storage::BalanceStore,
};
use async_trait::async_trait;
use axum::{
    extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::Serialize;
use std::{borrow::Cow, pin::Pin, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    sync::{Mutex, MutexGuard},
    time::{Instant, Sleep},
};
use tracing::{debug, info, warn};

pub const AUTH_CLOSE_REASON: &str = "No auth token provided";
pub const TIMEOUT_CLOSE_REASON: &str = "User is Inactive, Timeout Exceeded";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("websocket transport error: {0}")]
    Transport(#[from] axum::Error),
}

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Open,
    Closing,
    Closed,
}

impl SessionState {
    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Open)
                | (Authenticating, Closing)
                | (Open, Closing)
                | (Closing, Closed)
        )
    }

    /// Move to `next` if the lifecycle allows it.
    ///
    /// Repeating the current state is a no-op; any other refused move is
    /// logged and leaves the state unchanged. Returns whether it moved.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if *self == next {
            return false;
        }
        if !self.can_advance_to(next) {
            warn!("Refusing session transition {:?} -> {:?}", self, next);
            return false;
        }
        debug!("Session {:?} -> {:?}", self, next);
        *self = next;
        true
    }
}

type WsSink = SplitSink<WebSocket, Message>;

/// Serialized writer for one connection
#[derive(Clone)]
pub struct SessionSink {
    inner: Arc<Mutex<WsSink>>,
}

impl SessionSink {
    fn new(sink: WsSink) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    /// Hold the writer across several steps
    pub async fn lock(&self) -> MutexGuard<'_, WsSink> {
        self.inner.lock().await
    }

    pub async fn send_json<T: Serialize>(&self, payload: &T) -> Result<(), SessionError> {
        let message = encode(payload)?;
        self.inner.lock().await.send(message).await?;
        Ok(())
    }

    /// Send a close frame; failures are ignored since the peer may be gone
    pub async fn close(&self, code: u16, reason: &'static str) {
        let frame = Message::Close(Some(CloseFrame {
            code,
            reason: Cow::Borrowed(reason),
        }));
        let mut sink = self.inner.lock().await;
        if let Err(e) = sink.send(frame).await {
            debug!("Close frame not delivered: {}", e);
        }
    }
}

/// Encode a payload as a text frame
pub fn encode<T: Serialize>(payload: &T) -> Result<Message, SessionError> {
    Ok(Message::Text(serde_json::to_string(payload)?))
}

/// Resettable idle deadline
pub struct IdleTimer {
    timeout: Duration,
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl IdleTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sleep: Box::pin(tokio::time::sleep(timeout)),
            armed: true,
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Start a fresh full window, replacing any pending deadline
    pub fn rearm(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.timeout);
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Completes when the armed deadline passes; never while disarmed
    pub async fn expired(&mut self) {
        if self.armed {
            self.sleep.as_mut().await;
        } else {
            std::future::pending::<()>().await;
        }
    }
}

/// One authenticated connection
pub struct Session {
    player: PlayerId,
    endpoint: &'static str,
    sink: SessionSink,
    stream: SplitStream<WebSocket>,
    timer: IdleTimer,
    state: SessionState,
    subscription: Option<Subscription<BalanceEvent>>,
    metrics: Arc<Metrics>,
}

impl Session {
    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sink(&self) -> SessionSink {
        self.sink.clone()
    }

    /// Keep `subscription` alive until the session closes
    pub fn attach(&mut self, subscription: Subscription<BalanceEvent>) {
        self.subscription = Some(subscription);
    }

    /// Wait for the next text message.
    ///
    /// Returns `None` once the session is closing: the peer went away, the
    /// transport failed or the idle timer fired.
    pub async fn next_message(&mut self) -> Option<String> {
        while self.state == SessionState::Open {
            tokio::select! {
                _ = self.timer.expired() => {
                    info!(
                        "⏰ Session for player {} on {} idle, closing",
                        self.player, self.endpoint
                    );
                    self.metrics.session_timeouts.inc();
                    self.state.advance(SessionState::Closing);
                    self.sink.close(close_code::POLICY, TIMEOUT_CLOSE_REASON).await;
                }
                frame = self.stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.timer.disarm();
                        return Some(text);
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        self.timer.disarm();
                        return Some(String::from_utf8_lossy(&bytes).into_owned());
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Player {} closed {} session", self.player, self.endpoint);
                        self.state.advance(SessionState::Closing);
                    }
                    Some(Err(e)) => {
                        debug!("Read error on {} session: {}", self.endpoint, e);
                        self.state.advance(SessionState::Closing);
                    }
                },
            }
        }
        None
    }

    /// Send a reply and start a new idle window
    pub async fn reply<T: Serialize>(&mut self, payload: &T) -> Result<(), SessionError> {
        if let Err(e) = self.sink.send_json(payload).await {
            self.state.advance(SessionState::Closing);
            return Err(e);
        }
        self.timer.rearm();
        Ok(())
    }

    /// Start a new idle window without replying
    pub fn keep_alive(&mut self) {
        self.timer.rearm();
    }

    async fn close(mut self) {
        self.state.advance(SessionState::Closing);
        // Stop event pushes before releasing the connection
        self.subscription.take();
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!("Error closing {} socket: {}", self.endpoint, e);
        }
        self.state.advance(SessionState::Closed);
    }
}

/// Endpoint-specific behaviour plugged into the shared loop
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Metrics and log label
    fn endpoint(&self) -> &'static str;

    /// Runs once after authentication, before the first message
    async fn on_open(&self, _session: &mut Session) -> Result<(), SessionError> {
        Ok(())
    }

    async fn on_message(&self, session: &mut Session, text: String) -> Result<(), SessionError>;
}

/// Runs sessions for every streaming endpoint
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn BalanceStore>,
    verifier: Arc<dyn TokenVerifier>,
    idle_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn BalanceStore>,
        verifier: Arc<dyn TokenVerifier>,
        idle_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            verifier,
            idle_timeout,
            metrics,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Accept the upgrade and run `handler` on the resulting socket
    pub fn upgrade<H: SessionHandler>(
        &self,
        ws: WebSocketUpgrade,
        token: Option<String>,
        handler: H,
    ) -> Response {
        let manager = self.clone();
        ws.on_upgrade(move |socket| async move { manager.serve(socket, token, handler).await })
    }

    /// Drive one connection from upgrade to close
    pub async fn serve<H: SessionHandler>(&self, socket: WebSocket, token: Option<String>, handler: H) {
        let endpoint = handler.endpoint();
        let mut state = SessionState::Connecting;
        let (sink, stream) = socket.split();
        let sink = SessionSink::new(sink);

        state.advance(SessionState::Authenticating);
        let player = match resolve_player(
            self.verifier.as_ref(),
            self.store.as_ref(),
            token.as_deref(),
        )
        .await
        {
            Ok(player) => player,
            Err(e) => {
                warn!("🚫 Rejected {} session: {}", endpoint, e);
                if let Err(e) = sink.send_json(&StatusFrame::unauthorized(e.to_string())).await {
                    debug!("Auth failure frame not delivered: {}", e);
                }
                state.advance(SessionState::Closing);
                sink.close(close_code::POLICY, AUTH_CLOSE_REASON).await;
                state.advance(SessionState::Closed);
                return;
            }
        };

        state.advance(SessionState::Open);
        let mut session = Session {
            player,
            endpoint,
            sink,
            stream,
            timer: IdleTimer::new(self.idle_timeout),
            state,
            subscription: None,
            metrics: self.metrics.clone(),
        };
        let gauge = self.metrics.sessions_active.with_label_values(&[endpoint]);
        gauge.inc();
        info!("🔌 Player {} opened {} session", player, endpoint);

        if let Err(e) = handler.on_open(&mut session).await {
            debug!("{} session setup failed: {}", endpoint, e);
            session.state.advance(SessionState::Closing);
        }

        while let Some(text) = session.next_message().await {
            if let Err(e) = handler.on_message(&mut session, text).await {
                debug!("{} session write failed: {}", endpoint, e);
                break;
            }
        }

        session.close().await;
        gauge.dec();
        info!("🔌 Player {} left {} session", player, endpoint);
    }
}
