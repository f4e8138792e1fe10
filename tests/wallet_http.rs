//! HTTP wallet endpoint tests driven through the router

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use dicebank::{api::ApiServer, DiceBankConfig, MemoryBalanceStore, PlayerId, Services};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const ALICE: PlayerId = PlayerId(1);
const CHARLIE: PlayerId = PlayerId(3);

async fn app() -> (Router, Services) {
    let mut config = DiceBankConfig::default();
    config.storage.in_memory = true;
    config.game.processing_duration_ms = 0;
    let services = Services::with_store(config, Arc::new(MemoryBalanceStore::new()))
        .await
        .unwrap();
    let app = ApiServer::new(&services).create_app();
    (app, services)
}

fn post(path: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = call(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "Running"}));
}

#[tokio::test]
async fn test_deposit_and_withdraw() {
    let (app, services) = app().await;
    let token = services.auth.issue(ALICE);

    let (status, body) = call(
        app.clone(),
        post("/player/me/wallet/deposit", Some(&token), r#"{"amountToDeposit": 100}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Deposit successful");
    assert_eq!(body["amount"], 100.0);
    assert_eq!(body["newBalance"], 600.0);

    let (status, body) = call(
        app,
        post("/player/me/wallet/withdraw", Some(&token), r#"{"amountToWithdraw": 50.5}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Withdrawal successful");
    assert_eq!(body["newBalance"], 549.5);

    let alice = services.store.load_account(ALICE).await.unwrap();
    assert_eq!(alice.wallet, Decimal::new(5495, 1));
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let (app, _) = app().await;
    let (status, body) = call(
        app,
        post("/player/me/wallet/deposit", None, r#"{"amountToDeposit": 100}"#),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "authorization token missing");
}

#[tokio::test]
async fn test_missing_amount_is_bad_request() {
    let (app, services) = app().await;
    let token = services.auth.issue(ALICE);

    let (status, body) = call(
        app.clone(),
        post("/player/me/wallet/deposit", Some(&token), r#"{"amount": 100}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Request is missing data (amountToDeposit)");

    let (status, body) = call(
        app,
        post("/player/me/wallet/withdraw", Some(&token), "not json"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Request is missing data (amountToWithdraw)");
}

#[tokio::test]
async fn test_amount_rules() {
    let (app, services) = app().await;
    let token = services.auth.issue(ALICE);

    let (status, body) = call(
        app.clone(),
        post("/player/me/wallet/deposit", Some(&token), r#"{"amountToDeposit": 0}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Deposit must be above 0");

    let (status, _) = call(
        app.clone(),
        post("/player/me/wallet/deposit", Some(&token), r#"{"amountToDeposit": 1000000.01}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        app,
        post("/player/me/wallet/withdraw", Some(&token), r#"{"amountToWithdraw": 500.01}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Insufficient funds for withdrawal");

    let alice = services.store.load_account(ALICE).await.unwrap();
    assert_eq!(alice.wallet, Decimal::new(500, 0));
}

#[tokio::test]
async fn test_player_mid_bet_gets_conflict() {
    let (app, services) = app().await;
    let token = services.auth.issue(CHARLIE);

    let (status, body) = call(
        app.clone(),
        post("/player/me/wallet/deposit", Some(&token), r#"{"amountToDeposit": 10}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Cannot deposit while player is in Betting Process");

    let (status, body) = call(
        app,
        post("/player/me/wallet/withdraw", Some(&token), r#"{"amountToWithdraw": 10}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Cannot withdraw while player is in Betting Process");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (app, _) = app().await;
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}
