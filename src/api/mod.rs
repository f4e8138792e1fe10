//! Dicebank API Service
//!
//! HTTP wallet endpoints and the streaming WebSocket endpoints for balance
//! updates, betting and cash-in.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod session;
pub mod websocket;

pub use server::ApiServer;
