//! Bearer token authentication
//!
//! Tokens are `<player id>.<expires unix seconds>.<hex signature>`, signed
//! with an ed25519 key derived from the configured secret. Verification
//! resolves a token to a player id; `resolve_player` additionally requires
//! that player to exist in the balance store.

use crate::{account::PlayerId, errors::StoreError, storage::BalanceStore};
use axum::http::{header::AUTHORIZATION, HeaderMap};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization token missing")]
    MissingToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    Expired,

    #[error("player not found")]
    UnknownPlayer,
}

/// Resolves bearer credentials to players
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<PlayerId, AuthError>;
}

/// Issues and verifies signed player tokens
pub struct SignedTokenAuthority {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    ttl: Duration,
}

impl SignedTokenAuthority {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let seed: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            ttl,
        }
    }

    pub fn issue(&self, player: PlayerId) -> String {
        self.issue_at(player, unix_now() + self.ttl.as_secs())
    }

    fn issue_at(&self, player: PlayerId, expires: u64) -> String {
        let claims = format!("{}.{}", player, expires);
        let signature = self.signing_key.sign(claims.as_bytes());
        format!("{}.{}", claims, hex::encode(signature.to_bytes()))
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }
}

impl TokenVerifier for SignedTokenAuthority {
    fn verify(&self, token: &str) -> Result<PlayerId, AuthError> {
        let mut parts = token.trim().splitn(3, '.');
        let (Some(id), Some(expires), Some(signature)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidToken);
        };

        let id: u64 = id.parse().map_err(|_| AuthError::InvalidToken)?;
        let expires: u64 = expires.parse().map_err(|_| AuthError::InvalidToken)?;
        let signature = hex::decode(signature).map_err(|_| AuthError::InvalidToken)?;
        let signature = Signature::from_slice(&signature).map_err(|_| AuthError::InvalidToken)?;

        let claims = format!("{}.{}", id, expires);
        self.verifying_key
            .verify(claims.as_bytes(), &signature)
            .map_err(|_| AuthError::InvalidToken)?;

        if expires <= unix_now() {
            return Err(AuthError::Expired);
        }
        Ok(PlayerId(id))
    }
}

/// Token from an `Authorization: Bearer ...` header
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve an optional credential to an existing player
pub async fn resolve_player(
    verifier: &dyn TokenVerifier,
    store: &dyn BalanceStore,
    token: Option<&str>,
) -> Result<PlayerId, AuthError> {
    let token = token.ok_or(AuthError::MissingToken)?;
    let player = verifier.verify(token)?;
    match store.load_account(player).await {
        Ok(_) => Ok(player),
        Err(StoreError::PlayerNotFound(_)) => Err(AuthError::UnknownPlayer),
        Err(e) => {
            tracing::warn!("Player lookup failed during authentication: {}", e);
            Err(AuthError::UnknownPlayer)
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
