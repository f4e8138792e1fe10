//! Configuration management with validation and defaults
//!
//! Values come from defaults, then an optional TOML file, then the
//! environment variables the service has always been deployed with.

use crate::errors::ConfigError;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tracing::info;

/// Full service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceBankConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub game: GameConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            // Must exceed the processing duration
            request_timeout_secs: 30,
        }
    }
}

/// Balance store settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_directory: String,
    /// Keep balances in memory only (nothing survives a restart)
    pub in_memory: bool,
    /// Insert the demo players when the store is empty
    pub seed_demo_players: bool,
    /// Clear every persisted betting flag at boot
    pub release_stale_locks_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: "./DB/dicebank_data".to_string(),
            in_memory: false,
            seed_demo_players: true,
            release_stale_locks_on_start: false,
        }
    }
}

/// Streaming session settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 10_000,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Betting rules
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub win_multiplier: f64,
    /// Minimum settlement latency of every money-moving operation
    pub processing_duration_ms: u64,
    /// Forced dice outcome for testing
    pub rigged_dice_number: Option<u8>,
    pub deposit_ceiling: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            win_multiplier: 1.0,
            processing_duration_ms: 1_000,
            rigged_dice_number: None,
            deposit_ceiling: 1_000_000.0,
        }
    }
}

impl GameConfig {
    pub fn processing_duration(&self) -> Duration {
        Duration::from_millis(self.processing_duration_ms)
    }

    pub fn win_multiplier_decimal(&self) -> Decimal {
        Decimal::from_f64(self.win_multiplier).unwrap_or(Decimal::ONE)
    }

    pub fn deposit_ceiling_decimal(&self) -> Decimal {
        Decimal::from_f64(self.deposit_ceiling).unwrap_or(Decimal::ZERO)
    }
}

/// Bearer token settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token_secret: String,
    pub token_ttl_hours: f64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: "dicebank-development-secret".to_string(),
            token_ttl_hours: 15.0,
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.token_ttl_hours.max(0.0) * 3600.0)
    }
}

/// Log filter used when RUST_LOG is not set
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "dicebank=info,tower_http=info".to_string(),
        }
    }
}

impl DiceBankConfig {
    /// Load a TOML file on top of the defaults
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    ///
    /// Durations are given in (fractional) seconds; `RIGGED_DICE_NUMBER=0`
    /// means "not forced".
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            let port = port.trim().trim_start_matches(':');
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::invalid("PORT", port, "not a port number"))?;
        }

        if let Some(path) = lookup("DICEBANK_DB_PATH") {
            self.storage.data_directory = path;
        }

        if let Some(raw) = lookup("RIGGED_DICE_NUMBER") {
            let value: u8 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("RIGGED_DICE_NUMBER", &raw, "not an integer"))?;
            self.game.rigged_dice_number = (value != 0).then_some(value);
        }

        if let Some(raw) = lookup("WINNING_MULTIPLIER") {
            self.game.win_multiplier = parse_f64("WINNING_MULTIPLIER", &raw)?;
        }

        if let Some(raw) = lookup("SOCKET_TIMEOUT_DURATION") {
            self.session.idle_timeout_ms = seconds_to_millis("SOCKET_TIMEOUT_DURATION", &raw)?;
        }

        if let Some(raw) = lookup("PROCESSING_DURATION") {
            self.game.processing_duration_ms = seconds_to_millis("PROCESSING_DURATION", &raw)?;
        }

        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.token_secret = secret;
        }

        if let Some(raw) = lookup("JWT_DURATION_IN_HOURS") {
            self.auth.token_ttl_hours = parse_f64("JWT_DURATION_IN_HOURS", &raw)?;
        }

        Ok(())
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.idle_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "session.idle_timeout_ms",
                self.session.idle_timeout_ms,
                "must be > 0",
            ));
        }

        // A request answered by the timeout layer may still have committed
        if self.game.processing_duration() >= Duration::from_secs(self.server.request_timeout_secs) {
            return Err(ConfigError::invalid(
                "game.processing_duration_ms",
                self.game.processing_duration_ms,
                "must be shorter than server.request_timeout_secs",
            ));
        }

        if !(self.game.win_multiplier.is_finite() && self.game.win_multiplier > 0.0) {
            return Err(ConfigError::invalid(
                "game.win_multiplier",
                self.game.win_multiplier,
                "must be > 0",
            ));
        }

        if let Some(n) = self.game.rigged_dice_number {
            if !(1..=6).contains(&n) {
                return Err(ConfigError::invalid(
                    "game.rigged_dice_number",
                    n,
                    "must be between 1 and 6",
                ));
            }
        }

        if !(self.game.deposit_ceiling.is_finite() && self.game.deposit_ceiling > 0.0) {
            return Err(ConfigError::invalid(
                "game.deposit_ceiling",
                self.game.deposit_ceiling,
                "must be > 0",
            ));
        }

        if self.auth.token_secret.is_empty() {
            return Err(ConfigError::invalid("auth.token_secret", "", "must not be empty"));
        }

        if !(self.auth.token_ttl_hours.is_finite() && self.auth.token_ttl_hours > 0.0) {
            return Err(ConfigError::invalid(
                "auth.token_ttl_hours",
                self.auth.token_ttl_hours,
                "must be > 0",
            ));
        }

        Ok(())
    }

    /// Log the effective configuration (secret redacted)
    pub fn log_summary(&self) {
        info!("📋 Configuration loaded:");
        info!("   Listen: {}:{}", self.server.host, self.server.port);
        if self.storage.in_memory {
            info!("   Storage: in-memory");
        } else {
            info!("   Storage: {}", self.storage.data_directory);
        }
        info!("   Rigged dice number: {:?}", self.game.rigged_dice_number);
        info!("   Winning multiplier: {}", self.game.win_multiplier);
        info!("   Socket idle timeout: {}ms", self.session.idle_timeout_ms);
        info!("   Processing duration: {}ms", self.game.processing_duration_ms);
        info!("   Token secret: <redacted, {} bytes>", self.auth.token_secret.len());
        info!("   Token lifetime: {}h", self.auth.token_ttl_hours);
    }
}

fn parse_f64(field: &str, raw: &str) -> Result<f64, ConfigError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::invalid(field, raw, "not a number"))
}

fn seconds_to_millis(field: &str, raw: &str) -> Result<u64, ConfigError> {
    let secs = parse_f64(field, raw)?;
    if !(secs.is_finite() && secs >= 0.0) {
        return Err(ConfigError::invalid(field, raw, "must be a non-negative number of seconds"));
    }
    Decimal::from_f64(secs * 1000.0)
        .and_then(|ms| ms.round().to_u64())
        .ok_or_else(|| ConfigError::invalid(field, raw, "out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = DiceBankConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(10));
        assert_eq!(config.game.processing_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = DiceBankConfig::default();
        config
            .apply_overrides(lookup(&[
                ("PORT", ":9090"),
                ("RIGGED_DICE_NUMBER", "4"),
                ("WINNING_MULTIPLIER", "2"),
                ("SOCKET_TIMEOUT_DURATION", "2.5"),
                ("PROCESSING_DURATION", "0"),
                ("JWT_SECRET", "s3cret"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.game.rigged_dice_number, Some(4));
        assert_eq!(config.game.win_multiplier, 2.0);
        assert_eq!(config.session.idle_timeout_ms, 2_500);
        assert_eq!(config.game.processing_duration_ms, 0);
        assert_eq!(config.auth.token_secret, "s3cret");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rigged_zero_means_not_forced() {
        let mut config = DiceBankConfig::default();
        config.game.rigged_dice_number = Some(3);
        config
            .apply_overrides(lookup(&[("RIGGED_DICE_NUMBER", "0")]))
            .unwrap();
        assert_eq!(config.game.rigged_dice_number, None);
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let mut config = DiceBankConfig::default();
        let err = config
            .apply_overrides(lookup(&[("WINNING_MULTIPLIER", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("WINNING_MULTIPLIER"));
    }

    #[test]
    fn test_invalid_config_validation() {
        let mut config = DiceBankConfig::default();
        config.session.idle_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = DiceBankConfig::default();
        config.game.rigged_dice_number = Some(7);
        assert!(config.validate().is_err());

        let mut config = DiceBankConfig::default();
        config.game.win_multiplier = 0.0;
        assert!(config.validate().is_err());

        let mut config = DiceBankConfig::default();
        config.auth.token_secret.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_processing_must_finish_before_request_timeout() {
        let mut config = DiceBankConfig::default();
        config.server.request_timeout_secs = 1;
        config.game.processing_duration_ms = 2_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("game.processing_duration_ms"));

        config.game.processing_duration_ms = 1_000;
        assert!(config.validate().is_err());

        config.game.processing_duration_ms = 999;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_sections() {
        let config = DiceBankConfig::from_toml_str(
            r#"
            [server]
            port = 3000

            [game]
            win_multiplier = 2.0
            rigged_dice_number = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.game.win_multiplier_decimal(), Decimal::new(2, 0));
        assert_eq!(config.game.rigged_dice_number, Some(2));
        assert_eq!(config.session.idle_timeout_ms, 10_000);
    }
}
