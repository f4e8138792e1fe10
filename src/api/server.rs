//! API Server
//!
//! Binds the listener, stacks the middleware and serves until a shutdown
//! signal arrives.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::{config::ServerConfig, errors::DiceBankResult, factory::Services};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Install the global tracing subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .try_init();

    if result.is_err() {
        // Already installed, e.g. by a test harness
        warn!("Tracing subscriber already initialized");
    }
}

/// HTTP and WebSocket server
pub struct ApiServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(services: &Services) -> Self {
        Self {
            config: services.config.server.clone(),
            state: Arc::new(AppState::from_services(services)),
        }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self) -> DiceBankResult<()> {
        let addr = self.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;

        info!("🚀 Starting Dicebank API Server");
        info!("   Listen: http://{}", addr);
        self.log_server_info();

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` completes
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> DiceBankResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.create_app();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("🛑 API Server stopped gracefully");
        Ok(())
    }

    /// Router with the full middleware stack
    pub fn create_app(&self) -> axum::Router {
        create_router(self.state.clone())
            // Request ID middleware (first for tracing)
            .layer(axum::middleware::from_fn(request_id_middleware))
            // CORS layer (before timeout to handle preflight)
            .layer(create_cors_layer(self.config.allowed_origins.clone()))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    fn socket_addr(&self) -> std::io::Result<SocketAddr> {
        let ip = self.config.host.parse::<std::net::IpAddr>().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid host {}: {}", self.config.host, e),
            )
        })?;
        Ok(SocketAddr::from((ip, self.config.port)))
    }

    fn log_server_info(&self) {
        info!("📋 Server Configuration:");
        info!("   CORS: {:?}", self.config.allowed_origins);
        info!("   Request timeout: {}s", self.config.request_timeout_secs);
        info!("   Session idle timeout: {:?}", self.state.sessions.idle_timeout());

        info!("📊 Available endpoints:");
        info!("   GET  /health                      - Health check");
        info!("   GET  /metrics                     - Prometheus metrics");
        info!("   GET  /ws/wallet                   - Balance stream");
        info!("   GET  /ws/play                     - Place bets");
        info!("   GET  /ws/end-play                 - Cash in bet balance");
        info!("   POST /player/me/wallet/deposit    - Deposit");
        info!("   POST /player/me/wallet/withdraw   - Withdraw");
    }
}

/// Wait for shutdown signal
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
