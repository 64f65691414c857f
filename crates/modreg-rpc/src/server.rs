//! HTTP server implementation using Axum.

use crate::handlers::{handle_health, handle_rpc, ReplayEntry};
use axum::{
    routing::{get, post},
    Router,
};
use mini_moka::sync::Cache;
use module_registry::ModuleRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// How long an idempotent outcome stays replayable.
const REPLAY_TTL: Duration = Duration::from_secs(15 * 60);
/// Upper bound on remembered idempotency keys.
const REPLAY_CAPACITY: u64 = 10_000;
/// Requests served at once; registry calls serialize on the database anyway.
const MAX_CONCURRENT_REQUESTS: usize = 64;

/// Application state shared across handlers.
pub struct AppState {
    pub registry: Arc<ModuleRegistry>,
    /// `(method, idempotency_key) -> (params fingerprint, outcome)`
    pub replays: Cache<(String, String), ReplayEntry>,
}

impl AppState {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            replays: Cache::builder()
                .time_to_live(REPLAY_TTL)
                .max_capacity(REPLAY_CAPACITY)
                .build(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/rpc", post(handle_rpc))
        .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENT_REQUESTS))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the JSON-RPC HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    registry: ModuleRegistry,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    let app = router(Arc::new(AppState::new(registry)));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use module_registry::Address;

    #[tokio::test]
    async fn test_server_starts() {
        let registry = ModuleRegistry::builder()
            .owner(Address::from_bytes([1; 20]))
            .open_in_memory()
            .unwrap();

        let addr = start_server(registry, "127.0.0.1", 0).await.unwrap();
        assert!(addr.port() > 0);
    }
}
