//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the relay route and health endpoint
//! - Wire up middleware (tracing, request timeout)
//! - Bind server to listener
//! - Close live relays and drain them on shutdown

use axum::{extract::State, routing::{any, get}, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{RelayServerConfig, RelayConfig};
use crate::http::websocket::relay_handler;
use crate::net::tracker::ConnectionTracker;
use crate::relay::Processor;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub processor: Arc<dyn Processor>,
    pub tracker: ConnectionTracker,
    /// Flipped to true once the server starts shutting down.
    pub shutdown: Arc<watch::Sender<bool>>,
}

/// HTTP server hosting the relay endpoint.
pub struct HttpServer {
    router: Router,
    config: RelayServerConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: RelayServerConfig, processor: Arc<dyn Processor>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let state = AppState {
            config: Arc::new(config.relay.clone()),
            processor,
            tracker: ConnectionTracker::new(),
            shutdown: Arc::new(shutdown),
        };

        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RelayServerConfig, state: AppState) -> Router {
        let path = config.relay.path.as_str();
        let nested = format!("{}/{{*rest}}", path.trim_end_matches('/'));

        let mut router = Router::new().route("/health", get(health_handler));
        if path != "/health" {
            router = router.route(path, any(relay_handler));
        }
        router
            .route(&nested, any(relay_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    /// Router with state applied, for serving or in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Live relay counter shared with every socket task.
    pub fn tracker(&self) -> ConnectionTracker {
        self.state.tracker.clone()
    }

    /// Run the server until `shutdown` fires, then close and drain relays.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            path = %self.config.relay.path,
            "HTTP server starting"
        );

        let relays = Arc::clone(&self.state.shutdown);
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, closing relays");
                relays.send_replace(true);
            })
            .await?;

        let drain = Duration::from_secs(self.config.timeouts.drain_secs);
        if self.state.tracker.wait_for_drain(drain).await {
            tracing::info!("All relays drained");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayServerConfig {
        &self.config
    }
}

/// Liveness probe with the number of open relays.
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "active_relays": state.tracker.active_count(),
    }))
}
