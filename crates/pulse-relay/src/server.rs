//! `RelayServer` — the embeddable fan-out subsystem.
//!
//! The hosting process owns the listener and authentication; it mounts
//! [`RelayServer::router`] wherever it serves HTTP and installs an
//! [`AuthedUser`] extension on the relay routes. The relay never reads
//! credentials itself.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;

use pulse_core::UserId;
use pulse_store::NotificationStore;

use crate::config::RelayConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::health::{self, HealthResponse};
use crate::metrics as relay_metrics;
use crate::presence::PresenceMonitor;
use crate::registry::ConnectionRegistry;
use crate::router::RoomRouter;
use crate::shutdown::ShutdownCoordinator;
use crate::transport::{poll, socket, stream};

/// The authenticated user for a relay request, installed as a request
/// extension by the hosting server's auth layer.
#[derive(Clone, Debug)]
pub struct AuthedUser(pub UserId);

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay policy knobs.
    pub config: RelayConfig,
    /// Live connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Room router.
    pub router: Arc<RoomRouter>,
    /// Notification dispatcher.
    pub dispatcher: Arc<NotificationDispatcher>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the relay started.
    pub start_time: Instant,
    /// Prometheus render handle, when the host installed the recorder.
    pub metrics: Option<PrometheusHandle>,
}

/// The fan-out subsystem: registry, router, dispatcher, presence monitor,
/// and the axum surface that exposes them.
pub struct RelayServer {
    config: RelayConfig,
    registry: Arc<ConnectionRegistry>,
    router: Arc<RoomRouter>,
    dispatcher: Arc<NotificationDispatcher>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a relay over the given store.
    #[must_use]
    pub fn new(config: RelayConfig, store: Arc<dyn NotificationStore>) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        // Connection cancel tokens are children of the shutdown token, so one
        // shutdown() drains every live session.
        let registry = Arc::new(ConnectionRegistry::new(
            config.max_connections,
            shutdown.token(),
        ));
        let router = Arc::new(RoomRouter::new(registry.clone()));
        let dispatcher = Arc::new(NotificationDispatcher::new(store, router.clone()));
        Self {
            config,
            registry,
            router,
            dispatcher,
            shutdown,
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Attach a Prometheus handle so `/metrics` renders the host's recorder.
    #[must_use]
    pub fn with_metrics_handle(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Start the presence monitor sweep loop.
    pub fn spawn_presence_monitor(&self) -> tokio::task::JoinHandle<()> {
        PresenceMonitor::new(self.router.clone(), self.config.clone())
            .spawn(self.shutdown.token())
    }

    /// Build the axum router with all relay routes.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = AppState {
            config: self.config.clone(),
            registry: self.registry.clone(),
            router: self.router.clone(),
            dispatcher: self.dispatcher.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(socket::ws_handler))
            .route("/events", get(stream::stream_handler))
            .route("/poll", get(poll::poll_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }

    /// The notification dispatcher, for the host's HTTP layer.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// The room router.
    #[must_use]
    pub fn room_router(&self) -> &Arc<RoomRouter> {
        &self.router
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The relay configuration.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.registry.len(),
        state.router.room_count(),
    );
    Json(resp)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(relay_metrics::render)
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
