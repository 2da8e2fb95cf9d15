//! `ParleyServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use parley_core::RegistryDirectory;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::slots::ConnectionSlots;
use crate::websocket::upgrade;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live groups and their members.
    pub directory: Arc<RegistryDirectory>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator; owns the connection task tracker.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Connection limit and close accounting.
    pub slots: Arc<ConnectionSlots>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for rendering `/metrics`.
    pub metrics_handle: PrometheusHandle,
}

/// The relay server.
pub struct ParleyServer {
    config: Arc<ServerConfig>,
    directory: Arc<RegistryDirectory>,
    shutdown: Arc<ShutdownCoordinator>,
    slots: Arc<ConnectionSlots>,
    start_time: Instant,
    metrics_handle: PrometheusHandle,
}

impl ParleyServer {
    /// Create a new server around a directory shared with its connections.
    pub fn new(
        config: ServerConfig,
        directory: Arc<RegistryDirectory>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            slots: Arc::new(ConnectionSlots::new(config.max_connections)),
            config: Arc::new(config),
            directory,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics_handle,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            directory: self.directory.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            slots: self.slots.clone(),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
        };

        Router::new()
            .route("/signal/{group_code}", get(upgrade::signal_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the listener and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        });

        info!(%addr, "relay listening");
        Ok((addr, handle))
    }

    /// Stop accepting, close every connection and wait for them to drain.
    ///
    /// Returns `true` if all connections finished within the configured
    /// shutdown timeout.
    pub async fn graceful_shutdown(&self) -> bool {
        self.shutdown
            .graceful_shutdown(self.config.shutdown_timeout())
            .await
    }

    /// Get the registry directory.
    pub fn directory(&self) -> &Arc<RegistryDirectory> {
        &self.directory
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Connection slots and close accounting.
    pub fn slots(&self) -> &Arc<ConnectionSlots> {
        &self.slots
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.directory.connection_count(),
        state.directory.group_count(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(&state.metrics_handle),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use parley_core::{ClientId, DuplicatePolicy, Frame, GroupCode, PeerHandle};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    const USER: &str = "8f14e45f-ceea-467f-a5f0-3c2a1b4d5e6f";

    fn make_server(config: ServerConfig) -> ParleyServer {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        ParleyServer::new(config, Arc::new(RegistryDirectory::new()), handle)
    }

    fn seed(server: &ParleyServer, group: &str, id: &str) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(4);
        let handle = Arc::new(PeerHandle::new(ClientId::from(id), tx, &server.shutdown().token()));
        let _ = server
            .directory()
            .join(&GroupCode::from(group), handle, DuplicatePolicy::Replace)
            .unwrap();
        rx
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, parsed)
    }

    #[tokio::test]
    async fn health_endpoint_reports_counts() {
        let server = make_server(ServerConfig::default());
        let _rx1 = seed(&server, "room7", "u1");
        let _rx2 = seed(&server, "room7", "u2");
        let _rx3 = seed(&server, "lobby", "u3");

        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 3);
        assert_eq!(body["groups"], 2);
        assert!(body["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_text() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));
    }

    #[tokio::test]
    async fn invalid_user_is_bad_request() {
        let server = make_server(ServerConfig::default());
        let (status, body) = get_json(server.router(), "/signal/room7?user=not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["msg"], "Not a valid UUID");
    }

    #[tokio::test]
    async fn missing_user_is_bad_request() {
        let server = make_server(ServerConfig::default());
        let (status, body) = get_json(server.router(), "/signal/room7").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["msg"], "Not a valid UUID");
    }

    #[tokio::test]
    async fn duplicate_is_conflict_when_rejecting() {
        let server = make_server(ServerConfig {
            duplicate_policy: DuplicatePolicy::Reject,
            ..ServerConfig::default()
        });
        let _rx = seed(&server, "room7", USER);
        let (status, _) = get_json(server.router(), &format!("/signal/room7?user={USER}")).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn full_server_is_unavailable() {
        let server = make_server(ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        });
        let held = server.slots().try_reserve().unwrap();
        let (status, body) = get_json(server.router(), &format!("/signal/lobby?user={USER}")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["msg"], "Too many connections");

        drop(held);
        let (status, _) = get_json(server.router(), &format!("/signal/lobby?user={USER}")).await;
        assert_ne!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn refused_requests_release_their_slot() {
        let server = make_server(ServerConfig {
            max_connections: 1,
            ..ServerConfig::default()
        });
        for _ in 0..3 {
            let (status, _) =
                get_json(server.router(), &format!("/signal/room7?user={USER}")).await;
            assert!(status.is_client_error());
        }
        assert_eq!(server.slots().live(), 0);
    }

    #[tokio::test]
    async fn shutting_down_is_unavailable() {
        let server = make_server(ServerConfig::default());
        server.shutdown().shutdown();
        let (status, body) = get_json(server.router(), &format!("/signal/room7?user={USER}")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["msg"], "Server shutting down");
    }

    #[tokio::test]
    async fn valid_user_without_upgrade_headers_is_rejected_by_axum() {
        let server = make_server(ServerConfig::default());
        let (status, _) = get_json(server.router(), &format!("/signal/room7?user={USER}")).await;
        assert!(status.is_client_error());
        assert_ne!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server(ServerConfig::default());
        let (status, _) = get_json(server.router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops() {
        let server = make_server(ServerConfig::default());
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        assert!(server.graceful_shutdown().await);
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
