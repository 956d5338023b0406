//! `LiveviewServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{ServerConfig, SessionConfig};
use crate::health::{self, HealthResponse};
use crate::registry::SessionRegistry;
use crate::session::SessionFactory;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::websocket::connection::{ConnectionContext, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Per-connection wiring.
    pub connection: ConnectionContext,
    /// Max inbound WebSocket message size.
    pub max_message_size: usize,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Page shell served at the page path.
    pub page: Option<Arc<str>>,
}

/// The liveview server.
pub struct LiveviewServer {
    config: ServerConfig,
    session_config: SessionConfig,
    factory: Arc<dyn SessionFactory>,
    registry: Arc<SessionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    page: Option<Arc<str>>,
    start_time: Instant,
}

impl LiveviewServer {
    /// Create a server that builds each connection's session with `factory`.
    pub fn new(
        config: ServerConfig,
        session_config: SessionConfig,
        factory: impl SessionFactory + 'static,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        Self {
            config,
            session_config,
            factory: Arc::new(factory),
            shutdown: Arc::new(ShutdownCoordinator::new(Arc::clone(&registry))),
            registry,
            metrics: None,
            page: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Serve `html` at the configured page path.
    #[must_use]
    pub fn with_page(mut self, html: impl Into<Arc<str>>) -> Self {
        self.page = Some(html.into());
        self
    }

    /// Use an existing registry instead of a private one.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.shutdown = Arc::new(ShutdownCoordinator::new(Arc::clone(&registry)));
        self.registry = registry;
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            connection: ConnectionContext {
                factory: Arc::clone(&self.factory),
                registry: Arc::clone(&self.registry),
                session: self.session_config.clone(),
                outbound_buffer: self.config.outbound_buffer,
            },
            max_message_size: self.config.max_message_size,
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            page: self.page.clone(),
        };

        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route(&self.config.ws_path, get(ws_handler));
        if self.page.is_some() {
            router = router.route(&self.config.page_path, get(page_handler));
        }
        router.with_state(state).layer(TraceLayer::new_for_http())
    }

    /// Bind the listener and serve until shutdown is requested.
    ///
    /// Returns the bound address. The serving task is owned by the shutdown
    /// coordinator, which waits for it in [`LiveviewServer::close`].
    pub async fn listen(&self) -> std::io::Result<SocketAddr> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, ws_path = %self.config.ws_path, "liveview server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        });
        self.shutdown.track(handle);
        Ok(local_addr)
    }

    /// Stop accepting connections, tear down every live session and wait
    /// for the listener to finish.
    pub async fn close(&self) -> ShutdownReport {
        self.shutdown.shutdown().await
    }

    /// Get the session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the session configuration.
    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.connection.registry.len();
    Json(health::health_check(state.start_time, sessions))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET page path
async fn page_handler(State(state): State<AppState>) -> Response {
    match &state.page {
        Some(page) => Html(page.to_string()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET ws path: upgrade and run one session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, state.connection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::EventComponent;
    use crate::session::SessionSpec;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server() -> LiveviewServer {
        LiveviewServer::new(ServerConfig::default(), SessionConfig::default(), || {
            SessionSpec::new(EventComponent::markup("<p>hi</p>"))
        })
    }

    async fn get(app: Router, uri: &str) -> Response {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().port, 3000);
        assert_eq!(server.config().ws_path, "/ws_goliveview");
        assert!(server.registry().is_empty());
    }

    #[test]
    fn shutdown_coordinator_accessible() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let resp = get(make_server().router(), "/health").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["active_sessions"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_absent_without_recorder() {
        let resp = get(make_server().router(), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_served_with_handle() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let resp = get(make_server().with_metrics(handle).router(), "/metrics").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(
            resp.headers()[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }

    #[tokio::test]
    async fn page_served_when_configured() {
        let app = make_server().with_page("<html>shell</html>").router();
        let resp = get(app, "/").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        assert_eq!(&body[..], b"<html>shell</html>");
    }

    #[tokio::test]
    async fn page_absent_by_default() {
        let resp = get(make_server().router(), "/").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_path_requires_upgrade() {
        let resp = get(make_server().router(), "/ws_goliveview").await;
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let resp = get(make_server().router(), "/nonexistent").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn close_triggers_shutdown() {
        let server = make_server();
        let report = server.close().await;
        assert_eq!(report.sessions_closed, 0);
        assert!(!report.timed_out);
        assert!(server.shutdown().is_shutting_down());
    }
}
