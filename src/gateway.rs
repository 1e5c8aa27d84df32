//! JSON HTTP surface over the pairing service.
//!
//! A thin request/response layer: every handler delegates to
//! [`PairingService`] and maps its results onto status codes.
//!
//! ```text
//! POST   /sessions                 --> create_session()
//! GET    /sessions/{code}          --> session_status()
//! GET    /sessions/{code}/artifact --> fetch_artifact()
//! DELETE /sessions/{code}          --> revoke()
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::error::{GatewayError, SessionError};
use crate::pairing::PairingService;

/// Body returned with every non-success status.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    /// Whether polling again may succeed.
    retry: bool,
}

fn error_response(status: StatusCode, error: &SessionError) -> Response {
    let body = ErrorBody {
        error: error.to_string(),
        retry: error.is_retryable(),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match &self {
            SessionError::NotFound { .. } | SessionError::ArtifactNotReady { .. } => {
                StatusCode::NOT_FOUND
            }
            SessionError::CodeSpaceExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, &self)
    }
}

/// Build the gateway router over a shared service.
pub fn router(service: Arc<PairingService>) -> Router {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{code}", get(session_status).delete(revoke_session))
        .route("/sessions/{code}/artifact", get(fetch_artifact))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn create_session(State(service): State<Arc<PairingService>>) -> Response {
    match service.create_session().await {
        Ok(ticket) => (StatusCode::CREATED, Json(ticket)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create pairing session");
            e.into_response()
        }
    }
}

async fn session_status(
    State(service): State<Arc<PairingService>>,
    Path(code): Path<String>,
) -> Response {
    match service.session_status(&code).await {
        Some(view) => Json(view).into_response(),
        None => SessionError::NotFound { code }.into_response(),
    }
}

async fn fetch_artifact(
    State(service): State<Arc<PairingService>>,
    Path(code): Path<String>,
) -> Response {
    match service.fetch_artifact(&code).await {
        Ok(document) => Json(document).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn revoke_session(
    State(service): State<Arc<PairingService>>,
    Path(code): Path<String>,
) -> Response {
    match service.revoke(&code).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => SessionError::NotFound { code }.into_response(),
        Err(e) => {
            // The session is gone either way; report the cleanup failure.
            tracing::warn!(code = %code, error = %e, "Revoke left storage behind");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}

/// Configuration for the gateway server.
pub struct GatewayConfig {
    /// Address to bind the server to.
    pub addr: SocketAddr,
}

/// HTTP server hosting the gateway router.
///
/// `start()` binds the listener and spawns the server task; `shutdown()`
/// signals graceful shutdown and waits for it.
pub struct GatewayServer {
    config: GatewayConfig,
    router: Option<Router>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl GatewayServer {
    /// Create a new server for `service`.
    pub fn new(config: GatewayConfig, service: Arc<PairingService>) -> Self {
        Self {
            config,
            router: Some(router(service)),
            local_addr: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Bind the listener and spawn the server.
    pub async fn start(&mut self) -> Result<SocketAddr, GatewayError> {
        let app = self.router.take().unwrap_or_default();

        let listener = tokio::net::TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| GatewayError::Bind {
                addr: self.config.addr.to_string(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| GatewayError::Bind {
            addr: self.config.addr.to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!("Pairing gateway listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("Pairing gateway shutting down");
                })
                .await
            {
                tracing::error!("Pairing gateway error: {}", e);
            }
        });

        self.handle = Some(handle);
        Ok(local_addr)
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::link::SimulatedLinkClient;
    use crate::pairing::{CodeAllocator, SessionStore, SweeperConfig};

    fn service(root: &std::path::Path) -> Arc<PairingService> {
        Arc::new(PairingService::new(
            SessionStore::new(root, CodeAllocator::default()),
            Arc::new(SimulatedLinkClient::new()),
            SweeperConfig {
                ttl: Duration::from_secs(60),
                interval: Duration::from_secs(3600),
                enabled: true,
            },
        ))
    }

    async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_create_then_query() {
        let dir = TempDir::new().unwrap();
        let app = router(service(dir.path()));

        let (status, ticket) = send(app.clone(), Method::POST, "/sessions").await;
        assert_eq!(status, StatusCode::CREATED);
        let code = ticket["code"].as_str().unwrap().to_string();
        assert_eq!(ticket["status_url"], format!("/sessions/{}", code));

        let (status, view) = send(app, Method::GET, &format!("/sessions/{}", code)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["code"], code.as_str());
        assert_eq!(view["artifact_ready"], false);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let dir = TempDir::new().unwrap();
        let app = router(service(dir.path()));

        let (status, body) = send(app.clone(), Method::GET, "/sessions/000000").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["retry"], false);

        let (status, _) = send(app, Method::DELETE, "/sessions/000000").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pending_artifact_asks_to_retry() {
        let dir = TempDir::new().unwrap();
        let app = router(service(dir.path()));
        let (_, ticket) = send(app.clone(), Method::POST, "/sessions").await;
        let code = ticket["code"].as_str().unwrap();

        let (status, body) =
            send(app, Method::GET, &format!("/sessions/{}/artifact", code)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["retry"], true);
    }

    #[tokio::test]
    async fn test_delete_revokes_session() {
        let dir = TempDir::new().unwrap();
        let app = router(service(dir.path()));
        let (_, ticket) = send(app.clone(), Method::POST, "/sessions").await;
        let code = ticket["code"].as_str().unwrap();

        let (status, _) = send(app.clone(), Method::DELETE, &format!("/sessions/{}", code)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(app, Method::GET, &format!("/sessions/{}", code)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_and_shutdown_lifecycle() {
        let dir = TempDir::new().unwrap();
        let mut server = GatewayServer::new(
            GatewayConfig {
                addr: "127.0.0.1:0".parse().unwrap(),
            },
            service(dir.path()),
        );
        let addr = server.start().await.expect("server should start on port 0");
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));
        server.shutdown().await;
        assert!(server.handle.is_none());
        assert!(server.shutdown_tx.is_none());
    }

    #[tokio::test]
    async fn test_start_on_occupied_port_returns_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let occupied_addr = listener.local_addr().unwrap();

        let dir = TempDir::new().unwrap();
        let mut server = GatewayServer::new(
            GatewayConfig {
                addr: occupied_addr,
            },
            service(dir.path()),
        );
        match server.start().await {
            Err(GatewayError::Bind { reason, .. }) => assert!(!reason.is_empty()),
            other => panic!("expected Bind error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_when_not_started_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut server = GatewayServer::new(
            GatewayConfig {
                addr: "127.0.0.1:0".parse().unwrap(),
            },
            service(dir.path()),
        );
        server.shutdown().await;
    }
}
