//! HTTP transport: the request/response JSON API.
//!
//! Fixed route table:
//!
//! | Method & Path          | Response                                   |
//! |------------------------|--------------------------------------------|
//! | GET  `/`               | embedded status page (HTML)                |
//! | GET  `/api/logs`       | JSON array of log strings                  |
//! | POST `/api/logs/clear` | `{success, message}`                       |
//! | POST `/api/command`    | `{success, message}`; 400 if command blank |
//! | GET  `/api/status`     | `{fps, ping, tps, mtps}`                   |
//!
//! Every response carries an open cross-origin allow header — this is a
//! no-auth local tool and the page may be served from a different port
//! than the API it polls. Unmatched routes and wrong methods are client
//! errors (404/405, from the router itself); a malformed request body is
//! a 400 with an error envelope, never a crash.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::error;

use relay_core::{CommandOrigin, LogBus, StatusCell, StatusSnapshot, TransportKind};

use crate::application::pipeline::{CommandPipeline, PipelineError};
use crate::infrastructure::listener::{BoundTransport, Transport};

/// The minimal JSON envelope for command/clear responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub command: String,
}

/// State shared by all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub log_bus: Arc<LogBus>,
    pub pipeline: Arc<CommandPipeline>,
    pub status: Arc<StatusCell>,
}

/// Builds the API router. Exposed separately from the transport so tests
/// can drive it with `tower::ServiceExt::oneshot` without a socket.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/logs", get(get_logs))
        .route("/api/logs/clear", post(clear_logs))
        .route("/api/command", post(post_command))
        .route("/api/status", get(get_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP transport over the shared listener manager.
pub struct HttpTransport {
    bind_addr: IpAddr,
    state: ApiState,
}

impl HttpTransport {
    pub fn new(bind_addr: IpAddr, state: ApiState) -> Self {
        Self { bind_addr, state }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::RequestResponse
    }

    async fn bind(
        &self,
        port: u16,
        mut shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<BoundTransport> {
        let listener = TcpListener::bind(SocketAddr::new(self.bind_addr, port)).await?;
        let local_port = listener.local_addr()?.port();
        let app = build_router(self.state.clone());

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            });
            if let Err(e) = serve.await {
                error!("http listener on port {local_port} terminated: {e}");
            }
        });

        Ok(BoundTransport { local_port, task })
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn index() -> Html<&'static str> {
    Html(include_str!("../../assets/index.html"))
}

async fn get_logs(State(state): State<ApiState>) -> Json<Vec<String>> {
    let lines = state
        .log_bus
        .snapshot()
        .into_iter()
        .map(|entry| entry.text)
        .collect();
    Json(lines)
}

async fn clear_logs(State(state): State<ApiState>) -> Json<Envelope> {
    state.log_bus.clear();
    Json(Envelope {
        success: true,
        message: "logs cleared".to_string(),
    })
}

async fn post_command(
    State(state): State<ApiState>,
    body: Result<Json<CommandBody>, JsonRejection>,
) -> (StatusCode, Json<Envelope>) {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(Envelope {
                    success: false,
                    message: format!("invalid request body: {rejection}"),
                }),
            );
        }
    };

    // HTTP requests are request-scoped; they carry a transport label
    // rather than a per-connection session id.
    match state
        .pipeline
        .submit(&body.command, CommandOrigin::Session("http".to_string()))
        .await
    {
        Ok(true) => (
            StatusCode::OK,
            Json(Envelope {
                success: true,
                message: "command executed".to_string(),
            }),
        ),
        Ok(false) => (
            StatusCode::OK,
            Json(Envelope {
                success: false,
                message: "command failed (host unavailable or command rejected)".to_string(),
            }),
        ),
        Err(PipelineError::Blank) => (
            StatusCode::BAD_REQUEST,
            Json(Envelope {
                success: false,
                message: "command must not be blank".to_string(),
            }),
        ),
    }
}

async fn get_status(State(state): State<ApiState>) -> Json<StatusSnapshot> {
    Json(state.status.load())
}
