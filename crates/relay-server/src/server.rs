use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_auth::TokenVerifier;
use relay_core::{vendor_room, ConnectionId, JobId, Outbound, ServerEvent};
use relay_store::Database;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tower_http::cors::CorsLayer;

use crate::client::{self, ConnectionRegistry};
use crate::event_bridge;
use crate::handlers::{self, HandlerState};

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9092,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub registry: Arc<ConnectionRegistry>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub frame_tx: mpsc::Sender<(ConnectionId, String)>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/jobs/{job_id}/offer", post(offer_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle holding the listen port
/// and the background tasks.
pub async fn start(
    config: ServerConfig,
    db: Database,
    verifier: Arc<dyn TokenVerifier>,
    event_tx: broadcast::Sender<Outbound>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ConnectionRegistry::new(config.max_send_queue));

    // Start event bridge
    let bridge_rx = event_tx.subscribe();
    let bridge_handle = event_bridge::create_bridge(Arc::clone(&registry), bridge_rx);

    // Start dead-connection cleanup task (every 60s)
    let _cleanup = client::start_cleanup_task(
        Arc::clone(&registry),
        std::time::Duration::from_secs(60),
    );

    // Inbound frame channel, drained by a single processor
    let (frame_tx, frame_rx) = mpsc::channel::<(ConnectionId, String)>(1024);

    let handler_state = Arc::new(HandlerState::new(db, Arc::clone(&registry), event_tx));

    let app_state = AppState {
        handler_state: Arc::clone(&handler_state),
        registry: Arc::clone(&registry),
        verifier,
        frame_tx,
    };

    let frames_handle = tokio::spawn(process_frames(frame_rx, Arc::clone(&handler_state)));

    let router = build_router(app_state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "relay server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
        _bridge: bridge_handle,
        _frames: frames_handle,
        _cleanup,
    })
}

/// Handle returned by `start()`; holds the background task handles.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _bridge: tokio::task::JoinHandle<()>,
    _frames: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// WebSocket upgrade handler. The credential rides in the query string.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query.token, state))
}

/// Handle a new WebSocket connection.
///
/// A missing or unverifiable credential leaves the connection open but
/// anonymous; it can watch, not mutate.
async fn handle_socket(socket: WebSocket, token: Option<String>, state: AppState) {
    let identity = token
        .as_deref()
        .and_then(|credential| state.verifier.verify(credential));

    let (conn, rx) = state.registry.register(identity);
    let connection_id = conn.id.clone();
    let authenticated = conn.identity.is_some();

    // A verified vendor always hears its own live stream
    if let Some(vendor_id) = conn.vendor_id() {
        state
            .registry
            .join_room(&connection_id, &vendor_room(&vendor_id));
    }

    tracing::info!(
        connection_id = %connection_id,
        authenticated,
        "websocket connected"
    );

    state.registry.send_event(
        &connection_id,
        &ServerEvent::ConnectionReady {
            connection_id: connection_id.clone(),
            authenticated,
        },
    );

    client::handle_ws_connection(socket, connection_id, rx, state.registry, state.frame_tx).await;
}

/// Health check HTTP endpoint. Degraded when the database stops answering.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state
        .handler_state
        .db
        .with_conn(|conn| {
            conn.execute_batch("SELECT 1")?;
            Ok(true)
        })
        .unwrap_or(false);

    let http_status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(serde_json::json!({
            "status": if db_ok { "healthy" } else { "degraded" },
            "connections": state.registry.count(),
        })),
    )
}

/// Offer a job to its destination zone. Idempotent: re-offering a waiting
/// job rebroadcasts it, offering a taken or unknown job does nothing.
async fn offer_handler(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let job_id = JobId::from_raw(job_id);
    match state.handler_state.engine.offer(&job_id) {
        Ok(true) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"offered": true})),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"offered": false})),
        ),
        Err(error) => {
            tracing::warn!(job_id = %job_id, %error, "offer failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"offered": false})),
            )
        }
    }
}

/// Drain inbound frames in arrival order. A single consumer keeps each
/// connection's frames strictly ordered.
async fn process_frames(mut rx: mpsc::Receiver<(ConnectionId, String)>, state: Arc<HandlerState>) {
    while let Some((connection_id, raw)) = rx.recv().await {
        handlers::handle_frame(&state, &connection_id, &raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_auth::SealedTokenVerifier;
    use relay_store::jobs::JobRepo;

    fn verifier() -> Arc<dyn TokenVerifier> {
        Arc::new(SealedTokenVerifier::from_secret("server-test-secret"))
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let db = Database::in_memory().unwrap();
        let (event_tx, _) = broadcast::channel(64);

        let config = ServerConfig {
            port: 0, // random port
            ..Default::default()
        };

        let handle = start(config, db, verifier(), event_tx).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn offer_endpoint_maps_outcomes_to_status_codes() {
        let db = Database::in_memory().unwrap();
        let (event_tx, _) = broadcast::channel(64);
        let job = JobRepo::new(db.clone()).create("560001").unwrap();

        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        let handle = start(config, db, verifier(), event_tx).await.unwrap();
        let client = reqwest::Client::new();

        let url = format!("http://127.0.0.1:{}/jobs/{}/offer", handle.port, job.id);
        let resp = client.post(&url).send().await.unwrap();
        assert_eq!(resp.status(), 202);

        let url = format!("http://127.0.0.1:{}/jobs/job_missing/offer", handle.port);
        let resp = client.post(&url).send().await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn build_router_creates_routes() {
        let db = Database::in_memory().unwrap();
        let (event_tx, _) = broadcast::channel(64);
        let registry = Arc::new(ConnectionRegistry::new(32));
        let handler_state = Arc::new(HandlerState::new(db, Arc::clone(&registry), event_tx));
        let (frame_tx, _) = mpsc::channel(32);

        let state = AppState {
            handler_state,
            registry,
            verifier: verifier(),
            frame_tx,
        };

        let _router = build_router(state);
    }
}
