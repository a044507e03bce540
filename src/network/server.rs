//! HTTP Game Server
//!
//! axum router over the turn engine. Handlers decode bodies, run the
//! engine operation on a spawned task and map errors to status codes.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

use crate::core::error::ErrorClass;
use crate::core::hash::{etag_matches, to_etag};
use crate::game::action::{Action, ActionError};
use crate::game::claim::{ClaimError, ClaimRequest};
use crate::game::engine::Engine;
use crate::game::snapshot::SnapshotError;
use crate::game::state::ProvinceId;
use crate::network::protocol::{
    ActionBody, ClaimBody, ErrorBody, StatusBody, SubmitBody, Submission,
};
use crate::store::StoreError;

/// Port used when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 5000;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// JSON state file. None selects the in-memory store.
    pub state_path: Option<PathBuf>,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            state_path: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    ///
    /// `BIND_HOST`, `PORT`, `GAME_STATE_PATH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let host = match lookup("BIND_HOST").filter(|v| !v.trim().is_empty()) {
            Some(raw) => raw
                .trim()
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidHost(raw))?,
            None => config.bind_addr.ip(),
        };
        let port = match lookup("PORT").filter(|v| !v.trim().is_empty()) {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };
        config.bind_addr = SocketAddr::new(host, port);

        config.state_path = lookup("GAME_STATE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `BIND_HOST` is not an IP address.
    #[error("invalid BIND_HOST: {0:?}")]
    InvalidHost(String),
    /// `PORT` is not a port number.
    #[error("invalid PORT: {0:?}")]
    InvalidPort(String),
}

// =============================================================================
// ERRORS
// =============================================================================

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Serving connections failed.
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// An error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    conflicts: Option<Vec<ProvinceId>>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            conflicts: None,
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }

    /// HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    pub fn code(&self) -> &'static str {
        self.code
    }
}

fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::Conflict | ErrorClass::Concurrency => StatusCode::CONFLICT,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let code = match e.class() {
            ErrorClass::Persistence => "persistence",
            ErrorClass::Concurrency => "concurrent_modification",
            ErrorClass::NotFound => "player_not_found",
            ErrorClass::Conflict => "already_exists",
            ErrorClass::Validation => "invalid_request",
        };
        Self::new(status_for(e.class()), code, e.to_string())
    }
}

impl From<ClaimError> for ApiError {
    fn from(e: ClaimError) -> Self {
        let message = e.to_string();
        match e {
            ClaimError::AlreadyExists(_) => Self::new(StatusCode::BAD_REQUEST, "already_exists", message),
            ClaimError::InvalidSelection(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_selection", message)
            }
            ClaimError::ProvinceConflict(ids) => Self {
                conflicts: Some(ids),
                ..Self::new(StatusCode::CONFLICT, "province_conflict", message)
            },
            ClaimError::Store(e) => e.into(),
        }
    }
}

impl From<ActionError> for ApiError {
    fn from(e: ActionError) -> Self {
        let message = e.to_string();
        match e {
            ActionError::PlayerNotFound(_) => Self::new(StatusCode::NOT_FOUND, "player_not_found", message),
            ActionError::AlreadyMoved(_) => Self::new(StatusCode::FORBIDDEN, "already_moved", message),
            ActionError::UnknownAction(_) => Self::new(StatusCode::BAD_REQUEST, "unknown_action", message),
            ActionError::InvalidAction(_) => Self::new(StatusCode::BAD_REQUEST, "invalid_action", message),
            ActionError::ConcurrentModification(_) => {
                Self::new(StatusCode::CONFLICT, "concurrent_modification", message)
            }
            ActionError::Store(e) => e.into(),
        }
    }
}

impl From<SnapshotError> for ApiError {
    fn from(e: SnapshotError) -> Self {
        Self::new(status_for(e.class()), "store_unavailable", e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, code = self.code, message = %self.message, "request failed");
        } else {
            warn!(status = %self.status, code = self.code, message = %self.message, "request refused");
        }
        let body = ErrorBody {
            error: self.message,
            code: self.code,
            conflicts: self.conflicts,
        };
        (self.status, Json(body)).into_response()
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

type AppState = Arc<Engine>;

/// Run an engine operation to completion even if the client goes away.
async fn run_detached<F, T>(operation: F) -> Result<T, ApiError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| ApiError::internal(format!("engine task failed: {e}")))
}

/// Build the application router.
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/game", get(get_game))
        .route("/claim", post(claim))
        .route("/action", post(action))
        .route("/submit", post(submit))
        .route("/clear", post(clear))
        .with_state(engine)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "service": "conquest-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn get_game(State(engine): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let state = engine.snapshot().await?;
    let bytes = state
        .to_json()
        .map_err(|e| ApiError::internal(format!("failed to encode snapshot: {e}")))?;
    let digest = state
        .digest()
        .map_err(|e| ApiError::internal(format!("failed to hash snapshot: {e}")))?;
    let etag = HeaderValue::from_str(&to_etag(&digest))
        .map_err(|e| ApiError::internal(format!("invalid etag: {e}")))?;

    let unchanged = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| etag_matches(value, &digest));
    if unchanged {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::ETAG, etag),
        ],
        bytes,
    )
        .into_response())
}

#[instrument(skip_all)]
async fn claim(
    State(engine): State<AppState>,
    body: Result<Json<ClaimBody>, JsonRejection>,
) -> Result<Json<StatusBody>, ApiError> {
    let Json(body) = body?;
    run_claim(engine, body.into()).await
}

#[instrument(skip_all)]
async fn action(
    State(engine): State<AppState>,
    body: Result<Json<ActionBody>, JsonRejection>,
) -> Result<Json<StatusBody>, ApiError> {
    let Json(body) = body?;
    run_action(engine, body.player_id, body.action).await
}

#[instrument(skip_all)]
async fn submit(
    State(engine): State<AppState>,
    body: Result<Json<SubmitBody>, JsonRejection>,
) -> Result<Json<StatusBody>, ApiError> {
    let Json(body) = body?;
    match body
        .into_submission()
        .map_err(|e| ApiError::invalid_request(e.to_string()))?
    {
        Submission::Claim(request) => run_claim(engine, request).await,
        Submission::Action { player_id, action } => run_action(engine, player_id, action).await,
    }
}

async fn clear(State(engine): State<AppState>) -> Result<Json<StatusBody>, ApiError> {
    run_detached(async move { engine.clear().await }).await??;
    Ok(Json(StatusBody::CLEARED))
}

async fn run_claim(engine: AppState, request: ClaimRequest) -> Result<Json<StatusBody>, ApiError> {
    run_detached(async move { engine.claim(request).await }).await??;
    Ok(Json(StatusBody::OK))
}

async fn run_action(
    engine: AppState,
    player_id: crate::game::state::PlayerId,
    action: Option<serde_json::Value>,
) -> Result<Json<StatusBody>, ApiError> {
    let action = Action::from_json(action)?;
    run_detached(async move { engine.apply(&player_id, &action).await }).await??;
    Ok(Json(StatusBody::OK))
}

// =============================================================================
// SERVER
// =============================================================================

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Shared engine.
    engine: Arc<Engine>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
    /// Receiver created with the channel, so a signal sent before `run`
    /// subscribes is still seen.
    shutdown_rx: Mutex<Option<broadcast::Receiver<()>>>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, engine: Arc<Engine>) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        Self {
            config,
            engine,
            shutdown_tx,
            shutdown_rx: Mutex::new(Some(shutdown_rx)),
        }
    }

    /// Run the server until [`GameServer::shutdown`] is called, then
    /// close the engine's store.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let mut shutdown_rx = self
            .shutdown_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .unwrap_or_else(|| self.shutdown_tx.subscribe());

        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(GameServerError::BindFailed)?;
        info!("Game server v{} listening on {}", self.config.version, self.config.bind_addr);

        axum::serve(listener, router(self.engine.clone()))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Shutdown signal received");
            })
            .await
            .map_err(GameServerError::Serve)?;

        self.engine.close().await?;
        info!("Game server stopped");
        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::store::{MemoryStore, PlayerStore};
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    fn engine() -> AppState {
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
        Arc::new(Engine::new(Arc::new(MemoryStore::new()), Arc::new(clock)))
    }

    fn body<T: serde::de::DeserializeOwned>(value: Value) -> Result<Json<T>, JsonRejection> {
        Ok(Json(serde_json::from_value(value).unwrap()))
    }

    async fn read_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn claim_one(engine: &AppState) {
        claim(
            State(engine.clone()),
            body(json!({"playerId": "1", "capital": "P1", "others": ["P2", "P3"]})),
        )
        .await
        .unwrap();
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 5000);
        assert!(config.state_path.is_none());
    }

    #[test]
    fn test_server_config_from_lookup() {
        let config = ServerConfig::from_lookup(|key| match key {
            "PORT" => Some("8088".into()),
            "BIND_HOST" => Some("127.0.0.1".into()),
            "GAME_STATE_PATH" => Some("/tmp/game_state.json".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8088".parse().unwrap());
        assert_eq!(config.state_path, Some(PathBuf::from("/tmp/game_state.json")));

        let empty_path = ServerConfig::from_lookup(|key| (key == "GAME_STATE_PATH").then(String::new)).unwrap();
        assert!(empty_path.state_path.is_none());

        let bad = ServerConfig::from_lookup(|key| (key == "PORT").then(|| "eighty".to_string()));
        assert!(matches!(bad, Err(ConfigError::InvalidPort(_))));
    }

    #[tokio::test]
    async fn test_claim_then_game() {
        let engine = engine();
        claim_one(&engine).await;

        let response = get_game(State(engine), HeaderMap::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(header::ETAG));
        let json = read_json(response).await;
        assert_eq!(json["version"], 1);
        assert_eq!(json["players"]["1"]["armyPosition"], "P1");
        assert_eq!(json["players"]["1"]["gold"], 500);
    }

    #[tokio::test]
    async fn test_game_not_modified() {
        let engine = engine();
        claim_one(&engine).await;

        let first = get_game(State(engine.clone()), HeaderMap::new()).await.unwrap();
        let etag = first.headers()[header::ETAG].clone();

        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, etag);
        let second = get_game(State(engine), headers).await.unwrap();
        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_claim_error_statuses() {
        let engine = engine();
        claim_one(&engine).await;

        let conflict = claim(
            State(engine.clone()),
            body(json!({"playerId": "2", "capital": "P2", "others": ["P4", "P5"]})),
        )
        .await
        .unwrap_err();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        let json = read_json(conflict.into_response()).await;
        assert_eq!(json["code"], "province_conflict");
        assert_eq!(json["conflicts"], json!(["P2"]));

        let exists = claim(
            State(engine.clone()),
            body(json!({"playerId": "1", "capital": "Q1", "others": ["Q2", "Q3"]})),
        )
        .await
        .unwrap_err();
        assert_eq!(exists.status(), StatusCode::BAD_REQUEST);
        assert_eq!(exists.code(), "already_exists");

        let invalid = claim(
            State(engine),
            body(json!({"playerId": "3", "others": ["Q2", "Q3"]})),
        )
        .await
        .unwrap_err();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.code(), "invalid_selection");
    }

    #[tokio::test]
    async fn test_action_error_statuses() {
        let engine = engine();
        claim_one(&engine).await;

        let move_army = json!({"playerId": "1", "action": {"type": "moveArmy", "toProvince": "P4", "armyPower": 1500}});
        action(State(engine.clone()), body(move_army.clone())).await.unwrap();

        let again = action(State(engine.clone()), body(move_army)).await.unwrap_err();
        assert_eq!(again.status(), StatusCode::FORBIDDEN);
        assert_eq!(again.code(), "already_moved");

        let missing = action(State(engine.clone()), body(json!({"playerId": "9", "action": {"type": "idle"}})))
            .await
            .unwrap_err();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let unknown = action(State(engine), body(json!({"playerId": "1", "action": {"type": "teleport"}})))
            .await
            .unwrap_err();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown.code(), "unknown_action");
    }

    #[tokio::test]
    async fn test_submit_claim_and_action() {
        let engine = engine();
        submit(
            State(engine.clone()),
            body(json!({
                "player_id": 1, "type": "claim_start_provinces",
                "capital": "P1", "others": ["P2", "P3"]
            })),
        )
        .await
        .unwrap();

        submit(
            State(engine.clone()),
            body(json!({"player_id": 1, "action": {"type": "captureProvince", "province": "P1"}})),
        )
        .await
        .unwrap();

        let state = engine.snapshot().await.unwrap();
        let view = &state.players[&crate::game::state::PlayerId::new("1")];
        assert_eq!(view.provinces.others.len(), 2);
        assert!(view.last_move_date.is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let engine = engine();
        claim_one(&engine).await;

        let Json(status) = clear(State(engine.clone())).await.unwrap();
        assert_eq!(status, StatusBody::CLEARED);
        assert!(engine.snapshot().await.unwrap().players.is_empty());
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = Arc::new(GameServer::new(config, engine()));
        let running = server.clone();
        let handle = tokio::spawn(async move { running.run().await });

        server.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_run() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = GameServer::new(config, engine());
        server.shutdown();
        server.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_closes_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = Arc::new(crate::store::JsonFileStore::open(&path).await.unwrap());
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
        let engine = Arc::new(Engine::new(store, Arc::new(clock)));
        claim_one(&engine).await;

        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            state_path: Some(path.clone()),
            ..Default::default()
        };
        let server = GameServer::new(config, engine);
        server.shutdown();
        server.run().await.unwrap();

        let reopened = crate::store::JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_all().await.unwrap().len(), 1);
    }
}
