//! Webhook / health HTTP surface.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vtb_core::{
    actions::Dispatcher,
    health::{HealthDto, HealthStatus},
    model::IncomingUpdate,
    Result,
};

/// Where the platform delivers updates for this bot.
#[async_trait]
pub trait WebhookRegistry: Send + Sync {
    async fn current_url(&self) -> Result<String>;
    async fn register(&self, url: &str) -> Result<()>;
}

/// Consumer of validated webhook updates.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, update: IncomingUpdate);
}

#[async_trait]
impl UpdateHandler for Dispatcher {
    async fn handle(&self, update: IncomingUpdate) {
        self.dispatch(update).await;
    }
}

/// Rotatable webhook route: `{path}/{id}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookRoute {
    pub path: String,
    pub id: String,
}

impl WebhookRoute {
    pub fn new(host: &str, path: &str, token: &str) -> Self {
        let path = format!("/{}", path.trim_matches('/'));
        Self {
            id: route_id(host, &path, token),
            path,
        }
    }

    pub fn url(&self, host: &str) -> String {
        format!("{}{}/{}", host.trim_end_matches('/'), self.path, self.id)
    }

    fn pattern(&self) -> String {
        format!("{}/{{id}}", self.path)
    }
}

/// First 32 hex chars of sha256(host + path + token).
pub fn route_id(host: &str, path: &str, token: &str) -> String {
    let digest = Sha256::digest(format!("{host}{path}{token}").as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(32);
    hex
}

/// Builds the health document served by `/health` and `/lifecycle`.
pub struct HealthReporter {
    registry: Arc<dyn WebhookRegistry>,
    version: String,
    connected: AtomicBool,
}

impl HealthReporter {
    pub fn new(registry: Arc<dyn WebhookRegistry>, version: impl Into<String>) -> Self {
        Self {
            registry,
            version: version.into(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn set_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> (StatusCode, HealthDto) {
        let mut dto = HealthDto {
            status: HealthStatus::InProgress,
            message: String::new(),
            urls: Vec::new(),
            version: self.version.clone(),
            ssl: "off".to_string(),
        };

        if !self.is_connected() {
            dto.message = "App is not connected to the Telegram server".to_string();
            return (StatusCode::BAD_REQUEST, dto);
        }

        match self.registry.current_url().await {
            Ok(url) => {
                dto.status = HealthStatus::Online;
                dto.message = "App is online".to_string();
                dto.urls = vec![url];
                (StatusCode::OK, dto)
            }
            Err(err) => {
                error!("unable to get bot urls: {err}");
                dto.status = HealthStatus::Error;
                dto.message = "Unable to get bot urls".to_string();
                (StatusCode::BAD_REQUEST, dto)
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<dyn UpdateHandler>,
    pub health: Arc<HealthReporter>,
    pub route: Arc<WebhookRoute>,
}

pub struct BotServer {
    state: AppState,
    registry: Arc<dyn WebhookRegistry>,
}

impl BotServer {
    pub fn new(
        handler: Arc<dyn UpdateHandler>,
        registry: Arc<dyn WebhookRegistry>,
        route: WebhookRoute,
        version: &str,
    ) -> Self {
        let health = Arc::new(HealthReporter::new(registry.clone(), version));
        Self {
            state: AppState {
                handler,
                health,
                route: Arc::new(route),
            },
            registry,
        }
    }

    pub fn health(&self) -> Arc<HealthReporter> {
        self.state.health.clone()
    }

    pub fn router(&self) -> Router {
        let pattern = self.state.route.pattern();
        info!(path = %pattern, "setting up the webhook handler");
        Router::new()
            .route("/", get(handle_root))
            .route("/health", get(handle_health))
            .route("/lifecycle", post(handle_lifecycle))
            .route(&pattern, post(handle_update).get(handle_route_probe))
            .fallback(handle_not_found)
            .with_state(self.state.clone())
    }

    /// Point the platform at this replica and start reporting ONLINE.
    pub async fn apply_host_location(&self, host: &str) -> Result<()> {
        let url = self.state.route.url(host);
        warn!(url = %url, "registering webhook");
        self.registry.register(&url).await?;
        self.state.health.set_connected();
        info!("instance is set as the webhook receiver");
        Ok(())
    }

    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
        let addr = listener
            .local_addr()
            .context("failed to resolve server address")?;
        info!(%addr, "bot server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("bot server exited unexpectedly")?;
        warn!("bot server stopped");
        Ok(())
    }
}

async fn handle_root() -> impl IntoResponse {
    (StatusCode::OK, "The app is running")
}

async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let (code, dto) = state.health.status().await;
    (code, Json(dto))
}

async fn handle_lifecycle(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    warn!(
        body = %String::from_utf8_lossy(&body),
        "received lifecycle hook from the buddy node"
    );
    let (code, dto) = state.health.status().await;
    (code, Json(dto))
}

fn check_route_id(state: &AppState, id: &str, method: &str) {
    if id != state.route.id {
        warn!(
            route_id = id,
            method,
            "wrong route id, perhaps because of the cache on the Telegram side"
        );
    }
}

async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    check_route_id(&state, &id, "POST");

    match IncomingUpdate::parse(&body) {
        Ok(update) => {
            debug!("incoming update validated");
            let handler = state.handler.clone();
            tokio::spawn(async move { handler.handle(update).await });
        }
        Err(err) => error!("incoming update failed validation: {err}"),
    }
    StatusCode::OK
}

async fn handle_route_probe(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    check_route_id(&state, &id, "GET");
    (StatusCode::OK, "Route is enabled")
}

async fn handle_not_found(uri: Uri) -> impl IntoResponse {
    error!(path = %uri, "unknown route");
    (
        StatusCode::NOT_FOUND,
        Json(json!({"status": 404, "message": "Route not found", "error": "Not found"})),
    )
}
