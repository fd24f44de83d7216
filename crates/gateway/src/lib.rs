//! HTTP API for polibrief.
//!
//! Routes:
//!
//! - `POST /accounts/register/`, `POST /accounts/login/`,
//!   `POST /accounts/token/refresh/`
//! - `GET|POST /api/research/{name}/`
//! - `POST|GET /api/chat/chats/`, `DELETE /api/chat/chats/{chat_id}/`,
//!   `GET /api/chat/chats/{chat_id}/qanda/`,
//!   `GET /api/chat/temporary-chats/{chat_id}/`, `POST /api/chat/questions/`
//! - `GET /health`
//!
//! Built on Axum. Layers: body size limit, per-client rate limiting, CORS,
//! and HTTP trace logging.

pub mod accounts;
pub mod auth;
pub mod chat;
pub mod error;
pub mod extract;
pub mod research;
pub mod throttle;

#[cfg(test)]
mod test_support;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, middleware, response::Json, routing::get};
use polibrief_auth::{DEFAULT_ITERATIONS, TokenSigner};
use polibrief_config::{AppConfig, GatewayConfig};
use polibrief_core::{ChatStore, Error, Provider, ReportStore, SourceGatherer, UserStore};
use polibrief_research::{
    AssemblerOptions, ChatService, EmptySourceGatherer, ReportAssembler, ResearchService,
    WebSourceGatherer,
};
use polibrief_store::SqliteStore;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use throttle::Throttle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state.
pub struct AppState {
    pub research: Arc<ResearchService>,
    pub chats: Arc<ChatService>,
    pub users: Arc<dyn UserStore>,
    pub tokens: TokenSigner,
    /// PBKDF2 iterations for new password hashes
    pub password_iterations: u32,
    /// Checked on logins for unknown usernames
    pub decoy_hash: tokio::sync::OnceCell<String>,
    /// `max_age` used when a research request does not give one
    pub default_max_age_days: i64,
    pub gateway: GatewayConfig,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire the services around one store that holds reports, chats, and users.
    pub fn new<S>(
        config: &AppConfig,
        store: Arc<S>,
        provider: Arc<dyn Provider>,
        gatherer: Arc<dyn SourceGatherer>,
    ) -> Result<Self, Error>
    where
        S: ReportStore + ChatStore + UserStore + 'static,
    {
        let tokens = TokenSigner::from_config(&config.auth).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        let assembler = ReportAssembler::new(provider.clone(), gatherer, store.clone())
            .with_options(AssemblerOptions::from(&config.research));
        let research = Arc::new(ResearchService::new(assembler, store.clone()));
        let chats = Arc::new(
            ChatService::new(store.clone(), store.clone(), research.clone(), provider)
                .with_history_limit(config.chat.history_limit)
                .with_default_max_age(config.research.default_max_age_days),
        );

        Ok(Self {
            research,
            chats,
            users: store,
            tokens,
            password_iterations: DEFAULT_ITERATIONS,
            decoy_hash: tokio::sync::OnceCell::new(),
            default_max_age_days: config.research.default_max_age_days,
            gateway: config.gateway.clone(),
        })
    }

    pub fn with_password_iterations(mut self, iterations: u32) -> Self {
        self.password_iterations = iterations;
        self
    }
}

/// Build the production state: SQLite store, configured provider, and the
/// web gatherer when a search endpoint is configured.
pub async fn build_state(config: &AppConfig) -> Result<SharedState, Error> {
    let store = Arc::new(SqliteStore::connect(&config.database.url).await?);
    let provider = polibrief_providers::build_from_config(&config.generation);
    let gatherer = build_gatherer(config)?;
    Ok(Arc::new(AppState::new(config, store, provider, gatherer)?))
}

/// The web gatherer when `sources.search_url` is set, else one that finds nothing.
pub fn build_gatherer(config: &AppConfig) -> Result<Arc<dyn SourceGatherer>, Error> {
    Ok(
        match WebSourceGatherer::from_config(&config.sources, &config.research)? {
            Some(web) => Arc::new(web),
            None => {
                warn!("sources.search_url is not set; research will find no sources");
                Arc::new(EmptySourceGatherer)
            }
        },
    )
}

/// Build the router with every route and layer.
pub fn build_router(state: SharedState) -> Router {
    let gateway = state.gateway.clone();

    let api = Router::new()
        .nest("/accounts", accounts::router())
        .nest("/api/research", research::router())
        .nest("/api/chat", chat::router())
        .route("/health", get(health_handler))
        .with_state(state.clone());

    let mut app = api.layer(DefaultBodyLimit::max(gateway.body_limit_bytes));

    if gateway.rate_limit_per_minute > 0 {
        let throttle = Arc::new(Throttle::per_minute(gateway.rate_limit_per_minute));
        let tokens = state.tokens.clone();
        app = app.layer(middleware::from_fn(move |req, next| {
            throttle::throttle_middleware(throttle.clone(), tokens.clone(), req, next)
        }));
    }

    app.layer(cors_layer(&gateway.allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(parsed))
}

/// Start the HTTP server and run until it stops.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate_for_serving()?;
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let state = build_state(&config).await?;
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

// --- Health ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
