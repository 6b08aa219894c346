//! giftledger web server and REST API.
//!
//! Provides an Axum-based HTTP server with:
//! - Welcome and health endpoints
//! - Gift-card search, detail and purchase endpoints
//! - Settlement and cancellation endpoints
//! - Company, member and recharge administration

pub mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use giftledger_core::config::AppConfig;
use giftledger_core::ledger::BalanceLedger;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub ledger: Arc<BalanceLedger>,
    pub config: AppConfig,
}

/// Build the full application router with its middleware stack.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .merge(api::status::routes())
        .merge(api::giftcards::routes())
        .merge(api::companies::routes())
        .merge(api::members::routes())
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// The web server.
pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: AppConfig, ledger: Arc<BalanceLedger>) -> Self {
        Self {
            state: Arc::new(AppState { ledger, config }),
        }
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests.
    pub async fn start<F>(self, listen_addr: &str, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = listen_addr.parse()?;
        let app = router(self.state);

        info!(addr = %addr, "starting web server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("web server stopped");
        Ok(())
    }
}
