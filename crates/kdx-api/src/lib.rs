//! KDX API: the `/api/test` and `/api/trpc` endpoints plus `/metrics`
pub mod config;
pub mod contract;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod router;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    middleware::from_fn,
    routing::{any, get},
    Router,
};
use kdx_core::{DataTransformer, SuperJson};
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use metrics::Metrics;
pub use router::ProcedureRouter;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub procedures: Arc<ProcedureRouter>,
    pub metrics: Arc<Metrics>,
    pub transformer: Arc<dyn DataTransformer>,
}

impl AppState {
    pub fn new(procedures: ProcedureRouter) -> anyhow::Result<Self> {
        let metrics = Metrics::new().context("registering metrics")?;
        Ok(Self {
            procedures: Arc::new(procedures),
            metrics: Arc::new(metrics),
            transformer: Arc::new(SuperJson),
        })
    }

    /// Must match the transformer the clients use.
    pub fn with_transformer(mut self, transformer: Arc<dyn DataTransformer>) -> Self {
        self.transformer = transformer;
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/test", any(handlers::api_test))
        .route("/api/trpc/{paths}", any(handlers::trpc))
        .layer(from_fn(middleware::cors));

    Router::new()
        .merge(api)
        .route("/metrics", get(handlers::metrics))
        .layer(from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::new(contract::app_router())?;
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;

    tracing::info!(addr = %config.addr, mode = ?config.mode, "KDX API listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
