//! HTTP presentation layer
//!
//! Thin axum front end over an [`Aggregator`]: each request runs one
//! aggregation and returns the deduplicated records as JSON.

pub mod handlers;

use crate::aggregator::Aggregator;
use crate::config::ServerConfig;
use crate::error::{ErrorCode, Result, RosterError};
use crate::source::RecordSource;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

/// API server for aggregation endpoints
pub struct ApiServer<S: RecordSource> {
    aggregator: Arc<Aggregator<S>>,
    config: ServerConfig,
}

impl<S: RecordSource> ApiServer<S> {
    pub fn new(aggregator: Arc<Aggregator<S>>, config: ServerConfig) -> Self {
        Self { aggregator, config }
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn start(self) -> Result<()> {
        let addr = self.config.address();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            RosterError::server_with_code(
                ErrorCode::SERVER_BIND_FAILED,
                format!("Failed to bind {}", addr),
            )
            .with_source(e)
        })?;

        info!("Starting aggregation API server on {}", addr);
        serve(listener, self.aggregator).await
    }
}

/// Build the API router
pub fn build_router<S: RecordSource>(aggregator: Arc<Aggregator<S>>) -> Router {
    Router::new()
        .route("/", get(handlers::list_records::<S>))
        .route("/api/v1/aggregate", get(handlers::aggregate::<S>))
        .route("/health", get(handlers::health_check))
        .layer(CorsLayer::permissive())
        .with_state(aggregator)
}

/// Serve the API on an already-bound listener until Ctrl-C
pub async fn serve<S: RecordSource>(
    listener: TcpListener,
    aggregator: Arc<Aggregator<S>>,
) -> Result<()> {
    axum::serve(listener, build_router(aggregator))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            RosterError::server_with_code(ErrorCode::SERVER_GENERIC, "API server failed")
                .with_source(e)
        })
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("Shutdown signal received, stopping API server");
}
