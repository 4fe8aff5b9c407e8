// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::filter_store::FilterStore;
use crate::application::orchestrator::ChartOrchestrator;
use crate::infrastructure::config::load_console_config;
use crate::infrastructure::http_backend::HttpQueryBackend;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    chart_events, clear_filter, get_chart, get_filters, health_check, list_charts, refresh_chart,
    register_chart, render_query, unregister_chart, update_filters,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chart_pipeline=info,tower_http=info")),
        )
        .init();

    let config = load_console_config()?;

    // Backend (infrastructure layer)
    let backend = HttpQueryBackend::new(
        &config.backend.base_url,
        &config.backend.exec_path,
        config.backend.timeout(),
    )?;
    tracing::info!(exec_url = backend.exec_url(), "query backend configured");

    // Orchestrator (application layer)
    let filters = FilterStore::default();
    let orchestrator = ChartOrchestrator::new(
        Arc::new(backend),
        filters.clone(),
        config.pipeline.transformer()?,
        config.pipeline.missing_param,
    );
    for chart in &config.charts {
        orchestrator.register(&chart.id, chart.targets.clone(), chart.kind);
    }

    let state = Arc::new(AppState {
        orchestrator: orchestrator.clone(),
        filters,
        missing_param: config.pipeline.missing_param,
    });

    let addr = config.server.socket_addr()?;
    tracing::info!(%addr, charts = config.charts.len(), "starting chart-pipeline service");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown();
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/charts", get(list_charts))
        .route(
            "/charts/:id",
            put(register_chart).get(get_chart).delete(unregister_chart),
        )
        .route("/charts/:id/refresh", post(refresh_chart))
        .route("/charts/:id/events", get(chart_events))
        .route("/filters", get(get_filters).post(update_filters))
        .route("/filters/:key", delete(clear_filter))
        .route("/query/render", post(render_query))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
