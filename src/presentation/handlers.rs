// HTTP request handlers
use crate::application::filter_builder::build_query;
use crate::application::orchestrator::Dispatch;
use crate::domain::chart::{ChartEvent, ChartKind};
use crate::domain::filter::FilterParams;
use crate::domain::query::QueryTarget;
use crate::infrastructure::chunked_json::stream_chart_events;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RegisterChart {
    pub targets: Vec<QueryTarget>,
    #[serde(default)]
    pub kind: ChartKind,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn unknown_chart(id: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("chart {} is not registered", id))
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_charts(State(state): State<Arc<AppState>>) -> Response {
    Json(state.orchestrator.list()).into_response()
}

/// Register a chart; a second registration under the same id is a no-op.
pub async fn register_chart(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterChart>,
) -> Response {
    if body.targets.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "at least one target is required");
    }

    let created = state.orchestrator.register(&id, body.targets, body.kind);
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    match state.orchestrator.view(&id) {
        Some(view) => (status, Json(view)).into_response(),
        None => unknown_chart(&id),
    }
}

pub async fn unregister_chart(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    if state.orchestrator.unregister(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        unknown_chart(&id)
    }
}

pub async fn get_chart(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(view) = state.orchestrator.view(&id) else {
        return unknown_chart(&id);
    };

    match json_response(&view, accepts_brotli(&headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

pub async fn refresh_chart(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let outcome = match state.orchestrator.refresh(&id) {
        Dispatch::Started => "started",
        Dispatch::AlreadyLoading => "alreadyLoading",
        Dispatch::NoRunnableTargets => "skipped",
        Dispatch::Unknown => return unknown_chart(&id),
    };
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "dispatch": outcome }))).into_response()
}

/// Stream status changes of one chart, starting with its current state.
pub async fn chart_events(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    // Subscribe before reading the view so no transition falls in between.
    let rx = state.orchestrator.subscribe_events();
    let Some(view) = state.orchestrator.view(&id) else {
        return unknown_chart(&id);
    };

    let initial = ChartEvent {
        chart_id: view.id,
        status: view.status,
        filter_version: view.filter_version,
        data: view.data,
        error: view.error,
    };
    stream_chart_events(rx, id, initial, accepts_brotli(&headers))
        .await
        .into_response()
}

pub async fn get_filters(State(state): State<Arc<AppState>>) -> Response {
    Json(state.filters.snapshot()).into_response()
}

/// Replace the filter state with the parameters of the request's URL query string.
pub async fn update_filters(RawQuery(query): RawQuery, State(state): State<Arc<AppState>>) -> Response {
    let params = FilterParams::from_query_string(query.as_deref().unwrap_or_default());
    let snapshot = state.filters.replace(params);
    tracing::info!(version = snapshot.version, "filter state updated");
    Json(snapshot).into_response()
}

pub async fn clear_filter(Path(key): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.filters.set(&key, None);
    Json(snapshot).into_response()
}

/// Final query text a target would send under the current filters.
pub async fn render_query(State(state): State<Arc<AppState>>, Json(target): Json<QueryTarget>) -> Response {
    let snapshot = state.filters.snapshot();
    Json(RenderedQuery {
        sql: build_query(&target, &snapshot.params, state.missing_param),
        db: target.database().map(str::to_string),
    })
    .into_response()
}
