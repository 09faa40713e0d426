use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use super::server::{error_response, AppState};
use super::{ExtractRequest, GraphFilter, PathQuery};
use crate::error::TriplegraphError;
use crate::extract::ExtractionMode;
use crate::pipeline::ExtractionReport;
use crate::store::{GraphStore, StoreStats, StoredPath};

type ApiResult<T> = std::result::Result<Json<T>, Response>;

fn require_store(state: &AppState) -> std::result::Result<&Arc<dyn GraphStore>, Response> {
    state.pipeline.store().ok_or_else(|| {
        error_response(TriplegraphError::Config("No graph store configured".to_string()))
    })
}

pub(super) async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "store": state.pipeline.store().map(|s| s.name().to_string()),
    }))
}

pub(super) async fn extract(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ExtractRequest>,
) -> ApiResult<ExtractionReport> {
    state.authorize(&headers)?;

    let mode = match request.mode.as_deref() {
        Some(mode) => mode.parse::<ExtractionMode>().map_err(error_response)?,
        None => state.default_mode,
    };

    let graph_name = match request.graph_name {
        Some(name) => Some(name),
        None if request.persist => Some(state.default_graph_name.clone()),
        None => None,
    };

    let report = state
        .pipeline
        .run(&request.text, mode, graph_name.as_deref())
        .await
        .map_err(error_response)?;
    Ok(Json(report))
}

pub(super) async fn entities(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<GraphFilter>,
) -> ApiResult<Value> {
    state.authorize(&headers)?;
    let entities = require_store(&state)?
        .get_all_entities(filter.graph.as_deref())
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "entities": entities })))
}

pub(super) async fn relations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Query(filter): Query<GraphFilter>,
) -> ApiResult<Value> {
    state.authorize(&headers)?;
    let relations = require_store(&state)?
        .query_entity_relationships(&name, filter.graph.as_deref())
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "entity": name, "relations": relations })))
}

pub(super) async fn triples(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<GraphFilter>,
) -> ApiResult<Value> {
    state.authorize(&headers)?;
    let triples = require_store(&state)?
        .get_all_triples(filter.graph.as_deref())
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "triples": triples })))
}

pub(super) async fn path(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PathQuery>,
) -> ApiResult<StoredPath> {
    state.authorize(&headers)?;
    let path = require_store(&state)?
        .find_shortest_path(&query.from, &query.to, query.graph.as_deref())
        .await
        .map_err(error_response)?;

    path.map(Json).ok_or_else(|| {
        error_response(TriplegraphError::EntityNotFound(format!(
            "no path from '{}' to '{}'",
            query.from, query.to
        )))
    })
}

pub(super) async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<GraphFilter>,
) -> ApiResult<StoreStats> {
    state.authorize(&headers)?;
    let stats = require_store(&state)?
        .get_graph_stats(filter.graph.as_deref())
        .await
        .map_err(error_response)?;
    Ok(Json(stats))
}

pub(super) async fn delete_graph(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<Value> {
    state.authorize(&headers)?;
    require_store(&state)?
        .delete_graph(&name)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "deleted": name })))
}
