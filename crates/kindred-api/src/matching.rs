use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use uuid::Uuid;

use kindred_types::api::{Claims, DecisionRequest, RecordResponseRequest, RunMatchingResponse};
use kindred_types::models::Match;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn record_response(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RecordResponseRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .record_response(claims.sub, req.scenario_id, req.option_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_responses(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, ApiError> {
    let cleared = state.engine.clear_responses(claims.sub).await?;
    Ok(Json(json!({ "cleared": cleared })))
}

pub async fn run_matching(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<RunMatchingResponse>, ApiError> {
    let outcome = state.engine.run_matching(claims.sub).await?;
    Ok(Json(RunMatchingResponse {
        created_count: outcome.created_count,
        matches: outcome.matches,
    }))
}

pub async fn list_matches(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Match>>, ApiError> {
    Ok(Json(state.engine.matches_for(claims.sub).await?))
}

pub async fn decide(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<Match>, ApiError> {
    Ok(Json(
        state.engine.decide(match_id, claims.sub, req.accept).await?,
    ))
}
