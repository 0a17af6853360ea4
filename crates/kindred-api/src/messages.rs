use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use kindred_engine::chat::DEFAULT_PAGE;
use kindred_types::api::{
    Claims, MessagePage, ReadReceiptResponse, SendMessageRequest, UnreadCounts,
};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<u32>,
    /// Id of the oldest message already held; returns older ones.
    pub before: Option<Uuid>,
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .engine
        .send_message(match_id, claims.sub, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessagePage>, ApiError> {
    let messages = state
        .engine
        .list_messages(match_id, claims.sub, query.limit, query.before)
        .await?;
    // A short page means history is exhausted.
    let next_before = if messages.len() as u32 == query.limit.unwrap_or(DEFAULT_PAGE) {
        messages.first().map(|m| m.id)
    } else {
        None
    };
    Ok(Json(MessagePage {
        messages,
        next_before,
    }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ReadReceiptResponse>, ApiError> {
    let updated = state.engine.mark_read(match_id, claims.sub).await?;
    Ok(Json(ReadReceiptResponse { updated }))
}

pub async fn unread_counts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UnreadCounts>, ApiError> {
    Ok(Json(state.engine.unread_counts(claims.sub).await?))
}
