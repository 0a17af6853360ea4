use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use tracing::info;

use kindred_engine::EngineError;
use kindred_push::NotificationRequest;
use kindred_types::api::{
    Claims, DispatchRequest, DispatchResponse, NotificationCountResponse,
    RegisterPushTokenRequest, RemovePushTokenRequest, UpdatePreferencesRequest,
};
use kindred_types::models::NotificationPreferences;

use crate::error::ApiError;
use crate::state::AppState;

/// Longest token string accepted from a device.
const MAX_TOKEN_LEN: usize = 512;

fn check_token(token: &str) -> Result<String, ApiError> {
    let token = token.trim();
    if token.is_empty() || token.len() > MAX_TOKEN_LEN {
        return Err(ApiError::BadRequest("invalid push token".into()));
    }
    Ok(token.to_string())
}

// -- Push tokens --

pub async fn register_push_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegisterPushTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = check_token(&req.token)?;
    let user_id = claims.sub;
    let device_type = req.device_type;
    let stored = state
        .db(move |db| db.upsert_push_token(user_id, &token, device_type))
        .await?;
    info!("{} registered a {} push token", user_id, device_type.as_str());
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Logout: the device stops receiving pushes.
pub async fn remove_push_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RemovePushTokenRequest>,
) -> Result<StatusCode, ApiError> {
    let token = check_token(&req.token)?;
    let user_id = claims.sub;
    state
        .db(move |db| db.deactivate_push_tokens(user_id, &[token]))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Preferences --

pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<NotificationPreferences>, ApiError> {
    let user_id = claims.sub;
    Ok(Json(
        state.db(move |db| db.notification_preferences(user_id)).await?,
    ))
}

pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePreferencesRequest>,
) -> Result<Json<NotificationPreferences>, ApiError> {
    let user_id = claims.sub;
    let prefs = state
        .db(move |db| {
            let prefs = req.apply_to(db.notification_preferences(user_id)?);
            db.save_notification_preferences(user_id, &prefs)?;
            Ok(prefs)
        })
        .await?;
    Ok(Json(prefs))
}

// -- Badge --

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<NotificationCountResponse>, ApiError> {
    let user_id = claims.sub;
    let unread = state
        .db(move |db| db.unread_notification_count(user_id))
        .await?;
    Ok(Json(NotificationCountResponse { unread }))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let updated = state
        .db(move |db| db.mark_notifications_read(user_id))
        .await?;
    Ok(Json(json!({ "updated": updated })))
}

// -- Internal --

/// Service-to-service dispatch. Push failures are reported as `sent: 0`,
/// never as an error.
pub async fn dispatch(
    State(state): State<AppState>,
    Json(req): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }
    let user_id = req.user_id;
    if state.db(move |db| db.get_user(user_id)).await?.is_none() {
        return Err(EngineError::NotFound("user").into());
    }

    let outcome = state
        .dispatcher
        .dispatch(NotificationRequest {
            user_id: req.user_id,
            kind: req.kind,
            title: req.title,
            body: req.body,
            data: req.data,
        })
        .await?;
    Ok(Json(DispatchResponse { sent: outcome.sent }))
}
