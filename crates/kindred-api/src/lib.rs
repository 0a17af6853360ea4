pub mod error;
pub mod matching;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Every REST route. The WebSocket gateway is mounted by the server.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/responses",
            post(matching::record_response).delete(matching::clear_responses),
        )
        .route("/matching/run", post(matching::run_matching))
        .route("/matches", get(matching::list_matches))
        .route("/matches/{match_id}/decision", post(matching::decide))
        .route(
            "/matches/{match_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/matches/{match_id}/read", post(messages::mark_read))
        .route("/messages/unread", get(messages::unread_counts))
        .route(
            "/push-tokens",
            post(notifications::register_push_token).delete(notifications::remove_push_token),
        )
        .route(
            "/notifications/preferences",
            get(notifications::get_preferences).put(notifications::update_preferences),
        )
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read", post(notifications::mark_all_read))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let internal_routes = Router::new()
        .route("/internal/notifications", post(notifications::dispatch))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_service_key,
        ));

    Router::new()
        .merge(protected_routes)
        .merge(internal_routes)
        .with_state(state)
}
