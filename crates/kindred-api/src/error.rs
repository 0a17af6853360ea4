use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use kindred_engine::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid credentials")]
    Unauthorized,

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Engine(e) => match e {
                EngineError::Validation(_) | EngineError::EmptyMessage | EngineError::NoResponses => {
                    StatusCode::BAD_REQUEST
                }
                EngineError::NotParticipant => StatusCode::FORBIDDEN,
                EngineError::DecisionFinal
                | EngineError::MatchNotConfirmed
                | EngineError::Conflict => StatusCode::CONFLICT,
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Engine(EngineError::Dependency(e)) => {
                error!("Storage unavailable: {:#}", e);
                "service temporarily unavailable".to_string()
            }
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                self.to_string()
            }
            other => {
                if status.is_server_error() {
                    warn!("{}", other);
                }
                other.to_string()
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
