use std::sync::Arc;

use tracing::error;

use kindred_db::Database;
use kindred_engine::Engine;
use kindred_push::NotificationDispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub engine: Engine,
    pub dispatcher: NotificationDispatcher,
    pub jwt_secret: String,
    /// Shared secret for `/internal/*`. Internal routes refuse everything
    /// when unset.
    pub service_key: Option<String>,
}

impl AppStateInner {
    /// Runs a direct storage call off the async runtime.
    pub async fn db<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.engine.db().clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(anyhow::anyhow!("blocking task failed"))
            })?
            .map_err(ApiError::Internal)
    }
}
