pub mod chat;
pub mod error;
pub mod lifecycle;
pub mod reason;
pub mod responses;
pub mod scorer;
pub mod selector;

use std::sync::Arc;

use tracing::{error, warn};

use kindred_db::Database;
use kindred_gateway::Hub;
use kindred_push::{NotificationDispatcher, NotificationRequest};

pub use error::EngineError;
pub use selector::MatchingOutcome;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Proposals created per selector run.
    pub max_proposals: usize,
    /// Pairs scoring below this are never proposed.
    pub min_score: u8,
    pub max_message_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_proposals: 5,
            min_score: 50,
            max_message_chars: 2000,
        }
    }
}

/// Matching, lifecycle and chat over one shared store.
///
/// Every change is published to the [`Hub`]; notifications go out on
/// detached tasks and never affect the result of the call that caused them.
#[derive(Clone)]
pub struct Engine {
    db: Arc<Database>,
    hub: Hub,
    notifier: Option<NotificationDispatcher>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(db: Arc<Database>, hub: Hub, config: EngineConfig) -> Self {
        Self {
            db,
            hub,
            notifier: None,
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: NotificationDispatcher) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs storage work off the async runtime.
    pub(crate) async fn blocking<T, F>(&self, f: F) -> EngineResult<T>
    where
        F: FnOnce(&Database) -> EngineResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db)).await.map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            EngineError::from(e)
        })?
    }

    /// Fire-and-forget notification.
    pub(crate) fn notify(&self, request: NotificationRequest) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        tokio::spawn(async move {
            let user_id = request.user_id;
            let kind = request.kind;
            if let Err(e) = notifier.dispatch(request).await {
                warn!("Dropping {} notification for {}: {}", kind.as_str(), user_id, e);
            }
        });
    }
}
