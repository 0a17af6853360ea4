use tracing::info;
use uuid::Uuid;

use crate::{Engine, EngineError, EngineResult};

impl Engine {
    /// Stores (or overwrites) the user's answer to one scenario.
    pub async fn record_response(
        &self,
        user_id: Uuid,
        scenario_id: i64,
        option_id: i64,
    ) -> EngineResult<()> {
        self.blocking(move |db| {
            if db.get_user(user_id)?.is_none() {
                return Err(EngineError::NotFound("user"));
            }
            if !db.upsert_response(user_id, scenario_id, option_id)? {
                return Err(EngineError::Validation(format!(
                    "option {} does not belong to scenario {}",
                    option_id, scenario_id
                )));
            }
            Ok(())
        })
        .await
    }

    /// Re-take: forgets every answer. Existing matches are kept.
    pub async fn clear_responses(&self, user_id: Uuid) -> EngineResult<usize> {
        let cleared = self.blocking(move |db| Ok(db.clear_responses(user_id)?)).await?;
        info!("{} cleared {} scenario response(s)", user_id, cleared);
        Ok(cleared)
    }
}
