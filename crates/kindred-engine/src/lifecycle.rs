use tracing::info;
use uuid::Uuid;

use kindred_db::DecisionOutcome;
use kindred_push::NotificationRequest;
use kindred_types::events::ChangeEvent;
use kindred_types::lifecycle::Decision;
use kindred_types::models::Match;

use crate::{Engine, EngineError, EngineResult};

impl Engine {
    /// Records one side's accept or reject.
    ///
    /// The read-modify-write runs in a single immediate transaction, so two
    /// participants accepting at the same moment always end confirmed. The
    /// write that completes the handshake notifies both users.
    pub async fn decide(&self, match_id: Uuid, user_id: Uuid, accept: bool) -> EngineResult<Match> {
        let decision = Decision::from_accept(accept);
        let outcome = self
            .blocking(move |db| Ok(db.apply_decision(match_id, user_id, decision)?))
            .await?;

        let (record, transition) = match outcome {
            DecisionOutcome::Applied { record, transition } => (record, transition),
            DecisionOutcome::MatchNotFound => return Err(EngineError::NotFound("match")),
            DecisionOutcome::NotParticipant => return Err(EngineError::NotParticipant),
            DecisionOutcome::Refused(e) => return Err(e.into()),
        };

        if transition.changed {
            info!(
                "{} {:?} match {} -> {:?}",
                user_id,
                decision,
                match_id,
                record.phase()
            );
            self.hub.publish(ChangeEvent::MatchUpdated(record.clone()));
        }

        if transition.became_confirmed {
            for participant in [record.user_a_id, record.user_b_id] {
                self.notify(NotificationRequest::match_accepted(participant, record.id));
            }
        }

        Ok(record)
    }

    pub async fn matches_for(&self, user_id: Uuid) -> EngineResult<Vec<Match>> {
        self.blocking(move |db| Ok(db.matches_for_user(user_id)?)).await
    }

    /// The match, provided `user_id` is one of its two participants.
    pub async fn match_for_participant(&self, match_id: Uuid, user_id: Uuid) -> EngineResult<Match> {
        let record = self
            .blocking(move |db| db.get_match(match_id)?.ok_or(EngineError::NotFound("match")))
            .await?;
        if !record.involves(user_id) {
            return Err(EngineError::NotParticipant);
        }
        Ok(record)
    }
}
