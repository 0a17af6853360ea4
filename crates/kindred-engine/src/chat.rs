use std::collections::BTreeMap;

use tracing::{debug, info};
use uuid::Uuid;

use kindred_db::MessageInsert;
use kindred_push::NotificationRequest;
use kindred_types::events::ChangeEvent;
use kindred_types::models::Message;

use crate::{Engine, EngineError, EngineResult};

pub const DEFAULT_PAGE: u32 = 50;
pub const MAX_PAGE: u32 = 100;

impl Engine {
    /// Posts a message into a confirmed match. Leading and trailing
    /// whitespace is dropped before the length check.
    pub async fn send_message(
        &self,
        match_id: Uuid,
        sender_id: Uuid,
        text: &str,
    ) -> EngineResult<Message> {
        let content = text.trim();
        if content.is_empty() || content.chars().count() > self.config.max_message_chars {
            return Err(EngineError::EmptyMessage);
        }
        let content = content.to_string();

        let (outcome, sender_name) = self
            .blocking(move |db| {
                let outcome = db.insert_message_if_open(match_id, sender_id, &content)?;
                let sender_name = match &outcome {
                    MessageInsert::Inserted { .. } => db.get_user(sender_id)?.map(|u| u.nickname),
                    _ => None,
                };
                Ok((outcome, sender_name))
            })
            .await?;

        let (message, record) = match outcome {
            MessageInsert::Inserted { message, record } => (message, record),
            MessageInsert::MatchNotFound => return Err(EngineError::NotFound("match")),
            MessageInsert::NotParticipant => return Err(EngineError::NotParticipant),
            MessageInsert::Closed => return Err(EngineError::MatchNotConfirmed),
        };
        let recipient_id = record
            .counterpart_of(sender_id)
            .ok_or(EngineError::NotParticipant)?;

        debug!("{} -> match {}: message {}", sender_id, match_id, message.id);
        self.hub.publish(ChangeEvent::MessageCreated {
            message: message.clone(),
            recipient_id,
        });
        self.notify(NotificationRequest::new_message(
            recipient_id,
            match_id,
            sender_name.as_deref().unwrap_or("New message"),
            &message.content,
        ));

        Ok(message)
    }

    /// Marks everything the counterpart sent as read. Returns how many
    /// messages changed; a second call returns 0.
    pub async fn mark_read(&self, match_id: Uuid, reader_id: Uuid) -> EngineResult<usize> {
        let record = self.match_for_participant(match_id, reader_id).await?;
        let sender_id = record
            .counterpart_of(reader_id)
            .ok_or(EngineError::NotParticipant)?;

        let message_ids = self
            .blocking(move |db| Ok(db.mark_messages_read(match_id, reader_id)?))
            .await?;

        let updated = message_ids.len();
        if updated > 0 {
            info!("{} read {} message(s) in match {}", reader_id, updated, match_id);
            self.hub.publish(ChangeEvent::MessagesRead {
                match_id,
                reader_id,
                sender_id,
                message_ids,
            });
        }
        Ok(updated)
    }

    /// Unread messages per match, counting only what others sent.
    pub async fn unread_counts(&self, user_id: Uuid) -> EngineResult<BTreeMap<Uuid, usize>> {
        self.blocking(move |db| Ok(db.unread_counts(user_id)?)).await
    }

    /// History page, oldest first. `before` is the id of the oldest message
    /// already held and pages backwards from it.
    pub async fn list_messages(
        &self,
        match_id: Uuid,
        reader_id: Uuid,
        limit: Option<u32>,
        before: Option<Uuid>,
    ) -> EngineResult<Vec<Message>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE);
        if limit == 0 || limit > MAX_PAGE {
            return Err(EngineError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE
            )));
        }

        self.match_for_participant(match_id, reader_id).await?;
        self.blocking(move |db| Ok(db.get_messages(match_id, limit, before)?))
            .await
    }
}
