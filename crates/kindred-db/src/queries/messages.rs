use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use rusqlite::TransactionBehavior;
use uuid::Uuid;

use kindred_types::lifecycle::MatchPhase;
use kindred_types::models::{Match, Message};

use super::matches::query_match;
use crate::Database;
use crate::models::{MessageRow, format_ts, now_ts};

#[derive(Debug)]
pub enum MessageInsert {
    Inserted { message: Message, record: Match },
    MatchNotFound,
    NotParticipant,
    /// The match is not confirmed, or a side has rejected.
    Closed,
}

impl Database {
    // -- Messages --

    /// Checks the match gate and inserts in the same transaction, so a
    /// concurrent rejection cannot slip a message into a closed match.
    pub fn insert_message_if_open(
        &self,
        match_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<MessageInsert> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let Some(record) = query_match(&tx, match_id)? else {
                return Ok(MessageInsert::MatchNotFound);
            };
            if !record.involves(sender_id) {
                return Ok(MessageInsert::NotParticipant);
            }
            if !record.is_matched || record.phase() != MatchPhase::Confirmed {
                return Ok(MessageInsert::Closed);
            }

            let message = Message {
                id: Uuid::new_v4(),
                match_id,
                sender_id,
                content: content.to_string(),
                is_read: false,
                created_at: now_ts(),
            };

            tx.execute(
                "INSERT INTO messages (id, match_id, sender_id, content, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                rusqlite::params![
                    message.id.to_string(),
                    match_id.to_string(),
                    sender_id.to_string(),
                    message.content,
                    format_ts(message.created_at),
                ],
            )?;
            tx.commit()?;

            Ok(MessageInsert::Inserted { message, record })
        })
    }

    /// Up to `limit` messages that come before the message `before` in
    /// (created_at, rowid) order, or the newest when `before` is `None`.
    /// Returned oldest first. A cursor that is not a message of this match
    /// yields an empty page.
    pub fn get_messages(
        &self,
        match_id: Uuid,
        limit: u32,
        before: Option<Uuid>,
    ) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, match_id, sender_id, content, is_read, created_at
                 FROM messages
                 WHERE match_id = ?1
                   AND (?2 IS NULL OR (created_at, rowid) < (
                        SELECT created_at, rowid FROM messages
                        WHERE id = ?2 AND match_id = ?1))
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
            )?;

            let mut rows = stmt
                .query_map(
                    rusqlite::params![match_id.to_string(), before.map(|id| id.to_string()), limit],
                    |row| {
                        Ok(MessageRow {
                            id: row.get(0)?,
                            match_id: row.get(1)?,
                            sender_id: row.get(2)?,
                            content: row.get(3)?,
                            is_read: row.get(4)?,
                            created_at: row.get(5)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.reverse();
            rows.into_iter().map(Message::try_from).collect()
        })
    }

    /// Flips every unread message in the match not sent by `reader_id`.
    /// Returns the ids that changed.
    pub fn mark_messages_read(&self, match_id: Uuid, reader_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let ids = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM messages
                     WHERE match_id = ?1 AND sender_id != ?2 AND is_read = 0
                     ORDER BY created_at, rowid",
                )?;
                stmt.query_map(
                    rusqlite::params![match_id.to_string(), reader_id.to_string()],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?
            };

            tx.execute(
                "UPDATE messages SET is_read = 1
                 WHERE match_id = ?1 AND sender_id != ?2 AND is_read = 0",
                rusqlite::params![match_id.to_string(), reader_id.to_string()],
            )?;
            tx.commit()?;

            ids.iter()
                .map(|raw| raw.parse::<Uuid>().map_err(|e| anyhow!("corrupt message id '{}': {}", raw, e)))
                .collect()
        })
    }

    /// Per match the user belongs to: unread messages sent by the other side.
    /// Matches with nothing unread are absent.
    pub fn unread_counts(&self, user_id: Uuid) -> Result<BTreeMap<Uuid, usize>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.match_id, COUNT(*)
                 FROM messages m
                 JOIN matches x ON x.id = m.match_id
                 WHERE (x.user_a_id = ?1 OR x.user_b_id = ?1)
                   AND m.sender_id != ?1
                   AND m.is_read = 0
                 GROUP BY m.match_id",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(raw, count)| {
                    let id = raw
                        .parse::<Uuid>()
                        .map_err(|e| anyhow!("corrupt match id '{}': {}", raw, e))?;
                    Ok((id, count as usize))
                })
                .collect()
        })
    }
}
