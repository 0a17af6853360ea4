use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use kindred_types::models::{
    DeviceType, NotificationKind, NotificationLog, NotificationPreferences, PushToken,
};

use super::OptionalExt;
use crate::Database;
use crate::models::{PushTokenRow, format_ts, now_ts};

impl Database {
    // -- Push tokens --

    /// Registers a device for a user. Re-registering reactivates the token.
    pub fn upsert_push_token(
        &self,
        user_id: Uuid,
        token: &str,
        device_type: DeviceType,
    ) -> Result<PushToken> {
        let now = format_ts(Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO push_tokens (id, user_id, token, device_type, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
                 ON CONFLICT(user_id, token) DO UPDATE SET
                    device_type = excluded.device_type,
                    is_active = 1,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    user_id.to_string(),
                    token,
                    device_type.as_str(),
                    now,
                ],
            )?;

            let row = conn.query_row(
                "SELECT id, user_id, token, device_type, is_active
                 FROM push_tokens WHERE user_id = ?1 AND token = ?2",
                rusqlite::params![user_id.to_string(), token],
                map_push_token,
            )?;
            PushToken::try_from(row)
        })
    }

    pub fn active_push_tokens(&self, user_id: Uuid) -> Result<Vec<PushToken>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, token, device_type, is_active
                 FROM push_tokens
                 WHERE user_id = ?1 AND is_active = 1
                 ORDER BY created_at",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], map_push_token)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(PushToken::try_from).collect()
        })
    }

    /// Marks the given tokens of one user inactive. Returns how many flipped.
    pub fn deactivate_push_tokens(&self, user_id: Uuid, tokens: &[String]) -> Result<usize> {
        if tokens.is_empty() {
            return Ok(0);
        }

        let now = format_ts(Utc::now());
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "UPDATE push_tokens SET is_active = 0, updated_at = ?3
                 WHERE user_id = ?1 AND token = ?2 AND is_active = 1",
            )?;
            let mut flipped = 0;
            for token in tokens {
                flipped += stmt.execute(rusqlite::params![user_id.to_string(), token, now])?;
            }
            Ok(flipped)
        })
    }

    // -- Notification log --

    pub fn insert_notification_log(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> Result<NotificationLog> {
        let log = NotificationLog {
            id: Uuid::new_v4(),
            user_id,
            kind,
            title: title.to_string(),
            body: body.to_string(),
            data: data.clone(),
            is_read: false,
            created_at: now_ts(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notification_logs (id, user_id, kind, title, body, data, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                rusqlite::params![
                    log.id.to_string(),
                    user_id.to_string(),
                    kind.as_str(),
                    log.title,
                    log.body,
                    serde_json::to_string(data)?,
                    format_ts(log.created_at),
                ],
            )?;
            Ok(())
        })?;

        Ok(log)
    }

    pub fn notification_logs(&self, user_id: Uuid) -> Result<Vec<NotificationLog>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, kind, title, body, data, is_read, created_at
                 FROM notification_logs
                 WHERE user_id = ?1
                 ORDER BY created_at DESC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(crate::models::NotificationLogRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: row.get(2)?,
                        title: row.get(3)?,
                        body: row.get(4)?,
                        data: row.get(5)?,
                        is_read: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(NotificationLog::try_from).collect()
        })
    }

    pub fn unread_notification_count(&self, user_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notification_logs WHERE user_id = ?1 AND is_read = 0",
                [user_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    pub fn mark_notifications_read(&self, user_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE notification_logs SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id.to_string()],
            )?;
            Ok(n)
        })
    }

    // -- Preferences --

    /// Stored toggles, or the all-on defaults for users who never saved any.
    pub fn notification_preferences(&self, user_id: Uuid) -> Result<NotificationPreferences> {
        self.with_conn(|conn| {
            let prefs = conn
                .query_row(
                    "SELECT push_enabled, match_notifications, match_accepted_notifications, message_notifications
                     FROM notification_preferences WHERE user_id = ?1",
                    [user_id.to_string()],
                    |row| {
                        Ok(NotificationPreferences {
                            push_enabled: row.get(0)?,
                            match_notifications: row.get(1)?,
                            match_accepted_notifications: row.get(2)?,
                            message_notifications: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(prefs.unwrap_or_default())
        })
    }

    pub fn save_notification_preferences(
        &self,
        user_id: Uuid,
        prefs: &NotificationPreferences,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notification_preferences
                    (user_id, push_enabled, match_notifications, match_accepted_notifications, message_notifications)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                    push_enabled = excluded.push_enabled,
                    match_notifications = excluded.match_notifications,
                    match_accepted_notifications = excluded.match_accepted_notifications,
                    message_notifications = excluded.message_notifications",
                rusqlite::params![
                    user_id.to_string(),
                    prefs.push_enabled,
                    prefs.match_notifications,
                    prefs.match_accepted_notifications,
                    prefs.message_notifications,
                ],
            )?;
            Ok(())
        })
    }
}

fn map_push_token(row: &rusqlite::Row<'_>) -> rusqlite::Result<PushTokenRow> {
    Ok(PushTokenRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        token: row.get(2)?,
        device_type: row.get(3)?,
        is_active: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;
    use kindred_types::models::Gender;

    #[test]
    fn reregistering_reactivates() {
        let db = fixtures::db();
        let user = fixtures::user(&db, Gender::Male);
        let token = "ExponentPushToken[abc]";

        db.upsert_push_token(user.id, token, DeviceType::Ios).unwrap();
        assert_eq!(db.deactivate_push_tokens(user.id, &[token.to_string()]).unwrap(), 1);
        assert!(db.active_push_tokens(user.id).unwrap().is_empty());

        let again = db.upsert_push_token(user.id, token, DeviceType::Ios).unwrap();
        assert!(again.is_active);
        assert_eq!(db.active_push_tokens(user.id).unwrap().len(), 1);
    }

    #[test]
    fn deactivation_is_scoped_to_the_user() {
        let db = fixtures::db();
        let a = fixtures::user(&db, Gender::Male);
        let b = fixtures::user(&db, Gender::Female);
        let shared = "ExponentPushToken[shared-device]";
        db.upsert_push_token(a.id, shared, DeviceType::Android).unwrap();
        db.upsert_push_token(b.id, shared, DeviceType::Android).unwrap();

        db.deactivate_push_tokens(a.id, &[shared.to_string()]).unwrap();
        assert!(db.active_push_tokens(a.id).unwrap().is_empty());
        assert_eq!(db.active_push_tokens(b.id).unwrap().len(), 1);
    }

    #[test]
    fn badge_count_follows_logs() {
        let db = fixtures::db();
        let user = fixtures::user(&db, Gender::Female);
        let payload = serde_json::json!({ "matchId": "m" });
        db.insert_notification_log(user.id, NotificationKind::NewMatch, "t", "b", &payload)
            .unwrap();
        db.insert_notification_log(user.id, NotificationKind::NewMessage, "t", "b", &payload)
            .unwrap();

        assert_eq!(db.unread_notification_count(user.id).unwrap(), 2);
        assert_eq!(db.mark_notifications_read(user.id).unwrap(), 2);
        assert_eq!(db.unread_notification_count(user.id).unwrap(), 0);
        assert_eq!(db.notification_logs(user.id).unwrap()[0].data, payload);
    }

    #[test]
    fn preferences_default_to_enabled() {
        let db = fixtures::db();
        let user = fixtures::user(&db, Gender::Female);
        assert_eq!(
            db.notification_preferences(user.id).unwrap(),
            NotificationPreferences::default()
        );

        let muted = NotificationPreferences {
            message_notifications: false,
            ..Default::default()
        };
        db.save_notification_preferences(user.id, &muted).unwrap();
        assert_eq!(db.notification_preferences(user.id).unwrap(), muted);
    }
}
