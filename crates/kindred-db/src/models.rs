//! Database row types. These map directly to SQLite rows and are converted
//! into kindred-types models at the edge of the query layer.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use kindred_types::lifecycle::SideStatus;
use kindred_types::models::{
    DeviceType, Gender, Match, Message, NotificationKind, NotificationLog, PushToken, User,
};

pub struct UserRow {
    pub id: String,
    pub nickname: String,
    pub gender: String,
    pub birth_year: i32,
    pub location: String,
    pub is_profile_complete: bool,
    pub created_at: String,
}

pub struct MatchRow {
    pub id: String,
    pub user_a_id: String,
    pub user_b_id: String,
    pub compatibility_score: i64,
    pub match_reason: String,
    pub user_a_status: String,
    pub user_b_status: String,
    pub is_matched: bool,
    pub matched_at: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub match_id: String,
    pub sender_id: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
}

pub struct PushTokenRow {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub device_type: String,
    pub is_active: bool,
}

pub struct NotificationLogRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub data: String,
    pub is_read: bool,
    pub created_at: String,
}

/// Timestamps are written by us as RFC 3339 with millisecond precision so
/// that text order is time order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Current time at the precision `format_ts` stores, so a value handed back
/// to a caller equals the one read from the table later.
pub fn now_ts() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand through the sqlite shell use datetime('now')
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{}'", raw))
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_id(&row.id)?,
            gender: Gender::parse(&row.gender)
                .ok_or_else(|| anyhow!("corrupt gender '{}' on user '{}'", row.gender, row.id))?,
            nickname: row.nickname,
            birth_year: row.birth_year,
            location: row.location,
            is_profile_complete: row.is_profile_complete,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

impl TryFrom<MatchRow> for Match {
    type Error = anyhow::Error;

    fn try_from(row: MatchRow) -> Result<Self> {
        let status = |raw: &str| {
            SideStatus::parse(raw)
                .ok_or_else(|| anyhow!("corrupt side status '{}' on match '{}'", raw, row.id))
        };

        Ok(Match {
            id: parse_id(&row.id)?,
            user_a_id: parse_id(&row.user_a_id)?,
            user_b_id: parse_id(&row.user_b_id)?,
            compatibility_score: u8::try_from(row.compatibility_score)
                .with_context(|| format!("corrupt score on match '{}'", row.id))?,
            user_a_status: status(&row.user_a_status)?,
            user_b_status: status(&row.user_b_status)?,
            is_matched: row.is_matched,
            matched_at: row.matched_at.as_deref().map(parse_ts).transpose()?,
            created_at: parse_ts(&row.created_at)?,
            match_reason: row.match_reason,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: parse_id(&row.id)?,
            match_id: parse_id(&row.match_id)?,
            sender_id: parse_id(&row.sender_id)?,
            is_read: row.is_read,
            created_at: parse_ts(&row.created_at)?,
            content: row.content,
        })
    }
}

impl TryFrom<PushTokenRow> for PushToken {
    type Error = anyhow::Error;

    fn try_from(row: PushTokenRow) -> Result<Self> {
        Ok(PushToken {
            id: parse_id(&row.id)?,
            user_id: parse_id(&row.user_id)?,
            device_type: DeviceType::parse(&row.device_type)
                .ok_or_else(|| anyhow!("corrupt device type '{}'", row.device_type))?,
            token: row.token,
            is_active: row.is_active,
        })
    }
}

impl TryFrom<NotificationLogRow> for NotificationLog {
    type Error = anyhow::Error;

    fn try_from(row: NotificationLogRow) -> Result<Self> {
        Ok(NotificationLog {
            id: parse_id(&row.id)?,
            user_id: parse_id(&row.user_id)?,
            kind: NotificationKind::parse(&row.kind)
                .ok_or_else(|| anyhow!("corrupt notification kind '{}'", row.kind))?,
            data: serde_json::from_str(&row.data)
                .with_context(|| format!("corrupt payload on notification '{}'", row.id))?,
            is_read: row.is_read,
            created_at: parse_ts(&row.created_at)?,
            title: row.title,
            body: row.body,
        })
    }
}
