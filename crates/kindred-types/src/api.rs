use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{DeviceType, Match, Message, NotificationKind, NotificationPreferences};

// -- JWT Claims --

/// JWT claims shared across kindred-api (REST middleware) and kindred-gateway
/// (WebSocket authentication). Tokens are minted by the external auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Questionnaire --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordResponseRequest {
    pub scenario_id: i64,
    pub option_id: i64,
}

// -- Matching --

#[derive(Debug, Serialize)]
pub struct RunMatchingResponse {
    pub created_count: usize,
    pub matches: Vec<Match>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionRequest {
    pub accept: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Cursor for the next older page, absent once history is exhausted.
    pub next_before: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ReadReceiptResponse {
    pub updated: usize,
}

/// match id -> unread messages addressed to the caller
pub type UnreadCounts = BTreeMap<Uuid, usize>;

// -- Push tokens --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterPushTokenRequest {
    pub token: String,
    pub device_type: DeviceType,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemovePushTokenRequest {
    pub token: String,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchRequest {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub sent: usize,
}

#[derive(Debug, Serialize)]
pub struct NotificationCountResponse {
    pub unread: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePreferencesRequest {
    pub push_enabled: Option<bool>,
    pub match_notifications: Option<bool>,
    pub match_accepted_notifications: Option<bool>,
    pub message_notifications: Option<bool>,
}

impl UpdatePreferencesRequest {
    pub fn apply_to(&self, current: NotificationPreferences) -> NotificationPreferences {
        NotificationPreferences {
            push_enabled: self.push_enabled.unwrap_or(current.push_enabled),
            match_notifications: self.match_notifications.unwrap_or(current.match_notifications),
            match_accepted_notifications: self
                .match_accepted_notifications
                .unwrap_or(current.match_accepted_notifications),
            message_notifications: self
                .message_notifications
                .unwrap_or(current.message_notifications),
        }
    }
}
