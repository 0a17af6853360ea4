use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Match, Message, NotificationKind};

/// Row-level changes published to live subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChangeEvent {
    /// The selector proposed a new pairing
    MatchCreated(Match),

    /// A side decided; carries the row after the write
    MatchUpdated(Match),

    /// A message was persisted
    MessageCreated { message: Message, recipient_id: Uuid },

    /// The reader's counterpart messages were flipped to read
    MessagesRead {
        match_id: Uuid,
        reader_id: Uuid,
        sender_id: Uuid,
        message_ids: Vec<Uuid>,
    },

    /// A notification log row was appended (badge tracking)
    NotificationLogged {
        user_id: Uuid,
        notification_id: Uuid,
        kind: NotificationKind,
    },
}

impl ChangeEvent {
    /// The match this event belongs to, if any.
    pub fn match_id(&self) -> Option<Uuid> {
        match self {
            Self::MatchCreated(m) | Self::MatchUpdated(m) => Some(m.id),
            Self::MessageCreated { message, .. } => Some(message.match_id),
            Self::MessagesRead { match_id, .. } => Some(*match_id),
            Self::NotificationLogged { .. } => None,
        }
    }

    /// Whether the row behind this event touches `user_id`.
    pub fn touches_user(&self, user_id: Uuid) -> bool {
        match self {
            Self::MatchCreated(m) | Self::MatchUpdated(m) => m.involves(user_id),
            Self::MessageCreated {
                message,
                recipient_id,
            } => message.sender_id == user_id || *recipient_id == user_id,
            Self::MessagesRead {
                reader_id,
                sender_id,
                ..
            } => *reader_id == user_id || *sender_id == user_id,
            Self::NotificationLogged { user_id: target, .. } => *target == user_id,
        }
    }

    /// Message id for insert events, used to drop re-deliveries.
    pub fn created_message_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreated { message, .. } => Some(message.id),
            _ => None,
        }
    }
}

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum SubscriptionFilter {
    /// Every change scoped to one match
    Match { match_id: Uuid },
    /// Every change touching a user
    User { user_id: Uuid },
}

impl SubscriptionFilter {
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        match self {
            Self::Match { match_id } => event.match_id() == Some(*match_id),
            Self::User { user_id } => event.touches_user(*user_id),
        }
    }
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid },

    /// A subscription is live
    Subscribed {
        subscription_id: Uuid,
        filter: SubscriptionFilter,
    },

    /// A subscription was released
    Unsubscribed { subscription_id: Uuid },

    /// A change delivered on one of the client's subscriptions
    Change {
        subscription_id: Uuid,
        event: ChangeEvent,
    },

    /// A command was refused
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Start receiving changes for a filter
    Subscribe { filter: SubscriptionFilter },

    /// Cancel a subscription
    Unsubscribe { subscription_id: Uuid },
}
