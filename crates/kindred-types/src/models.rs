use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::{MatchPhase, MatchSides, Side, SideStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// The preference category a user of this gender is matched against.
    pub fn opposite(self) -> Self {
        match self {
            Self::Male => Self::Female,
            Self::Female => Self::Male,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub nickname: String,
    pub gender: Gender,
    pub birth_year: i32,
    pub location: String,
    pub is_profile_complete: bool,
    pub created_at: DateTime<Utc>,
}

/// Trait name -> weight. Keys are kept sorted so two vectors over the same
/// traits line up component by component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonalityVector(pub BTreeMap<String, f64>);

impl PersonalityVector {
    pub fn new<I, K>(weights: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self(weights.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Parses the JSON stored with a scenario option. Anything that is not a
    /// flat object of finite numbers yields `None`.
    pub fn from_json(raw: &str) -> Option<Self> {
        let vector: Self = serde_json::from_str(raw).ok()?;
        if vector.0.is_empty() || vector.0.values().any(|w| !w.is_finite()) {
            return None;
        }
        Some(vector)
    }

    /// Component pairs when both vectors cover exactly the same traits.
    pub fn aligned<'a>(&'a self, other: &'a Self) -> Option<Vec<(f64, f64)>> {
        if self.0.len() != other.0.len() {
            return None;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|((ka, a), (kb, b))| (ka == kb).then_some((*a, *b)))
            .collect()
    }
}

/// One answered scenario, as fed to the scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioVector {
    pub scenario_id: i64,
    pub vector: PersonalityVector,
}

/// One answered scenario with the option picked and, when the option carries
/// a well-formed vector, that vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioAnswer {
    pub scenario_id: i64,
    pub option_id: i64,
    pub vector: Option<PersonalityVector>,
}

/// Returns the pair in storage order (lower id first), or `None` for a
/// self-pair.
pub fn canonical_pair(a: Uuid, b: Uuid) -> Option<(Uuid, Uuid)> {
    match a.cmp(&b) {
        std::cmp::Ordering::Less => Some((a, b)),
        std::cmp::Ordering::Greater => Some((b, a)),
        std::cmp::Ordering::Equal => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub compatibility_score: u8,
    pub match_reason: String,
    pub user_a_status: SideStatus,
    pub user_b_status: SideStatus,
    pub is_matched: bool,
    pub matched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn sides(&self) -> MatchSides {
        MatchSides {
            a: self.user_a_status,
            b: self.user_b_status,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.sides().phase()
    }

    pub fn side_of(&self, user_id: Uuid) -> Option<Side> {
        if user_id == self.user_a_id {
            Some(Side::A)
        } else if user_id == self.user_b_id {
            Some(Side::B)
        } else {
            None
        }
    }

    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        match self.side_of(user_id)? {
            Side::A => Some(self.user_b_id),
            Side::B => Some(self.user_a_id),
        }
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.side_of(user_id).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Ios,
    Android,
    Web,
}

impl DeviceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Web => "web",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ios" => Some(Self::Ios),
            "android" => Some(Self::Android),
            "web" => Some(Self::Web),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub device_type: DeviceType,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMatch,
    MatchAccepted,
    NewMessage,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewMatch => "new_match",
            Self::MatchAccepted => "match_accepted",
            Self::NewMessage => "new_message",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new_match" => Some(Self::NewMatch),
            "match_accepted" => Some(Self::MatchAccepted),
            "new_message" => Some(Self::NewMessage),
            _ => None,
        }
    }

    /// Android notification channel the push is routed to.
    pub fn channel_id(self) -> &'static str {
        match self {
            Self::NewMatch | Self::MatchAccepted => "matches",
            Self::NewMessage => "messages",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Stored per-user notification toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub push_enabled: bool,
    pub match_notifications: bool,
    pub match_accepted_notifications: bool,
    pub message_notifications: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            push_enabled: true,
            match_notifications: true,
            match_accepted_notifications: true,
            message_notifications: true,
        }
    }
}

impl NotificationPreferences {
    pub fn allows(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::NewMatch => self.match_notifications,
            NotificationKind::MatchAccepted => self.match_accepted_notifications,
            NotificationKind::NewMessage => self.message_notifications,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pair_orders_lower_first() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        assert_eq!(canonical_pair(high, low), Some((low, high)));
        assert_eq!(canonical_pair(low, high), Some((low, high)));
        assert_eq!(canonical_pair(low, low), None);
    }

    #[test]
    fn canonical_order_matches_text_order() {
        let low = Uuid::from_u128(0x0f);
        let high = Uuid::from_u128(0xf0);
        let (a, b) = canonical_pair(high, low).unwrap();
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn malformed_vectors_are_rejected() {
        assert!(PersonalityVector::from_json(r#"{"warmth": 0.4, "risk": -1}"#).is_some());
        assert!(PersonalityVector::from_json(r#"{}"#).is_none());
        assert!(PersonalityVector::from_json(r#"{"warmth": "high"}"#).is_none());
        assert!(PersonalityVector::from_json(r#"[1, 2, 3]"#).is_none());
        assert!(PersonalityVector::from_json("not json").is_none());
    }

    #[test]
    fn aligned_requires_same_traits() {
        let a = PersonalityVector::new([("calm", 1.0), ("open", 2.0)]);
        let b = PersonalityVector::new([("open", 3.0), ("calm", 4.0)]);
        let c = PersonalityVector::new([("calm", 1.0), ("bold", 2.0)]);

        assert_eq!(a.aligned(&b), Some(vec![(1.0, 4.0), (2.0, 3.0)]));
        assert_eq!(a.aligned(&c), None);
    }

    #[test]
    fn notification_channels() {
        assert_eq!(NotificationKind::NewMatch.channel_id(), "matches");
        assert_eq!(NotificationKind::MatchAccepted.channel_id(), "matches");
        assert_eq!(NotificationKind::NewMessage.channel_id(), "messages");
    }
}
