use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

use kindred_db::Database;
use kindred_gateway::Hub;
use kindred_types::events::ChangeEvent;
use kindred_types::models::NotificationKind;

use crate::gateway::{PushGateway, PushMessage};
use crate::policy::{NotificationPolicy, Presentation};

pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest message preview carried in a new-message notification body.
const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: Option<Value>,
}

impl NotificationRequest {
    pub fn new_match(user_id: Uuid, match_id: Uuid) -> Self {
        Self {
            user_id,
            kind: NotificationKind::NewMatch,
            title: "New match".into(),
            body: "Someone new is waiting for you. Take a look!".into(),
            data: Some(json!({ "matchId": match_id })),
        }
    }

    pub fn match_accepted(user_id: Uuid, match_id: Uuid) -> Self {
        Self {
            user_id,
            kind: NotificationKind::MatchAccepted,
            title: "It's a match!".into(),
            body: "You both said yes. Start the conversation.".into(),
            data: Some(json!({ "matchId": match_id })),
        }
    }

    pub fn new_message(user_id: Uuid, match_id: Uuid, sender_name: &str, content: &str) -> Self {
        let mut body: String = content.chars().take(PREVIEW_CHARS).collect();
        if content.chars().count() > PREVIEW_CHARS {
            body.push_str("...");
        }
        Self {
            user_id,
            kind: NotificationKind::NewMessage,
            title: sender_name.to_string(),
            body,
            data: Some(json!({ "matchId": match_id })),
        }
    }

    /// Caller data with the notification kind stamped in under `type`.
    fn payload(&self) -> Value {
        let mut map = match &self.data {
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".into(), other.clone());
                map
            }
            None => Map::new(),
        };
        map.insert("type".into(), Value::String(self.kind.as_str().into()));
        Value::Object(map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Handed to the gateway and acknowledged.
    Submitted,
    /// User has push turned off.
    Suppressed,
    /// No active token the gateway can address.
    NoTargets,
    /// Gateway answered with an error.
    Failed,
    /// Gateway did not answer in time; delivery unknown.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub deactivated: usize,
    pub delivery: Delivery,
    pub notification_id: Uuid,
}

/// Logs notifications and forwards them to a push gateway.
///
/// Gateway trouble never propagates: the log row is written regardless and
/// failures are reported through [`Delivery`]. Only storage errors are
/// returned to the caller.
#[derive(Clone)]
pub struct NotificationDispatcher {
    db: Arc<Database>,
    gateway: Arc<dyn PushGateway>,
    hub: Hub,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(db: Arc<Database>, gateway: Arc<dyn PushGateway>, hub: Hub) -> Self {
        Self {
            db,
            gateway,
            hub,
            timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dispatch using the recipient's stored preferences.
    pub async fn dispatch(&self, request: NotificationRequest) -> anyhow::Result<DispatchOutcome> {
        let user_id = request.user_id;
        let prefs = blocking(&self.db, move |db| db.notification_preferences(user_id)).await?;
        self.dispatch_with_policy(request, NotificationPolicy::from(prefs)).await
    }

    pub async fn dispatch_with_policy(
        &self,
        request: NotificationRequest,
        policy: NotificationPolicy,
    ) -> anyhow::Result<DispatchOutcome> {
        let user_id = request.user_id;
        let kind = request.kind;
        let data = request.payload();

        let log = {
            let title = request.title.clone();
            let body = request.body.clone();
            let data = data.clone();
            blocking(&self.db, move |db| {
                db.insert_notification_log(user_id, kind, &title, &body, &data)
            })
            .await?
        };
        self.hub.publish(ChangeEvent::NotificationLogged {
            user_id,
            notification_id: log.id,
            kind,
        });

        let outcome = |sent, deactivated, delivery| DispatchOutcome {
            sent,
            deactivated,
            delivery,
            notification_id: log.id,
        };

        let presentation = policy.presentation(kind);
        if presentation == Presentation::Suppressed {
            debug!("Push disabled for {}, {} logged only", user_id, kind.as_str());
            return Ok(outcome(0, 0, Delivery::Suppressed));
        }

        let tokens = blocking(&self.db, move |db| db.active_push_tokens(user_id)).await?;
        let sound = match presentation {
            Presentation::Alert => Some("default".to_string()),
            _ => None,
        };

        let messages: Vec<PushMessage> = tokens
            .into_iter()
            .filter(|t| {
                let ok = self.gateway.accepts_token(&t.token);
                if !ok {
                    debug!("Skipping unaddressable push token {} for {}", t.id, user_id);
                }
                ok
            })
            .map(|t| PushMessage {
                to: t.token,
                title: request.title.clone(),
                body: request.body.clone(),
                data: data.clone(),
                sound: sound.clone(),
                channel_id: kind.channel_id().to_string(),
            })
            .collect();

        if messages.is_empty() {
            debug!("No push targets for {}", user_id);
            return Ok(outcome(0, 0, Delivery::NoTargets));
        }

        let tickets = match tokio::time::timeout(self.timeout, self.gateway.send_batch(&messages))
            .await
        {
            Ok(Ok(tickets)) => tickets,
            Ok(Err(e)) => {
                warn!("Push to {} failed: {}", user_id, e);
                return Ok(outcome(0, 0, Delivery::Failed));
            }
            Err(_) => {
                warn!("Push to {} timed out after {:?}", user_id, self.timeout);
                return Ok(outcome(0, 0, Delivery::TimedOut));
            }
        };

        let dead: Vec<String> = messages
            .iter()
            .zip(&tickets)
            .filter(|(_, ticket)| ticket.is_dead_token())
            .map(|(message, _)| message.to.clone())
            .collect();

        let deactivated = if dead.is_empty() {
            0
        } else {
            match blocking(&self.db, move |db| db.deactivate_push_tokens(user_id, &dead)).await {
                Ok(n) => {
                    info!("Deactivated {} dead push token(s) for {}", n, user_id);
                    n
                }
                Err(e) => {
                    warn!("Failed to deactivate dead tokens for {}: {}", user_id, e);
                    0
                }
            }
        };

        Ok(outcome(messages.len(), deactivated, Delivery::Submitted))
    }
}

async fn blocking<T, F>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db)).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_stamps_kind() {
        let match_id = Uuid::new_v4();
        let req = NotificationRequest::new_match(Uuid::new_v4(), match_id);
        let payload = req.payload();
        assert_eq!(payload["type"], "new_match");
        assert_eq!(payload["matchId"], match_id.to_string());
    }

    #[test]
    fn scalar_data_is_wrapped() {
        let req = NotificationRequest {
            user_id: Uuid::new_v4(),
            kind: NotificationKind::NewMessage,
            title: "t".into(),
            body: "b".into(),
            data: Some(json!(42)),
        };
        assert_eq!(req.payload(), json!({ "value": 42, "type": "new_message" }));
    }

    #[test]
    fn long_previews_are_cut() {
        let content = "x".repeat(250);
        let req = NotificationRequest::new_message(Uuid::new_v4(), Uuid::new_v4(), "Mina", &content);
        assert_eq!(req.body.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(req.title, "Mina");
    }
}
