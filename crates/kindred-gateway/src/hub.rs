use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use kindred_types::events::{ChangeEvent, SubscriptionFilter};

/// How many delivered message ids a subscription remembers for dedup.
const SEEN_WINDOW: usize = 1024;

/// Fans row-level changes out to live subscribers.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    /// Every subscription reads from this channel and filters locally
    broadcast_tx: broadcast::Sender<ChangeEvent>,

    /// Live subscriptions: subscription_id -> filter
    active: Mutex<HashMap<Uuid, SubscriptionFilter>>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(HubInner {
                broadcast_tx,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Publish a change to every live subscription. Never blocks, never fails.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let id = Uuid::new_v4();
        let rx = self.inner.broadcast_tx.subscribe();

        if let Ok(mut active) = self.inner.active.lock() {
            active.insert(id, filter);
        }
        debug!("Subscription {} opened ({:?})", id, filter);

        Subscription {
            id,
            filter,
            rx,
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            cancel: CancellationToken::new(),
            hub: self.clone(),
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.active.lock().map(|a| a.len()).unwrap_or(0)
    }

    fn release(&self, id: Uuid) {
        if let Ok(mut active) = self.inner.active.lock() {
            if active.remove(&id).is_some() {
                debug!("Subscription {} released", id);
            }
        }
    }
}

/// A filtered, deduplicated view of the change stream.
///
/// Dropping it or calling [`CancelHandle::cancel`] unsubscribes.
pub struct Subscription {
    id: Uuid,
    filter: SubscriptionFilter,
    rx: broadcast::Receiver<ChangeEvent>,
    seen: HashSet<Uuid>,
    seen_order: VecDeque<Uuid>,
    cancel: CancellationToken,
    hub: Hub,
}

/// Cloneable handle that ends a subscription from outside its reader task.
#[derive(Clone)]
pub struct CancelHandle {
    id: Uuid,
    token: CancellationToken,
    hub: Hub,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
        self.hub.release(self.id);
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filter(&self) -> SubscriptionFilter {
        self.filter
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            id: self.id,
            token: self.cancel.clone(),
            hub: self.hub.clone(),
        }
    }

    /// Next event accepted by the filter. `None` once cancelled or when the
    /// hub is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                result = self.rx.recv() => result,
            };

            let event = match result {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    warn!("Subscription {} lagged by {} events", self.id, n);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            };

            if !self.filter.accepts(&event) {
                continue;
            }
            if let Some(message_id) = event.created_message_id() {
                if !self.remember(message_id) {
                    continue;
                }
            }
            return Some(event);
        }
    }

    /// Records a delivered message id; false when it was already delivered.
    fn remember(&mut self, message_id: Uuid) -> bool {
        if !self.seen.insert(message_id) {
            return false;
        }
        self.seen_order.push_back(message_id);
        if self.seen_order.len() > SEEN_WINDOW {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.hub.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kindred_types::models::{Message, NotificationKind};
    use std::time::Duration;

    fn message(match_id: Uuid, sender_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            match_id,
            sender_id,
            content: "hello".into(),
            is_read: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_inserts_are_delivered_once() {
        let hub = Hub::new();
        let match_id = Uuid::new_v4();
        let mut sub = hub.subscribe(SubscriptionFilter::Match { match_id });

        let msg = message(match_id, Uuid::new_v4());
        let event = ChangeEvent::MessageCreated {
            message: msg.clone(),
            recipient_id: Uuid::new_v4(),
        };
        hub.publish(event.clone());
        hub.publish(event);
        hub.publish(ChangeEvent::MessagesRead {
            match_id,
            reader_id: Uuid::new_v4(),
            sender_id: msg.sender_id,
            message_ids: vec![msg.id],
        });

        assert_eq!(sub.next().await.and_then(|e| e.created_message_id()), Some(msg.id));
        assert!(matches!(sub.next().await, Some(ChangeEvent::MessagesRead { .. })));
    }

    #[tokio::test]
    async fn filter_drops_other_matches() {
        let hub = Hub::new();
        let mine = Uuid::new_v4();
        let mut sub = hub.subscribe(SubscriptionFilter::Match { match_id: mine });

        hub.publish(ChangeEvent::MessageCreated {
            message: message(Uuid::new_v4(), Uuid::new_v4()),
            recipient_id: Uuid::new_v4(),
        });
        let expected = message(mine, Uuid::new_v4());
        hub.publish(ChangeEvent::MessageCreated {
            message: expected.clone(),
            recipient_id: Uuid::new_v4(),
        });

        assert_eq!(sub.next().await.and_then(|e| e.created_message_id()), Some(expected.id));
    }

    #[tokio::test]
    async fn cancel_releases_and_ends_stream() {
        let hub = Hub::new();
        let user_id = Uuid::new_v4();
        let mut sub = hub.subscribe(SubscriptionFilter::User { user_id });
        assert_eq!(hub.active_subscriptions(), 1);

        let handle = sub.cancel_handle();
        let reader = tokio::spawn(async move { sub.next().await });
        handle.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
        assert!(result.is_none());
        assert_eq!(hub.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn drop_releases() {
        let hub = Hub::new();
        let sub = hub.subscribe(SubscriptionFilter::User { user_id: Uuid::new_v4() });
        assert_eq!(hub.active_subscriptions(), 1);
        drop(sub);
        assert_eq!(hub.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn badge_events_reach_user_subscriptions() {
        let hub = Hub::new();
        let user_id = Uuid::new_v4();
        let mut sub = hub.subscribe(SubscriptionFilter::User { user_id });

        hub.publish(ChangeEvent::NotificationLogged {
            user_id,
            notification_id: Uuid::new_v4(),
            kind: NotificationKind::MatchAccepted,
        });

        assert!(matches!(
            sub.next().await,
            Some(ChangeEvent::NotificationLogged { .. })
        ));
    }
}
