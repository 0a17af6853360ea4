use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use kindred_db::Database;
use kindred_types::events::{GatewayCommand, GatewayEvent, SubscriptionFilter};

use crate::hub::{CancelHandle, Hub};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const LOG_PREVIEW_BYTES: usize = 200;

/// Handle a pre-authenticated WebSocket connection. The JWT was validated at
/// the HTTP upgrade layer, so we go straight to Ready + event loop.
pub async fn handle_connection(socket: WebSocket, hub: Hub, db: Arc<Database>, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} connected to gateway", user_id);

    if send_event(&mut sender, &GatewayEvent::Ready { user_id }).await.is_err() {
        return;
    }

    // Subscription forwarders and command replies both feed this channel
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = out_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut session = Session {
        user_id,
        hub,
        db,
        out_tx,
        subscriptions: HashMap::new(),
    };

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => session.handle_command(cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            log_preview(&text)
                        );
                        session.reply(GatewayEvent::Error {
                            message: "unrecognized command".into(),
                        });
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        session.close();
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} disconnected from gateway", user_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

/// Per-connection subscription bookkeeping.
struct Session {
    user_id: Uuid,
    hub: Hub,
    db: Arc<Database>,
    out_tx: mpsc::UnboundedSender<GatewayEvent>,
    subscriptions: HashMap<Uuid, CancelHandle>,
}

impl Session {
    fn reply(&self, event: GatewayEvent) {
        let _ = self.out_tx.send(event);
    }

    async fn handle_command(&mut self, cmd: GatewayCommand) {
        match cmd {
            GatewayCommand::Subscribe { filter } => {
                if let Err(reason) = self.authorize(filter).await {
                    warn!("{} refused subscription {:?}: {}", self.user_id, filter, reason);
                    self.reply(GatewayEvent::Error { message: reason });
                    return;
                }
                self.open(filter);
            }

            GatewayCommand::Unsubscribe { subscription_id } => {
                if let Some(handle) = self.subscriptions.remove(&subscription_id) {
                    handle.cancel();
                    self.reply(GatewayEvent::Unsubscribed { subscription_id });
                }
            }
        }
    }

    /// Users may watch themselves and matches they belong to.
    async fn authorize(&self, filter: SubscriptionFilter) -> Result<(), String> {
        match filter {
            SubscriptionFilter::User { user_id } if user_id == self.user_id => Ok(()),
            SubscriptionFilter::User { .. } => Err("cannot watch another user".into()),
            SubscriptionFilter::Match { match_id } => {
                let db = self.db.clone();
                let found = tokio::task::spawn_blocking(move || db.get_match(match_id))
                    .await
                    .map_err(|e| {
                        error!("spawn_blocking join error: {}", e);
                        "internal error".to_string()
                    })?
                    .map_err(|e| {
                        error!("match lookup failed: {}", e);
                        "internal error".to_string()
                    })?;

                match found {
                    Some(m) if m.involves(self.user_id) => Ok(()),
                    _ => Err("match not found".into()),
                }
            }
        }
    }

    fn open(&mut self, filter: SubscriptionFilter) {
        let mut subscription = self.hub.subscribe(filter);
        let subscription_id = subscription.id();
        self.subscriptions.insert(subscription_id, subscription.cancel_handle());

        info!("{} subscribed {} ({:?})", self.user_id, subscription_id, filter);
        self.reply(GatewayEvent::Subscribed {
            subscription_id,
            filter,
        });

        let out_tx = self.out_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                if out_tx
                    .send(GatewayEvent::Change {
                        subscription_id,
                        event,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    fn close(&mut self) {
        for (_, handle) in self.subscriptions.drain() {
            handle.cancel();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// At most `LOG_PREVIEW_BYTES` of a raw frame, cut on a char boundary.
fn log_preview(raw: &str) -> &str {
    let mut end = raw.len().min(LOG_PREVIEW_BYTES);
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    &raw[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_never_splits_a_character() {
        // 67 three-byte chars put byte 200 inside the last one
        let raw = format!("{}}}", "€".repeat(67));
        assert!(serde_json::from_str::<GatewayCommand>(&raw).is_err());

        let preview = log_preview(&raw);
        assert_eq!(preview.len(), 198);
        assert!(preview.chars().all(|c| c == '€'));
    }

    #[test]
    fn short_frames_are_logged_whole() {
        assert_eq!(log_preview("{\"op\":1}"), "{\"op\":1}");
        assert_eq!(log_preview(""), "");
    }
}
