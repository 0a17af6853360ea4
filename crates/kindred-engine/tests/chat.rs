mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;

use kindred_engine::{Engine, EngineConfig, EngineError};
use kindred_gateway::Hub;
use kindred_push::{NotificationDispatcher, PushError, PushGateway, PushMessage, PushTicket};
use kindred_types::events::{ChangeEvent, SubscriptionFilter};
use kindred_types::models::{DeviceType, Gender, NotificationKind};

use common::{answer, confirmed_pair, engine, user};

#[tokio::test]
async fn unconfirmed_and_closed_matches_refuse_messages() {
    let engine = engine();
    let a = user(&engine, Gender::Female);
    let b = user(&engine, Gender::Male);
    answer(&engine, a, &[1]).await;
    answer(&engine, b, &[1]).await;
    let match_id = engine.run_matching(a).await.unwrap().matches[0].id;

    assert!(matches!(
        engine.send_message(match_id, a, "hello").await,
        Err(EngineError::MatchNotConfirmed)
    ));

    engine.decide(match_id, a, true).await.unwrap();
    engine.decide(match_id, b, true).await.unwrap();
    engine.send_message(match_id, a, "hello").await.unwrap();

    // unmatch: history stays, nothing new goes in
    engine.decide(match_id, b, false).await.unwrap();
    assert!(matches!(
        engine.send_message(match_id, a, "still there?").await,
        Err(EngineError::MatchNotConfirmed)
    ));
    let history = engine.list_messages(match_id, b, None, None).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn unread_counts_follow_sends_and_reads() {
    let engine = engine();
    let (match_id, a, b) = confirmed_pair(&engine).await;

    for i in 0..4 {
        engine.send_message(match_id, a, &format!("msg {}", i)).await.unwrap();
    }
    engine.send_message(match_id, b, "reply").await.unwrap();

    let counts = engine.unread_counts(b).await.unwrap();
    assert_eq!(counts.get(&match_id), Some(&4));
    assert_eq!(engine.unread_counts(a).await.unwrap().get(&match_id), Some(&1));

    assert_eq!(engine.mark_read(match_id, b).await.unwrap(), 4);
    assert!(engine.unread_counts(b).await.unwrap().get(&match_id).is_none());
}

#[tokio::test]
async fn history_pages_backwards() {
    let engine = engine();
    let (match_id, a, b) = confirmed_pair(&engine).await;
    for i in 0..5 {
        engine.send_message(match_id, a, &format!("m{}", i)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    let newest = engine.list_messages(match_id, b, Some(2), None).await.unwrap();
    let contents: Vec<&str> = newest.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m3", "m4"]);

    let older = engine
        .list_messages(match_id, b, Some(10), Some(newest[0].id))
        .await
        .unwrap();
    let contents: Vec<&str> = older.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m0", "m1", "m2"]);
}

#[tokio::test]
async fn rapid_messages_all_survive_paging() {
    let engine = engine();
    let (match_id, a, b) = confirmed_pair(&engine).await;
    let mut sent = Vec::new();
    for i in 0..12 {
        sent.push(engine.send_message(match_id, a, &format!("r{}", i)).await.unwrap());
    }

    let mut history = Vec::new();
    let mut before = None;
    loop {
        let mut page = engine.list_messages(match_id, b, Some(1), before).await.unwrap();
        let Some(oldest) = page.first() else { break };
        before = Some(oldest.id);
        page.append(&mut history);
        history = page;
    }

    let ids: Vec<_> = history.iter().map(|m| m.id).collect();
    let expected: Vec<_> = sent.iter().map(|m| m.id).collect();
    assert_eq!(ids, expected);
    // what send_message hands back is what history reads
    assert_eq!(history[0].created_at, sent[0].created_at);
}

#[tokio::test]
async fn live_subscribers_see_messages_and_receipts() {
    let engine = engine();
    let (match_id, a, b) = confirmed_pair(&engine).await;
    let mut room = engine.hub().subscribe(SubscriptionFilter::Match { match_id });

    let sent = engine.send_message(match_id, a, "hi").await.unwrap();
    engine.mark_read(match_id, b).await.unwrap();

    match room.next().await {
        Some(ChangeEvent::MessageCreated { message, recipient_id }) => {
            assert_eq!(message.id, sent.id);
            assert_eq!(recipient_id, b);
        }
        other => panic!("expected message, got {:?}", other),
    }
    match room.next().await {
        Some(ChangeEvent::MessagesRead { message_ids, sender_id, .. }) => {
            assert_eq!(message_ids, vec![sent.id]);
            assert_eq!(sender_id, a);
        }
        other => panic!("expected receipt, got {:?}", other),
    }
}

/// Accepts everything and counts what it saw.
#[derive(Default)]
struct RecordingGateway {
    seen: Mutex<Vec<PushMessage>>,
}

impl PushGateway for RecordingGateway {
    fn send_batch<'a>(
        &'a self,
        messages: &'a [PushMessage],
    ) -> BoxFuture<'a, Result<Vec<PushTicket>, PushError>> {
        Box::pin(async move {
            self.seen.lock().unwrap().extend_from_slice(messages);
            Ok(messages.iter().map(|_| PushTicket::ok()).collect())
        })
    }
}

async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn transitions_fan_out_notifications() {
    let base = engine();
    let db = base.db().clone();
    let hub = Hub::new();
    let gateway = Arc::new(RecordingGateway::default());
    let dispatcher = NotificationDispatcher::new(db.clone(), gateway.clone(), hub.clone());
    let engine = Engine::new(db.clone(), hub, EngineConfig::default()).with_notifier(dispatcher);

    let (match_id, a, b) = confirmed_pair(&engine).await;
    db.upsert_push_token(a, "ExponentPushToken[a]", DeviceType::Ios).unwrap();
    engine.send_message(match_id, b, "hey there").await.unwrap();

    let kinds = |user| {
        db.notification_logs(user)
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect::<Vec<_>>()
    };

    // the seed ran matching, so only the counterpart hears about the proposal
    assert!(eventually(|| kinds(b).contains(&NotificationKind::NewMatch)).await);
    assert!(!kinds(a).contains(&NotificationKind::NewMatch));
    assert!(eventually(|| kinds(a).contains(&NotificationKind::MatchAccepted)).await);
    assert!(eventually(|| kinds(b).contains(&NotificationKind::MatchAccepted)).await);
    assert!(eventually(|| kinds(a).contains(&NotificationKind::NewMessage)).await);
    assert!(eventually(|| !gateway.seen.lock().unwrap().is_empty()).await);
}
