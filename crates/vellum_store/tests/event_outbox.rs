use std::path::Path;
use std::time::Duration;

use tempfile::tempdir;
use tokio::time::timeout;

use vellum_store::{
    DatabaseConfig, DomainEvent, EventPublisher, ItemId, Micros, TransitionStatus, TransitionType,
    UserId, VellumStore,
};

async fn open_store(base: &Path) -> VellumStore {
    let database = DatabaseConfig::Sqlite {
        path: Some("outbox.sqlite".to_string()),
    };
    VellumStore::connect(&database, None, base)
        .await
        .expect("connect")
}

fn requested(user_id: UserId) -> DomainEvent {
    DomainEvent::TransitionRequested {
        user_id,
        transition_type: TransitionType::Revisions,
        timestamp: Micros(1),
    }
}

#[tokio::test]
async fn publishing_assigns_monotone_sequences() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    let user_id = UserId::new();

    assert_eq!(store.latest_event_sequence().await.expect("latest"), None);

    store.publish(&requested(user_id)).await.expect("publish");
    store
        .publish(&DomainEvent::TransitionStatusUpdated {
            user_id,
            status: TransitionStatus::InProgress,
            transition_type: TransitionType::Revisions,
            transition_timestamp: Micros(2),
        })
        .await
        .expect("publish");
    store
        .publish(&DomainEvent::ItemRevisionCreationRequested {
            item_id: ItemId::new(),
            user_id,
        })
        .await
        .expect("publish");

    let events = store.get_events_since(None, 10).await.expect("read");
    let sequences: Vec<_> = events.iter().map(|event| event.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(events[0].kind, "transition-requested");
    assert_eq!(events[1].kind, "transition-status-updated");
    assert_eq!(events[2].kind, "item-revision-creation-requested");
    assert_eq!(store.latest_event_sequence().await.expect("latest"), Some(3));
}

#[tokio::test]
async fn reads_resume_from_a_sequence_cursor() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    let user_id = UserId::new();

    for _ in 0..4 {
        store.publish(&requested(user_id)).await.expect("publish");
    }

    let tail = store.get_events_since(Some(2), 10).await.expect("read");
    let sequences: Vec<_> = tail.iter().map(|event| event.sequence).collect();
    assert_eq!(sequences, vec![3, 4]);
}

#[tokio::test]
async fn payloads_roundtrip_through_the_outbox() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    let event = requested(UserId::new());

    store.publish(&event).await.expect("publish");
    let events = store.get_events_since(None, 10).await.expect("read");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, event);
}

#[tokio::test]
async fn subscriptions_deliver_in_sequence_order() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    let user_id = UserId::new();

    store.publish(&requested(user_id)).await.expect("publish");
    let mut rx = store.subscribe_events(None).await.expect("subscribe");

    let first = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first event in time")
        .expect("channel open");
    assert_eq!(first.sequence, 1);

    store.publish(&requested(user_id)).await.expect("publish");
    let second = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("second event in time")
        .expect("channel open");
    assert_eq!(second.sequence, 2);
}
