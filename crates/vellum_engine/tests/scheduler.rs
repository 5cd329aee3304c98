use std::path::Path;
use std::sync::Arc;

use tempfile::tempdir;

use vellum_engine::TransitionScheduler;
use vellum_store::{
    DatabaseConfig, DomainEvent, Micros, TransitionStatus, TransitionStatusRepository,
    TransitionType, User, UserId, VellumStore, ROLE_TRANSITION_USER,
};

const WINDOW_START: Micros = Micros(1_000);
const WINDOW_END: Micros = Micros(2_000);

async fn open_store(base: &Path) -> Arc<VellumStore> {
    let database = DatabaseConfig::Sqlite {
        path: Some("scheduler.sqlite".to_string()),
    };
    Arc::new(
        VellumStore::connect(&database, None, base)
            .await
            .expect("connect"),
    )
}

fn scheduler(store: &Arc<VellumStore>) -> TransitionScheduler {
    TransitionScheduler::new(store.clone(), store.clone(), store.clone(), 100)
}

async fn seed_user(store: &VellumStore, created_at: Micros, roles: &[&str]) -> UserId {
    let user = User {
        user_id: UserId::new(),
        roles: roles.iter().map(|role| role.to_string()).collect(),
        created_at,
        updated_at: created_at,
    };
    store.insert_user(&user).await.expect("insert user");
    user.user_id
}

async fn requested_events(store: &VellumStore) -> Vec<(UserId, TransitionType)> {
    store
        .get_events_since(None, 100)
        .await
        .expect("events")
        .into_iter()
        .filter_map(|stored| match stored.event {
            DomainEvent::TransitionRequested {
                user_id,
                transition_type,
                ..
            } => Some((user_id, transition_type)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn new_users_get_both_transition_types_requested() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    let user_id = seed_user(&store, Micros(1_500), &[]).await;

    let outcome = scheduler(&store)
        .schedule(WINDOW_START, WINDOW_END, false)
        .await
        .expect("schedule");

    assert_eq!(outcome.users_scanned, 1);
    assert_eq!(outcome.requested, 2);
    assert_eq!(outcome.skipped, 0);
    let events = requested_events(&store).await;
    assert_eq!(
        events,
        vec![
            (user_id, TransitionType::Items),
            (user_id, TransitionType::Revisions),
        ]
    );
}

#[tokio::test]
async fn users_outside_the_window_are_not_scanned() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    seed_user(&store, Micros(999), &[]).await;
    seed_user(&store, Micros(2_001), &[]).await;
    let inside = seed_user(&store, Micros(2_000), &[]).await;

    let outcome = scheduler(&store)
        .schedule(WINDOW_START, WINDOW_END, false)
        .await
        .expect("schedule");

    assert_eq!(outcome.users_scanned, 1);
    let events = requested_events(&store).await;
    assert!(events.iter().all(|(user_id, _)| *user_id == inside));
}

#[tokio::test]
async fn fully_verified_users_are_skipped() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    let user_id = seed_user(&store, Micros(1_500), &[]).await;
    for transition_type in TransitionType::ALL {
        store
            .set_status(
                user_id,
                transition_type,
                TransitionStatus::Verified,
                Micros(1),
            )
            .await
            .expect("set status");
    }

    let outcome = scheduler(&store)
        .schedule(WINDOW_START, WINDOW_END, false)
        .await
        .expect("schedule");

    assert_eq!(outcome.requested, 0);
    assert_eq!(outcome.skipped, 2);
    assert!(requested_events(&store).await.is_empty());
}

#[tokio::test]
async fn failed_transitions_are_rerequested_with_fresh_state() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    let user_id = seed_user(&store, Micros(1_500), &[]).await;
    store
        .set_status(
            user_id,
            TransitionType::Items,
            TransitionStatus::Verified,
            Micros(1),
        )
        .await
        .expect("set status");
    store
        .set_status(
            user_id,
            TransitionType::Revisions,
            TransitionStatus::Failed,
            Micros(1),
        )
        .await
        .expect("set status");
    store
        .set_paging_progress(user_id, TransitionType::Revisions, 6)
        .await
        .expect("set paging");

    let outcome = scheduler(&store)
        .schedule(WINDOW_START, WINDOW_END, false)
        .await
        .expect("schedule");

    assert_eq!(outcome.requested, 1);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(
        requested_events(&store).await,
        vec![(user_id, TransitionType::Revisions)]
    );
    // The status row was dropped, so the next attempt pages from scratch.
    assert_eq!(
        store
            .get_status(user_id, TransitionType::Revisions)
            .await
            .expect("status"),
        None
    );
    assert_eq!(
        store
            .get_paging_progress(user_id, TransitionType::Revisions)
            .await
            .expect("paging"),
        1
    );
}

#[tokio::test]
async fn in_progress_transitions_need_force_run() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    let user_id = seed_user(&store, Micros(1_500), &[]).await;
    store
        .set_status(
            user_id,
            TransitionType::Items,
            TransitionStatus::Verified,
            Micros(1),
        )
        .await
        .expect("set status");
    store
        .set_status(
            user_id,
            TransitionType::Revisions,
            TransitionStatus::InProgress,
            Micros(1),
        )
        .await
        .expect("set status");

    let unforced = scheduler(&store)
        .schedule(WINDOW_START, WINDOW_END, false)
        .await
        .expect("schedule");
    assert_eq!(unforced.requested, 0);
    assert!(requested_events(&store).await.is_empty());

    let forced = scheduler(&store)
        .schedule(WINDOW_START, WINDOW_END, true)
        .await
        .expect("schedule forced");
    assert_eq!(forced.requested, 1);
    assert_eq!(
        requested_events(&store).await,
        vec![(user_id, TransitionType::Revisions)]
    );
}

#[tokio::test]
async fn transition_role_holders_are_reconsidered_but_verified_stays_settled() {
    let dir = tempdir().expect("tempdir");
    let store = open_store(dir.path()).await;
    let user_id = seed_user(&store, Micros(1_500), &[ROLE_TRANSITION_USER]).await;
    store
        .set_status(
            user_id,
            TransitionType::Items,
            TransitionStatus::Verified,
            Micros(1),
        )
        .await
        .expect("set status");

    let outcome = scheduler(&store)
        .schedule(WINDOW_START, WINDOW_END, false)
        .await
        .expect("schedule");

    // Items stays verified; revisions never started, so it is requested.
    assert_eq!(outcome.requested, 1);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(
        requested_events(&store).await,
        vec![(user_id, TransitionType::Revisions)]
    );
}
