use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;

use vellum_engine::{apply_status_update, RevisionMigrator};
use vellum_store::{
    DatabaseConfig, DomainEvent, Micros, Revision, RevisionId, RevisionRepository,
    TransitionStatus, TransitionStatusRepository, TransitionType, UserId, VellumError,
    VellumStore,
};

// Shortened stand-in for the production 2 s replication pause; the pause
// itself still executes on every run.
const LAG: Duration = Duration::from_millis(10);

async fn open_store(base: &Path, name: &str) -> Arc<VellumStore> {
    let database = DatabaseConfig::Sqlite {
        path: Some(name.to_string()),
    };
    Arc::new(
        VellumStore::connect(&database, None, base)
            .await
            .expect("connect"),
    )
}

async fn open_pair(base: &Path) -> (Arc<VellumStore>, Arc<VellumStore>) {
    let primary = open_store(base, "primary.sqlite").await;
    let secondary = open_store(base, "secondary.sqlite").await;
    (primary, secondary)
}

fn migrator(
    primary: &Arc<VellumStore>,
    secondary: &Arc<VellumStore>,
    page_size: u32,
) -> RevisionMigrator {
    RevisionMigrator::new(
        primary.clone(),
        Some(secondary.clone() as Arc<dyn RevisionRepository>),
        Some(primary.clone() as Arc<dyn TransitionStatusRepository>),
        primary.clone(),
        page_size,
        LAG,
    )
}

fn revision(user_id: UserId, created: i64) -> Revision {
    Revision {
        revision_id: RevisionId::new(),
        user_id,
        item_id: None,
        content: Some(format!("ciphertext-{created}")),
        content_type: Some("note".to_string()),
        items_key_id: None,
        enc_item_key: None,
        auth_hash: None,
        creation_reason: Some("sync".to_string()),
        created_at: Micros(created),
        updated_at: Micros(created),
    }
}

async fn seed(store: &VellumStore, revisions: &[Revision]) {
    for revision in revisions {
        assert!(store.insert(revision).await.expect("seed insert"));
    }
}

async fn status_events(store: &VellumStore) -> Vec<TransitionStatus> {
    store
        .get_events_since(None, 100)
        .await
        .expect("events")
        .into_iter()
        .filter_map(|stored| match stored.event {
            DomainEvent::TransitionStatusUpdated { status, .. } => Some(status),
            _ => None,
        })
        .collect()
}

async fn apply_all_events(store: &VellumStore) {
    for stored in store.get_events_since(None, 100).await.expect("events") {
        apply_status_update(store, &stored.event)
            .await
            .expect("apply");
    }
}

#[tokio::test]
async fn fresh_migration_copies_pages_verifies_and_drains() {
    let dir = tempdir().expect("tempdir");
    let (primary, secondary) = open_pair(dir.path()).await;
    let user_id = UserId::new();
    let revisions: Vec<_> = (1..=12).map(|i| revision(user_id, i)).collect();
    seed(&secondary, &revisions).await;

    migrator(&primary, &secondary, 5)
        .migrate_user(user_id)
        .await
        .expect("migrate");

    assert_eq!(primary.count_by_user_id(user_id).await.expect("count"), 12);
    assert_eq!(secondary.count_by_user_id(user_id).await.expect("count"), 0);
    for revision in &revisions {
        let copied = primary
            .find_one_by_uuid(revision.revision_id, user_id)
            .await
            .expect("find")
            .expect("copied");
        assert!(copied.identical(revision));
    }

    assert_eq!(
        primary
            .get_paging_progress(user_id, TransitionType::Revisions)
            .await
            .expect("paging"),
        3
    );

    let statuses = status_events(&primary).await;
    assert_eq!(statuses.first(), Some(&TransitionStatus::InProgress));
    assert_eq!(statuses.last(), Some(&TransitionStatus::Verified));
    assert!(statuses[..statuses.len() - 1]
        .iter()
        .all(|status| *status == TransitionStatus::InProgress));

    apply_all_events(&primary).await;
    assert_eq!(
        primary
            .get_status(user_id, TransitionType::Revisions)
            .await
            .expect("status"),
        Some(TransitionStatus::Verified)
    );
}

#[tokio::test]
async fn empty_secondary_short_circuits_to_verified() {
    let dir = tempdir().expect("tempdir");
    let (primary, secondary) = open_pair(dir.path()).await;
    let user_id = UserId::new();

    migrator(&primary, &secondary, 5)
        .migrate_user(user_id)
        .await
        .expect("migrate");

    assert_eq!(primary.count_by_user_id(user_id).await.expect("count"), 0);
    let statuses = status_events(&primary).await;
    assert_eq!(statuses, vec![TransitionStatus::Verified]);
}

#[tokio::test]
async fn rerunning_a_verified_migration_is_a_noop() {
    let dir = tempdir().expect("tempdir");
    let (primary, secondary) = open_pair(dir.path()).await;
    let user_id = UserId::new();
    seed(&secondary, &[revision(user_id, 1), revision(user_id, 2)]).await;

    let migrator = migrator(&primary, &secondary, 5);
    migrator.migrate_user(user_id).await.expect("first run");
    let events_after_first = status_events(&primary).await.len();

    migrator.migrate_user(user_id).await.expect("second run");

    assert_eq!(primary.count_by_user_id(user_id).await.expect("count"), 2);
    let statuses = status_events(&primary).await;
    assert_eq!(statuses.len(), events_after_first + 1);
    assert_eq!(statuses.last(), Some(&TransitionStatus::Verified));
}

#[tokio::test]
async fn resume_starts_from_the_stored_paging_cursor() {
    let dir = tempdir().expect("tempdir");
    let (primary, secondary) = open_pair(dir.path()).await;
    let user_id = UserId::new();
    let revisions: Vec<_> = (1..=12).map(|i| revision(user_id, i)).collect();
    seed(&secondary, &revisions).await;
    // Page 1 already made it across in a previous attempt.
    seed(&primary, &revisions[..5]).await;
    primary
        .set_paging_progress(user_id, TransitionType::Revisions, 2)
        .await
        .expect("cursor");

    migrator(&primary, &secondary, 5)
        .migrate_user(user_id)
        .await
        .expect("migrate");

    assert_eq!(primary.count_by_user_id(user_id).await.expect("count"), 12);
    assert_eq!(secondary.count_by_user_id(user_id).await.expect("count"), 0);
    assert_eq!(
        primary
            .get_paging_progress(user_id, TransitionType::Revisions)
            .await
            .expect("paging"),
        3
    );
}

#[tokio::test]
async fn newer_secondary_copy_replaces_a_conflicting_primary_copy() {
    let dir = tempdir().expect("tempdir");
    let (primary, secondary) = open_pair(dir.path()).await;
    let user_id = UserId::new();

    let mut stale = revision(user_id, 1);
    stale.updated_at = Micros(100);
    stale.content = Some("stale ciphertext".to_string());
    let mut fresh = stale.clone();
    fresh.updated_at = Micros(200);
    fresh.content = Some("fresh ciphertext".to_string());

    seed(&primary, &[stale]).await;
    seed(&secondary, &[fresh.clone()]).await;

    migrator(&primary, &secondary, 5)
        .migrate_user(user_id)
        .await
        .expect("migrate");

    let kept = primary
        .find_one_by_uuid(fresh.revision_id, user_id)
        .await
        .expect("find")
        .expect("present");
    assert!(kept.identical(&fresh));
    assert_eq!(secondary.count_by_user_id(user_id).await.expect("count"), 0);
}

#[tokio::test]
async fn newer_primary_copy_survives_the_migration() {
    let dir = tempdir().expect("tempdir");
    let (primary, secondary) = open_pair(dir.path()).await;
    let user_id = UserId::new();

    let mut authoritative = revision(user_id, 1);
    authoritative.updated_at = Micros(300);
    authoritative.content = Some("authoritative ciphertext".to_string());
    let mut outdated = authoritative.clone();
    outdated.updated_at = Micros(200);
    outdated.content = Some("outdated ciphertext".to_string());

    seed(&primary, &[authoritative.clone()]).await;
    seed(&secondary, &[outdated]).await;

    migrator(&primary, &secondary, 5)
        .migrate_user(user_id)
        .await
        .expect("migrate");

    let kept = primary
        .find_one_by_uuid(authoritative.revision_id, user_id)
        .await
        .expect("find")
        .expect("present");
    assert!(kept.identical(&authoritative));
    let statuses = status_events(&primary).await;
    assert_eq!(statuses.last(), Some(&TransitionStatus::Verified));
}

#[tokio::test]
async fn integrity_failure_resets_both_cursors_and_fails() {
    let dir = tempdir().expect("tempdir");
    let (primary, secondary) = open_pair(dir.path()).await;
    let user_id = UserId::new();

    // Eleven matching revisions plus one primary-only extra keep the counts
    // equal while the twelfth secondary revision never lands in primary
    // (its insert is dropped by the failpoint).
    let revisions: Vec<_> = (1..=12).map(|i| revision(user_id, i)).collect();
    seed(&secondary, &revisions).await;
    seed(&primary, &revisions[..11]).await;
    seed(&primary, &[revision(user_id, 99)]).await;
    let primary = Arc::new(
        (*primary)
            .clone()
            .with_failpoints(["before_revision_insert".to_string()]),
    );

    let err = migrator(&primary, &secondary, 5)
        .migrate_user(user_id)
        .await
        .expect_err("integrity must fail");
    assert!(err.to_string().contains("not found in primary database"));

    assert_eq!(
        primary
            .get_paging_progress(user_id, TransitionType::Revisions)
            .await
            .expect("paging"),
        1
    );
    assert_eq!(
        primary
            .get_integrity_progress(user_id, TransitionType::Revisions)
            .await
            .expect("integrity"),
        1
    );
    let statuses = status_events(&primary).await;
    assert_eq!(statuses.last(), Some(&TransitionStatus::Failed));
    // Secondary is untouched on a failed run.
    assert_eq!(
        secondary.count_by_user_id(user_id).await.expect("count"),
        12
    );
}

#[tokio::test]
async fn cleanup_failure_still_marks_failed_without_resetting_cursors() {
    let dir = tempdir().expect("tempdir");
    let (primary, secondary) = open_pair(dir.path()).await;
    let user_id = UserId::new();
    let revisions: Vec<_> = (1..=4).map(|i| revision(user_id, i)).collect();
    seed(&secondary, &revisions).await;
    let secondary = Arc::new(
        (*secondary)
            .clone()
            .with_failpoints(["before_revision_remove_by_user".to_string()]),
    );

    let err = migrator(&primary, &secondary, 2)
        .migrate_user(user_id)
        .await
        .expect_err("cleanup must fail");
    assert!(err.to_string().contains("failpoint"));

    // Every revision made it across and verified before cleanup broke.
    assert_eq!(primary.count_by_user_id(user_id).await.expect("count"), 4);
    assert_eq!(
        primary
            .get_paging_progress(user_id, TransitionType::Revisions)
            .await
            .expect("paging"),
        2,
        "cleanup failure must not reset paging"
    );
    let statuses = status_events(&primary).await;
    assert_eq!(statuses.last(), Some(&TransitionStatus::Failed));
}

#[tokio::test]
async fn missing_secondary_store_is_a_configuration_error() {
    let dir = tempdir().expect("tempdir");
    let primary = open_store(dir.path(), "primary.sqlite").await;
    let user_id = UserId::new();

    let migrator = RevisionMigrator::new(
        primary.clone(),
        None,
        Some(primary.clone() as Arc<dyn TransitionStatusRepository>),
        primary.clone(),
        5,
        LAG,
    );
    let err = migrator
        .migrate_user(user_id)
        .await
        .expect_err("must fail fast");
    assert!(matches!(err, VellumError::Configuration { .. }));
    assert!(status_events(&primary).await.is_empty());
}

#[tokio::test]
async fn single_page_covers_a_count_below_page_size() {
    let dir = tempdir().expect("tempdir");
    let (primary, secondary) = open_pair(dir.path()).await;
    let user_id = UserId::new();
    seed(&secondary, &[revision(user_id, 1), revision(user_id, 2)]).await;

    migrator(&primary, &secondary, 100)
        .migrate_user(user_id)
        .await
        .expect("migrate");

    assert_eq!(primary.count_by_user_id(user_id).await.expect("count"), 2);
    assert_eq!(
        primary
            .get_paging_progress(user_id, TransitionType::Revisions)
            .await
            .expect("paging"),
        1
    );
}
