use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::time::sleep;

use vellum_core::{
    DomainEvent, EventPublisher, FindRevisionsInput, Micros, Revision, RevisionRepository,
    TransitionStatus, TransitionStatusRepository, TransitionType, UserId, VellumError,
    VellumResult,
};

use super::integrity::IntegrityVerifier;

/// Drives one user's revision history from the secondary store into the
/// primary, then verifies and drains the secondary.
///
/// The paging cursor is persisted before every page fetch, so a crash or a
/// cancellation between pages resumes where it stopped. Status transitions
/// reach the status store through published events only.
pub struct RevisionMigrator {
    primary: Arc<dyn RevisionRepository>,
    secondary: Option<Arc<dyn RevisionRepository>>,
    statuses: Option<Arc<dyn TransitionStatusRepository>>,
    publisher: Arc<dyn EventPublisher>,
    page_size: u32,
    replication_lag: Duration,
}

struct RunFailure {
    error: VellumError,
    reset_progress: bool,
}

impl RevisionMigrator {
    pub fn new(
        primary: Arc<dyn RevisionRepository>,
        secondary: Option<Arc<dyn RevisionRepository>>,
        statuses: Option<Arc<dyn TransitionStatusRepository>>,
        publisher: Arc<dyn EventPublisher>,
        page_size: u32,
        replication_lag: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            statuses,
            publisher,
            page_size,
            replication_lag,
        }
    }

    pub async fn migrate_user(&self, user_id: UserId) -> VellumResult<()> {
        let secondary = self.secondary.clone().ok_or_else(|| {
            VellumError::configuration("secondary revision store is not configured")
        })?;
        let statuses = self.statuses.clone().ok_or_else(|| {
            VellumError::configuration("transition status store is not configured")
        })?;

        let total = secondary.count_by_user_id(user_id).await.map_err(|err| {
            VellumError::storage(format!(
                "could not count secondary revisions for user {user_id}: {err}"
            ))
        })?;
        if total == 0 {
            self.publish_status(user_id, TransitionStatus::Verified)
                .await?;
            info!("transition: user {user_id} has no secondary revisions, verified");
            return Ok(());
        }

        self.publish_status(user_id, TransitionStatus::InProgress)
            .await?;
        let started_at = Micros::now();

        match self.run(user_id, &secondary, &statuses, total).await {
            Ok(()) => {
                self.publish_status(user_id, TransitionStatus::Verified)
                    .await?;
                let elapsed = Micros::now().as_i64() - started_at.as_i64();
                info!(
                    "transition: user {user_id} verified, {total} revisions in {elapsed} microseconds"
                );
                Ok(())
            }
            Err(failure) => {
                if failure.reset_progress {
                    statuses
                        .set_paging_progress(user_id, TransitionType::Revisions, 1)
                        .await?;
                    statuses
                        .set_integrity_progress(user_id, TransitionType::Revisions, 1)
                        .await?;
                }
                self.publish_status(user_id, TransitionStatus::Failed)
                    .await?;
                error!("transition: user {user_id} failed: {}", failure.error);
                Err(failure.error)
            }
        }
    }

    async fn run(
        &self,
        user_id: UserId,
        secondary: &Arc<dyn RevisionRepository>,
        statuses: &Arc<dyn TransitionStatusRepository>,
        total: u64,
    ) -> Result<(), RunFailure> {
        self.copy_pages(user_id, secondary.as_ref(), statuses.as_ref(), total)
            .await
            .map_err(|error| RunFailure {
                error,
                reset_progress: false,
            })?;

        // Let primary replication catch up before reading our own writes.
        sleep(self.replication_lag).await;

        let verifier = IntegrityVerifier::new(
            self.primary.clone(),
            secondary.clone(),
            statuses.clone(),
            self.page_size,
        );
        verifier
            .verify_user(user_id)
            .await
            .map_err(|error| RunFailure {
                error,
                reset_progress: true,
            })?;

        if let Err(err) = secondary.remove_by_user_id(user_id).await {
            error!("transition: cleanup of secondary revisions for user {user_id} failed: {err}");
            return Err(RunFailure {
                error: err,
                reset_progress: false,
            });
        }
        Ok(())
    }

    async fn copy_pages(
        &self,
        user_id: UserId,
        secondary: &dyn RevisionRepository,
        statuses: &dyn TransitionStatusRepository,
        total: u64,
    ) -> VellumResult<()> {
        let page_size = self.page_size.max(1) as u64;
        let total_pages = total.div_ceil(page_size) as u32;
        let start_page = statuses
            .get_paging_progress(user_id, TransitionType::Revisions)
            .await?;
        let keepalive_stride = total_pages.div_ceil(10).max(1);

        for page in start_page..=total_pages {
            if page % keepalive_stride == 0 {
                self.publish_status(user_id, TransitionStatus::InProgress)
                    .await?;
            }
            statuses
                .set_paging_progress(user_id, TransitionType::Revisions, page)
                .await?;
            let revisions = secondary
                .find_by_user_id(FindRevisionsInput {
                    user_id,
                    offset: (page as u64 - 1) * page_size,
                    limit: page_size,
                })
                .await
                .map_err(|err| {
                    VellumError::storage(format!(
                        "could not fetch secondary page {page} for user {user_id}: {err}"
                    ))
                })?;
            for revision in &revisions {
                if let Err(err) = self.copy_one(revision).await {
                    warn!(
                        "transition: revision {} for user {user_id} skipped: {err}",
                        revision.revision_id
                    );
                }
            }
        }
        Ok(())
    }

    async fn copy_one(&self, revision: &Revision) -> VellumResult<()> {
        let existing = self
            .primary
            .find_one_by_uuid(revision.revision_id, revision.user_id)
            .await?;
        match existing {
            Some(existing) if existing.updated_at > revision.updated_at => Ok(()),
            Some(existing) if existing.identical(revision) => Ok(()),
            Some(_) => {
                self.primary
                    .remove_one_by_uuid(revision.revision_id, revision.user_id)
                    .await?;
                sleep(self.replication_lag).await;
                self.primary.insert(revision).await?;
                Ok(())
            }
            None => {
                self.primary.insert(revision).await?;
                Ok(())
            }
        }
    }

    async fn publish_status(&self, user_id: UserId, status: TransitionStatus) -> VellumResult<()> {
        self.publisher
            .publish(&DomainEvent::TransitionStatusUpdated {
                user_id,
                status,
                transition_type: TransitionType::Revisions,
                transition_timestamp: Micros::now(),
            })
            .await
    }
}
