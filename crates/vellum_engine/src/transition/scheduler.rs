use std::sync::Arc;

use log::{debug, info};

use vellum_core::{
    DomainEvent, EventPublisher, FindUsersInput, Micros, TransitionStatus,
    TransitionStatusRepository, TransitionType, User, UserId, UserRepository, VellumResult,
    ROLE_TRANSITION_USER,
};

/// Aggregate result of one scheduling pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScheduleOutcome {
    pub users_scanned: u64,
    pub requested: u64,
    pub skipped: u64,
}

/// Walks users created inside a window and requests transitions for the
/// candidates. Deleting the status row before each request makes retries
/// safe: a re-request always starts from fresh paging.
pub struct TransitionScheduler {
    users: Arc<dyn UserRepository>,
    statuses: Arc<dyn TransitionStatusRepository>,
    publisher: Arc<dyn EventPublisher>,
    page_size: u32,
}

impl TransitionScheduler {
    pub fn new(
        users: Arc<dyn UserRepository>,
        statuses: Arc<dyn TransitionStatusRepository>,
        publisher: Arc<dyn EventPublisher>,
        page_size: u32,
    ) -> Self {
        Self {
            users,
            statuses,
            publisher,
            page_size,
        }
    }

    pub async fn schedule(
        &self,
        start: Micros,
        end: Micros,
        force_run: bool,
    ) -> VellumResult<ScheduleOutcome> {
        let mut outcome = ScheduleOutcome::default();
        let page_size = self.page_size.max(1) as u64;
        let total = self.users.count_all_created_between(start, end).await?;
        let total_pages = total.div_ceil(page_size);

        for page in 1..=total_pages {
            let batch = self
                .users
                .find_all_created_between(FindUsersInput {
                    start,
                    end,
                    offset: (page - 1) * page_size,
                    limit: page_size,
                })
                .await?;
            for user in batch {
                outcome.users_scanned += 1;
                self.schedule_user(&user, force_run, &mut outcome).await?;
            }
        }

        info!(
            "transition scheduling: scanned {} users, requested {}, skipped {}",
            outcome.users_scanned, outcome.requested, outcome.skipped
        );
        Ok(outcome)
    }

    async fn schedule_user(
        &self,
        user: &User,
        force_run: bool,
        outcome: &mut ScheduleOutcome,
    ) -> VellumResult<()> {
        let items_status = self
            .statuses
            .get_status(user.user_id, TransitionType::Items)
            .await?;
        let revisions_status = self
            .statuses
            .get_status(user.user_id, TransitionType::Revisions)
            .await?;

        let fully_verified = items_status == Some(TransitionStatus::Verified)
            && revisions_status == Some(TransitionStatus::Verified);
        if fully_verified && !user.has_role(ROLE_TRANSITION_USER) {
            debug!("transition scheduling: user {} already verified", user.user_id);
            outcome.skipped += 2;
            return Ok(());
        }

        for (transition_type, status) in [
            (TransitionType::Items, items_status),
            (TransitionType::Revisions, revisions_status),
        ] {
            let trigger = match status {
                None | Some(TransitionStatus::Failed) => true,
                Some(TransitionStatus::InProgress) => force_run,
                Some(TransitionStatus::Verified) => false,
            };
            if trigger {
                self.request_transition(user.user_id, transition_type)
                    .await?;
                outcome.requested += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        Ok(())
    }

    async fn request_transition(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
    ) -> VellumResult<()> {
        self.statuses.remove(user_id, transition_type).await?;
        self.publisher
            .publish(&DomainEvent::TransitionRequested {
                user_id,
                transition_type,
                timestamp: Micros::now(),
            })
            .await
    }
}
