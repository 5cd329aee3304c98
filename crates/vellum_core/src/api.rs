use async_trait::async_trait;

use crate::{
    DomainEvent, Item, Micros, Revision, RevisionId, TransitionStatus, TransitionType, User,
    UserId, VellumResult,
};

/// Page request over one user's revisions.
#[derive(Clone, Copy, Debug)]
pub struct FindRevisionsInput {
    pub user_id: UserId,
    pub offset: u64,
    pub limit: u64,
}

/// Page request over users created inside an inclusive window.
#[derive(Clone, Copy, Debug)]
pub struct FindUsersInput {
    pub start: Micros,
    pub end: Micros,
    pub offset: u64,
    pub limit: u64,
}

/// One revision store. The transition engine holds two of these: the primary
/// it migrates into and the secondary it drains.
#[async_trait]
pub trait RevisionRepository: Send + Sync {
    async fn count_by_user_id(&self, user_id: UserId) -> VellumResult<u64>;

    /// Pages are ordered by `(created_at, revision_id)` so that offsets are
    /// stable across calls.
    async fn find_by_user_id(&self, input: FindRevisionsInput) -> VellumResult<Vec<Revision>>;

    async fn find_one_by_uuid(
        &self,
        revision_id: RevisionId,
        user_id: UserId,
    ) -> VellumResult<Option<Revision>>;

    /// Returns whether a row was written; an existing identical key is left
    /// alone and reported as `false`.
    async fn insert(&self, revision: &Revision) -> VellumResult<bool>;

    async fn remove_one_by_uuid(&self, revision_id: RevisionId, user_id: UserId)
        -> VellumResult<()>;

    async fn remove_by_user_id(&self, user_id: UserId) -> VellumResult<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn count_all_created_between(&self, start: Micros, end: Micros) -> VellumResult<u64>;

    async fn find_all_created_between(&self, input: FindUsersInput) -> VellumResult<Vec<User>>;
}

#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Persist the item row together with its association rows, upserting
    /// by association identity.
    async fn save(&self, item: &Item) -> VellumResult<()>;
}

/// Durable per-(user, type) transition bookkeeping. `remove` atomically
/// clears the status and both progress cursors.
#[async_trait]
pub trait TransitionStatusRepository: Send + Sync {
    async fn get_status(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
    ) -> VellumResult<Option<TransitionStatus>>;

    async fn set_status(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
        status: TransitionStatus,
        timestamp: Micros,
    ) -> VellumResult<()>;

    async fn get_paging_progress(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
    ) -> VellumResult<u32>;

    async fn set_paging_progress(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
        progress: u32,
    ) -> VellumResult<()>;

    async fn get_integrity_progress(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
    ) -> VellumResult<u32>;

    async fn set_integrity_progress(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
        progress: u32,
    ) -> VellumResult<()>;

    async fn remove(&self, user_id: UserId, transition_type: TransitionType) -> VellumResult<()>;
}

/// Durable event bus, at-least-once.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> VellumResult<()>;
}
