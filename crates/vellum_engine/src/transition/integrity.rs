use std::sync::Arc;

use log::debug;

use vellum_core::{
    FindRevisionsInput, RevisionRepository, TransitionStatusRepository, TransitionType, UserId,
    VellumError, VellumResult,
};

/// Compares the two revision stores after a migration pass. Paging restarts
/// from the durable integrity cursor, so a resumed check never re-reads
/// pages it already accepted.
pub struct IntegrityVerifier {
    primary: Arc<dyn RevisionRepository>,
    secondary: Arc<dyn RevisionRepository>,
    statuses: Arc<dyn TransitionStatusRepository>,
    page_size: u32,
}

impl IntegrityVerifier {
    pub fn new(
        primary: Arc<dyn RevisionRepository>,
        secondary: Arc<dyn RevisionRepository>,
        statuses: Arc<dyn TransitionStatusRepository>,
        page_size: u32,
    ) -> Self {
        Self {
            primary,
            secondary,
            statuses,
            page_size,
        }
    }

    pub async fn verify_user(&self, user_id: UserId) -> VellumResult<()> {
        let primary_count = self.primary.count_by_user_id(user_id).await?;
        let secondary_count = self.secondary.count_by_user_id(user_id).await?;
        if primary_count < secondary_count {
            return Err(VellumError::conflict(format!(
                "primary has {primary_count} revisions for user {user_id}, secondary has {secondary_count}"
            )));
        }

        let page_size = self.page_size.max(1) as u64;
        let total_pages = primary_count.div_ceil(page_size) as u32;
        let start_page = self
            .statuses
            .get_integrity_progress(user_id, TransitionType::Revisions)
            .await?;

        for page in start_page..=total_pages {
            self.statuses
                .set_integrity_progress(user_id, TransitionType::Revisions, page)
                .await?;
            let revisions = self
                .secondary
                .find_by_user_id(FindRevisionsInput {
                    user_id,
                    offset: (page as u64 - 1) * page_size,
                    limit: page_size,
                })
                .await?;
            for revision in revisions {
                let existing = self
                    .primary
                    .find_one_by_uuid(revision.revision_id, user_id)
                    .await?
                    .ok_or_else(|| {
                        VellumError::conflict(format!(
                            "Revision {} not found in primary database",
                            revision.revision_id
                        ))
                    })?;
                if existing.updated_at > revision.updated_at {
                    continue;
                }
                if !existing.identical(&revision) {
                    let primary_json = serde_json::to_string(&existing)
                        .map_err(|err| VellumError::storage(err.to_string()))?;
                    let secondary_json = serde_json::to_string(&revision)
                        .map_err(|err| VellumError::storage(err.to_string()))?;
                    return Err(VellumError::conflict(format!(
                        "revision {} differs between stores: primary={primary_json} secondary={secondary_json}",
                        revision.revision_id
                    )));
                }
            }
            debug!("integrity: user {user_id} page {page}/{total_pages} clean");
        }
        Ok(())
    }
}
