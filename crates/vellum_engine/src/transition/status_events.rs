use log::debug;

use vellum_core::{DomainEvent, TransitionStatusRepository, VellumResult};

/// Apply a `TransitionStatusUpdated` event to the status store. Returns
/// whether the event was consumed. Re-delivery writes the same row, so
/// at-least-once delivery is safe.
pub async fn apply_status_update(
    statuses: &dyn TransitionStatusRepository,
    event: &DomainEvent,
) -> VellumResult<bool> {
    let DomainEvent::TransitionStatusUpdated {
        user_id,
        status,
        transition_type,
        transition_timestamp,
    } = event
    else {
        return Ok(false);
    };
    statuses
        .set_status(*user_id, *transition_type, *status, *transition_timestamp)
        .await?;
    debug!(
        "transition status: user {user_id} {} -> {}",
        transition_type.as_str(),
        status.as_str()
    );
    Ok(true)
}
