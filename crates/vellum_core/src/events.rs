use serde::{Deserialize, Serialize};

use crate::{ItemId, Micros, TransitionStatus, TransitionType, UserId};

/// Events published on the durable bus. Delivery is at-least-once, so
/// handlers must be idempotent on the payload alone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DomainEvent {
    TransitionRequested {
        user_id: UserId,
        transition_type: TransitionType,
        timestamp: Micros,
    },
    TransitionStatusUpdated {
        user_id: UserId,
        status: TransitionStatus,
        transition_type: TransitionType,
        transition_timestamp: Micros,
    },
    ItemRevisionCreationRequested {
        item_id: ItemId,
        user_id: UserId,
    },
    DuplicateItemSynced {
        item_id: ItemId,
        duplicate_of_id: ItemId,
        user_id: UserId,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::TransitionRequested { .. } => "transition-requested",
            DomainEvent::TransitionStatusUpdated { .. } => "transition-status-updated",
            DomainEvent::ItemRevisionCreationRequested { .. } => "item-revision-creation-requested",
            DomainEvent::DuplicateItemSynced { .. } => "duplicate-item-synced",
        }
    }
}
