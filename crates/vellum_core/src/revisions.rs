use serde::{Deserialize, Serialize};

use crate::{ItemId, Micros, RevisionId, UserId};

/// Immutable historical record of an item's state. Never updated after
/// insert; conflicting copies are replaced wholesale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub revision_id: RevisionId,
    pub user_id: UserId,
    pub item_id: Option<ItemId>,
    pub content: Option<String>,
    pub content_type: Option<String>,
    pub items_key_id: Option<String>,
    pub enc_item_key: Option<String>,
    pub auth_hash: Option<String>,
    pub creation_reason: Option<String>,
    pub created_at: Micros,
    pub updated_at: Micros,
}

impl Revision {
    /// Two revisions are identical iff every payload field and both
    /// timestamps agree.
    pub fn identical(&self, other: &Revision) -> bool {
        self == other
    }
}
