use serde::{Deserialize, Serialize};

use crate::{Micros, UserId};

/// Role granting unconditional re-inclusion in transition scheduling.
pub const ROLE_TRANSITION_USER: &str = "TransitionUser";

/// Account record. Created and mutated elsewhere; the core only reads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub roles: Vec<String>,
    pub created_at: Micros,
    pub updated_at: Micros,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|candidate| candidate == role)
    }
}
