use serde::{Deserialize, Serialize};

use crate::{VellumError, VellumResult};

/// Which dataset a per-user transition covers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionType {
    Items,
    Revisions,
}

impl TransitionType {
    pub const ALL: [TransitionType; 2] = [TransitionType::Items, TransitionType::Revisions];

    pub fn as_str(self) -> &'static str {
        match self {
            TransitionType::Items => "items",
            TransitionType::Revisions => "revisions",
        }
    }

    pub fn parse(value: &str) -> VellumResult<Self> {
        match value {
            "items" => Ok(TransitionType::Items),
            "revisions" => Ok(TransitionType::Revisions),
            other => Err(VellumError::invalid(format!(
                "unknown transition type '{other}'"
            ))),
        }
    }
}

/// Lifecycle state of one (user, type) transition. Absence of a row means
/// the transition has never started.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionStatus {
    InProgress,
    Verified,
    Failed,
}

impl TransitionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionStatus::InProgress => "in-progress",
            TransitionStatus::Verified => "verified",
            TransitionStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> VellumResult<Self> {
        match value {
            "in-progress" => Ok(TransitionStatus::InProgress),
            "verified" => Ok(TransitionStatus::Verified),
            "failed" => Ok(TransitionStatus::Failed),
            other => Err(VellumError::invalid(format!(
                "unknown transition status '{other}'"
            ))),
        }
    }
}
