use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    AssociationId, ItemId, KeySystemId, Micros, SessionId, SharedVaultId, UserId, VellumError,
    VellumResult,
};

/// The fixed vocabulary of item content types accepted from clients.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Note,
    Tag,
    ItemsKey,
    KeySystemItemsKey,
    KeySystemRootKey,
    UserPreferences,
    SmartView,
    Component,
    Theme,
    File,
    ExtensionRepo,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Note => "note",
            ContentType::Tag => "tag",
            ContentType::ItemsKey => "items-key",
            ContentType::KeySystemItemsKey => "key-system-items-key",
            ContentType::KeySystemRootKey => "key-system-root-key",
            ContentType::UserPreferences => "user-preferences",
            ContentType::SmartView => "smart-view",
            ContentType::Component => "component",
            ContentType::Theme => "theme",
            ContentType::File => "file",
            ContentType::ExtensionRepo => "extension-repo",
        }
    }

    pub fn parse(value: &str) -> VellumResult<Self> {
        match value {
            "note" => Ok(ContentType::Note),
            "tag" => Ok(ContentType::Tag),
            "items-key" => Ok(ContentType::ItemsKey),
            "key-system-items-key" => Ok(ContentType::KeySystemItemsKey),
            "key-system-root-key" => Ok(ContentType::KeySystemRootKey),
            "user-preferences" => Ok(ContentType::UserPreferences),
            "smart-view" => Ok(ContentType::SmartView),
            "component" => Ok(ContentType::Component),
            "theme" => Ok(ContentType::Theme),
            "file" => Ok(ContentType::File),
            "extension-repo" => Ok(ContentType::ExtensionRepo),
            other => Err(VellumError::invalid(format!(
                "unknown content type '{other}'"
            ))),
        }
    }
}

/// Machine timestamps for an item, UTC microseconds. `updated_at` can never
/// precede `created_at`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Timestamps {
    created_at: Micros,
    updated_at: Micros,
}

impl Timestamps {
    pub fn new(created_at: Micros, updated_at: Micros) -> VellumResult<Self> {
        if updated_at < created_at {
            return Err(VellumError::invalid(format!(
                "updated at {updated_at} precedes created at {created_at}"
            )));
        }
        Ok(Self {
            created_at,
            updated_at,
        })
    }

    pub fn created_at(self) -> Micros {
        self.created_at
    }

    pub fn updated_at(self) -> Micros {
        self.updated_at
    }
}

/// Human-time shadow of [`Timestamps`], kept alongside it for API payloads.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Dates {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dates {
    pub fn from_timestamps(timestamps: Timestamps) -> VellumResult<Self> {
        Ok(Self {
            created_at: timestamps.created_at().to_datetime()?,
            updated_at: timestamps.updated_at().to_datetime()?,
        })
    }
}

/// Membership of an item in a shared vault. The association id is stable for
/// as long as the item stays in the same vault.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SharedVaultAssociation {
    pub association_id: AssociationId,
    pub item_id: ItemId,
    pub shared_vault_id: SharedVaultId,
    pub last_edited_by: UserId,
    pub timestamps: Timestamps,
}

/// Binding of an item to a key system, with the same identity rule as
/// [`SharedVaultAssociation`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeySystemAssociation {
    pub association_id: AssociationId,
    pub item_id: ItemId,
    pub key_system_id: KeySystemId,
    pub timestamps: Timestamps,
}

/// Latest server-held state of a note-like entity. Payload fields are opaque
/// ciphertext stored verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_id: ItemId,
    pub user_id: UserId,
    pub session_id: Option<SessionId>,
    pub content: Option<String>,
    pub content_type: ContentType,
    pub enc_item_key: Option<String>,
    pub auth_hash: Option<String>,
    pub items_key_id: Option<String>,
    pub duplicate_of: Option<ItemId>,
    pub deleted: bool,
    pub dates: Dates,
    pub timestamps: Timestamps,
    pub shared_vault_association: Option<SharedVaultAssociation>,
    pub key_system_association: Option<KeySystemAssociation>,
}

/// Client-submitted desired mutation for one item, exactly as it arrives on
/// the wire. Everything is optional until validated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemHash {
    pub content: Option<String>,
    pub content_type: Option<String>,
    pub enc_item_key: Option<String>,
    pub auth_hash: Option<String>,
    pub items_key_id: Option<String>,
    pub duplicate_of: Option<String>,
    pub deleted: Option<bool>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub created_at_timestamp: Option<i64>,
    pub updated_at_timestamp: Option<i64>,
    pub shared_vault_uuid: Option<String>,
    pub key_system_identifier: Option<String>,
}

impl ItemHash {
    /// At least one accepted creation-time form must be present.
    pub fn has_creation_time(&self) -> bool {
        self.created_at_timestamp.is_some() || self.created_at.is_some()
    }
}
