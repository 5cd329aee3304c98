use std::sync::Arc;

use log::debug;

use vellum_core::{
    AssociationId, ContentType, Dates, DomainEvent, EventPublisher, Item, ItemHash, ItemId,
    ItemRepository, KeySystemAssociation, KeySystemId, Micros, SessionId, SharedVaultAssociation,
    SharedVaultId, Timestamps, UserId, VellumError, VellumResult,
};

/// One incoming mutation for an existing server item.
#[derive(Clone, Debug)]
pub struct UpdateItemInput {
    pub existing_item: Item,
    pub item_hash: ItemHash,
    pub session_id: String,
    pub performing_user_id: String,
}

/// Applies an [`ItemHash`] to an existing item under the conflict rules:
/// deletion clears the payload, associations keep their identity unless the
/// hash names a different vault or key system, and timestamps prefer the
/// microsecond pair over the string pair.
pub struct ItemUpdater {
    items: Arc<dyn ItemRepository>,
    publisher: Arc<dyn EventPublisher>,
}

impl ItemUpdater {
    pub fn new(items: Arc<dyn ItemRepository>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { items, publisher }
    }

    pub async fn update_existing_item(&self, input: UpdateItemInput) -> VellumResult<Item> {
        let hash = &input.item_hash;

        let session_id = SessionId::parse(&input.session_id)?;
        let performing_user_id = UserId::parse(&input.performing_user_id)?;
        let content_type = match hash.content_type.as_deref() {
            Some(raw) => ContentType::parse(raw)?,
            None => return Err(VellumError::invalid("content type is missing")),
        };
        let duplicate_of = hash
            .duplicate_of
            .as_deref()
            .map(ItemId::parse)
            .transpose()?;
        if !hash.has_creation_time() {
            return Err(VellumError::invalid("created at time is missing"));
        }
        let shared_vault_id = hash
            .shared_vault_uuid
            .as_deref()
            .map(SharedVaultId::parse)
            .transpose()?;
        let key_system_id = hash
            .key_system_identifier
            .as_deref()
            .map(KeySystemId::parse)
            .transpose()?;

        let mut item = input.existing_item;
        item.session_id = Some(session_id);
        item.content = hash.content.clone();
        item.content_type = content_type;
        item.enc_item_key = hash.enc_item_key.clone();
        item.auth_hash = hash.auth_hash.clone();
        item.items_key_id = hash.items_key_id.clone();
        if hash.deleted == Some(true) {
            item.deleted = true;
            item.content = None;
            item.enc_item_key = None;
            item.auth_hash = None;
            item.items_key_id = None;
            item.duplicate_of = None;
        } else {
            item.deleted = false;
            item.duplicate_of = duplicate_of;
        }

        item.timestamps = self.compute_timestamps(hash)?;
        item.dates = Dates::from_timestamps(item.timestamps)?;

        if let Some(shared_vault_id) = shared_vault_id {
            let replace = item
                .shared_vault_association
                .map_or(true, |existing| existing.shared_vault_id != shared_vault_id);
            if replace {
                item.shared_vault_association = Some(SharedVaultAssociation {
                    association_id: AssociationId::new(),
                    item_id: item.item_id,
                    shared_vault_id,
                    last_edited_by: performing_user_id,
                    timestamps: item.timestamps,
                });
            }
        }
        if let Some(key_system_id) = key_system_id {
            let replace = item
                .key_system_association
                .map_or(true, |existing| existing.key_system_id != key_system_id);
            if replace {
                item.key_system_association = Some(KeySystemAssociation {
                    association_id: AssociationId::new(),
                    item_id: item.item_id,
                    key_system_id,
                    timestamps: item.timestamps,
                });
            }
        }

        self.items.save(&item).await?;
        debug!("sync: item {} updated for user {}", item.item_id, item.user_id);

        self.publisher
            .publish(&DomainEvent::ItemRevisionCreationRequested {
                item_id: item.item_id,
                user_id: item.user_id,
            })
            .await?;
        if let Some(duplicate_of_id) = duplicate_of {
            self.publisher
                .publish(&DomainEvent::DuplicateItemSynced {
                    item_id: item.item_id,
                    duplicate_of_id,
                    user_id: item.user_id,
                })
                .await?;
        }

        Ok(item)
    }

    /// The microsecond pair wins when both fields are present. A lone
    /// `updated_at_timestamp` does not count: the hash falls back to the
    /// string pair, where a missing `updated_at` means server-now.
    fn compute_timestamps(&self, hash: &ItemHash) -> VellumResult<Timestamps> {
        let (created_at, updated_at) =
            match (hash.created_at_timestamp, hash.updated_at_timestamp) {
                (Some(created), Some(updated)) => {
                    (Micros::from_i64(created), Micros::from_i64(updated))
                }
                _ => {
                    let created = match hash.created_at.as_deref() {
                        Some(raw) => Micros::from_date_string(raw)?,
                        None => return Err(VellumError::invalid("created at time is missing")),
                    };
                    let updated = match hash.updated_at.as_deref() {
                        Some(raw) => Micros::from_date_string(raw)?,
                        None => Micros::now(),
                    };
                    (created, updated)
                }
            };
        Timestamps::new(created_at, updated_at)
    }
}
