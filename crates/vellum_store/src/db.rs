use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum VellumUsers {
    Table,
    UserId,
    RolesJson,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum VellumItems {
    Table,
    ItemId,
    UserId,
    SessionId,
    Content,
    ContentType,
    EncItemKey,
    AuthHash,
    ItemsKeyId,
    DuplicateOf,
    Deleted,
    CreatedAtDate,
    UpdatedAtDate,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum VellumItemSharedVaultAssociations {
    Table,
    AssociationId,
    ItemId,
    SharedVaultId,
    LastEditedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum VellumItemKeySystemAssociations {
    Table,
    AssociationId,
    ItemId,
    KeySystemId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum VellumRevisions {
    Table,
    RevisionId,
    UserId,
    ItemId,
    Content,
    ContentType,
    ItemsKeyId,
    EncItemKey,
    AuthHash,
    CreationReason,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum VellumTransitionStatuses {
    Table,
    UserId,
    TransitionType,
    Status,
    PagingProgress,
    IntegrityProgress,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum VellumEventOutbox {
    Table,
    Sequence,
    Kind,
    PayloadJson,
    CreatedAt,
}
