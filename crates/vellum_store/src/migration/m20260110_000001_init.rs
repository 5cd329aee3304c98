use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(VellumUsers::Table)
                    .if_not_exists()
                    .col(id_col(backend, VellumUsers::UserId, false))
                    .col(ColumnDef::new(VellumUsers::RolesJson).text().not_null())
                    .col(
                        ColumnDef::new(VellumUsers::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VellumUsers::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_vellum_users")
                            .col(VellumUsers::UserId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vellum_users_created_at")
                    .if_not_exists()
                    .table(VellumUsers::Table)
                    .col(VellumUsers::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VellumItems::Table)
                    .if_not_exists()
                    .col(id_col(backend, VellumItems::ItemId, false))
                    .col(id_col(backend, VellumItems::UserId, false))
                    .col(id_col(backend, VellumItems::SessionId, true))
                    .col(ColumnDef::new(VellumItems::Content).text())
                    .col(
                        ColumnDef::new(VellumItems::ContentType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VellumItems::EncItemKey).text())
                    .col(ColumnDef::new(VellumItems::AuthHash).text())
                    .col(ColumnDef::new(VellumItems::ItemsKeyId).string())
                    .col(id_col(backend, VellumItems::DuplicateOf, true))
                    .col(ColumnDef::new(VellumItems::Deleted).boolean().not_null())
                    .col(
                        ColumnDef::new(VellumItems::CreatedAtDate)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VellumItems::UpdatedAtDate)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VellumItems::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VellumItems::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_vellum_items")
                            .col(VellumItems::ItemId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vellum_items_user_id")
                    .if_not_exists()
                    .table(VellumItems::Table)
                    .col(VellumItems::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VellumItemSharedVaultAssociations::Table)
                    .if_not_exists()
                    .col(id_col(
                        backend,
                        VellumItemSharedVaultAssociations::AssociationId,
                        false,
                    ))
                    .col(id_col(
                        backend,
                        VellumItemSharedVaultAssociations::ItemId,
                        false,
                    ))
                    .col(id_col(
                        backend,
                        VellumItemSharedVaultAssociations::SharedVaultId,
                        false,
                    ))
                    .col(id_col(
                        backend,
                        VellumItemSharedVaultAssociations::LastEditedBy,
                        false,
                    ))
                    .col(
                        ColumnDef::new(VellumItemSharedVaultAssociations::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VellumItemSharedVaultAssociations::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_vellum_item_shared_vault_associations")
                            .col(VellumItemSharedVaultAssociations::AssociationId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vellum_shared_vault_assoc_item_id")
                    .if_not_exists()
                    .table(VellumItemSharedVaultAssociations::Table)
                    .col(VellumItemSharedVaultAssociations::ItemId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VellumItemKeySystemAssociations::Table)
                    .if_not_exists()
                    .col(id_col(
                        backend,
                        VellumItemKeySystemAssociations::AssociationId,
                        false,
                    ))
                    .col(id_col(
                        backend,
                        VellumItemKeySystemAssociations::ItemId,
                        false,
                    ))
                    .col(id_col(
                        backend,
                        VellumItemKeySystemAssociations::KeySystemId,
                        false,
                    ))
                    .col(
                        ColumnDef::new(VellumItemKeySystemAssociations::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VellumItemKeySystemAssociations::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_vellum_item_key_system_associations")
                            .col(VellumItemKeySystemAssociations::AssociationId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vellum_key_system_assoc_item_id")
                    .if_not_exists()
                    .table(VellumItemKeySystemAssociations::Table)
                    .col(VellumItemKeySystemAssociations::ItemId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VellumRevisions::Table)
                    .if_not_exists()
                    .col(id_col(backend, VellumRevisions::RevisionId, false))
                    .col(id_col(backend, VellumRevisions::UserId, false))
                    .col(id_col(backend, VellumRevisions::ItemId, true))
                    .col(ColumnDef::new(VellumRevisions::Content).text())
                    .col(ColumnDef::new(VellumRevisions::ContentType).string())
                    .col(ColumnDef::new(VellumRevisions::ItemsKeyId).string())
                    .col(ColumnDef::new(VellumRevisions::EncItemKey).text())
                    .col(ColumnDef::new(VellumRevisions::AuthHash).text())
                    .col(ColumnDef::new(VellumRevisions::CreationReason).string())
                    .col(
                        ColumnDef::new(VellumRevisions::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VellumRevisions::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_vellum_revisions")
                            .col(VellumRevisions::RevisionId)
                            .col(VellumRevisions::UserId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vellum_revisions_user_created")
                    .if_not_exists()
                    .table(VellumRevisions::Table)
                    .col(VellumRevisions::UserId)
                    .col(VellumRevisions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VellumTransitionStatuses::Table)
                    .if_not_exists()
                    .col(id_col(backend, VellumTransitionStatuses::UserId, false))
                    .col(
                        ColumnDef::new(VellumTransitionStatuses::TransitionType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VellumTransitionStatuses::Status).string())
                    .col(
                        ColumnDef::new(VellumTransitionStatuses::PagingProgress)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VellumTransitionStatuses::IntegrityProgress)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VellumTransitionStatuses::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_vellum_transition_statuses")
                            .col(VellumTransitionStatuses::UserId)
                            .col(VellumTransitionStatuses::TransitionType),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(VellumEventOutbox::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VellumEventOutbox::Sequence)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VellumEventOutbox::Kind).string().not_null())
                    .col(
                        ColumnDef::new(VellumEventOutbox::PayloadJson)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VellumEventOutbox::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_vellum_event_outbox")
                            .col(VellumEventOutbox::Sequence),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(VellumEventOutbox::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(VellumTransitionStatuses::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(VellumRevisions::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(VellumItemKeySystemAssociations::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(VellumItemSharedVaultAssociations::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(VellumItems::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(VellumUsers::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

fn id_col(backend: DatabaseBackend, col: impl Iden + 'static, nullable: bool) -> ColumnDef {
    let mut col_def = ColumnDef::new(col);
    match backend {
        DatabaseBackend::Postgres => {
            col_def.uuid();
        }
        DatabaseBackend::MySql => {
            col_def.binary_len(16);
        }
        DatabaseBackend::Sqlite => {
            col_def.string_len(36);
        }
        _ => {
            col_def.string_len(36);
        }
    }
    if nullable {
        col_def.null();
    } else {
        col_def.not_null();
    }
    col_def
}
