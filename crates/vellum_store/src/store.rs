use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use sea_orm::sea_query;
use sea_orm::sea_query::{
    Alias, Expr, Func, MysqlQueryBuilder, OnConflict, Order, PostgresQueryBuilder, Query,
    QueryStatementWriter, SqliteQueryBuilder, Value as SeaValue,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr,
    QueryResult, Statement, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use tokio::sync::mpsc;
use tokio::time::sleep;
use uuid::Uuid;

use crate::db::*;
use crate::migration::Migrator;
use crate::{DatabaseConfig, PoolConfig};
use vellum_core::{
    AssociationId, ContentType, Dates, DomainEvent, EventPublisher, FindRevisionsInput,
    FindUsersInput, Id, Item, ItemId, ItemRepository, KeySystemAssociation, KeySystemId, Micros,
    Revision, RevisionId, RevisionRepository, SessionId, SharedVaultAssociation, SharedVaultId,
    Timestamps, TransitionStatus, TransitionStatusRepository, TransitionType, User, UserId,
    UserRepository, VellumError, VellumResult,
};

const SUBSCRIPTION_POLL_INTERVAL_MS: u64 = 250;
const SUBSCRIPTION_POLL_LIMIT: u32 = 256;

/// One database-backed store. The transition engine holds two instances,
/// one per physical database; every repository trait is implemented here.
#[derive(Clone)]
pub struct VellumStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
    failpoints: HashSet<String>,
}

/// An event row read back from the outbox.
#[derive(Clone, Debug)]
pub struct StoredEvent {
    pub sequence: i64,
    pub kind: String,
    pub event: DomainEvent,
    pub created_at: Micros,
}

impl VellumStore {
    pub async fn connect(
        database: &DatabaseConfig,
        pool: Option<&PoolConfig>,
        base_dir: &Path,
    ) -> VellumResult<Self> {
        let url = build_connection_url(database, base_dir)?;
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await.map_err(db_err)?;
        let backend = conn.get_database_backend();
        Migrator::up(&conn, None).await.map_err(db_err)?;
        debug!("store: connected to {} backend", database.backend_name());
        Ok(Self {
            conn,
            backend,
            failpoints: HashSet::new(),
        })
    }

    /// Arm named fault-injection points. Test-support only; an armed key
    /// makes the matching operation fail with a storage error.
    pub fn with_failpoints(mut self, keys: impl IntoIterator<Item = String>) -> Self {
        self.failpoints = keys.into_iter().collect();
        self
    }

    fn maybe_failpoint(&self, key: &str) -> VellumResult<()> {
        if self.failpoints.contains(key) {
            return Err(VellumError::storage(format!("failpoint {key}")));
        }
        Ok(())
    }

    /// Seed or refresh an account row. Accounts are owned by another
    /// service; this exists for operational tooling and tests.
    pub async fn insert_user(&self, user: &User) -> VellumResult<()> {
        let roles_json = serde_json::to_string(&user.roles)
            .map_err(|err| VellumError::storage(err.to_string()))?;
        let insert = Query::insert()
            .into_table(VellumUsers::Table)
            .columns([
                VellumUsers::UserId,
                VellumUsers::RolesJson,
                VellumUsers::CreatedAt,
                VellumUsers::UpdatedAt,
            ])
            .values_panic([
                id_value(self.backend, user.user_id.0).into(),
                roles_json.into(),
                user.created_at.as_i64().into(),
                user.updated_at.as_i64().into(),
            ])
            .on_conflict(
                OnConflict::column(VellumUsers::UserId)
                    .update_columns([
                        VellumUsers::RolesJson,
                        VellumUsers::CreatedAt,
                        VellumUsers::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .to_owned();
        exec(&self.conn, &insert).await
    }

    /// Read one item back together with its association rows.
    pub async fn load_item(&self, item_id: ItemId) -> VellumResult<Option<Item>> {
        let select = Query::select()
            .from(VellumItems::Table)
            .columns([
                VellumItems::ItemId,
                VellumItems::UserId,
                VellumItems::SessionId,
                VellumItems::Content,
                VellumItems::ContentType,
                VellumItems::EncItemKey,
                VellumItems::AuthHash,
                VellumItems::ItemsKeyId,
                VellumItems::DuplicateOf,
                VellumItems::Deleted,
                VellumItems::CreatedAt,
                VellumItems::UpdatedAt,
            ])
            .and_where(Expr::col(VellumItems::ItemId).eq(id_value(self.backend, item_id.0)))
            .limit(1)
            .to_owned();
        let Some(row) = query_one(&self.conn, &select).await? else {
            return Ok(None);
        };

        let content_type_raw: String = row
            .try_get("", &col_name(VellumItems::ContentType))
            .map_err(db_err)?;
        let content_type = ContentType::parse(&content_type_raw)?;
        let timestamps = Timestamps::new(
            read_micros(&row, VellumItems::CreatedAt)?,
            read_micros(&row, VellumItems::UpdatedAt)?,
        )?;
        let item = Item {
            item_id: ItemId(read_id(&row, VellumItems::ItemId)?),
            user_id: UserId(read_id(&row, VellumItems::UserId)?),
            session_id: read_opt_id(&row, VellumItems::SessionId)?.map(SessionId),
            content: row
                .try_get("", &col_name(VellumItems::Content))
                .map_err(db_err)?,
            content_type,
            enc_item_key: row
                .try_get("", &col_name(VellumItems::EncItemKey))
                .map_err(db_err)?,
            auth_hash: row
                .try_get("", &col_name(VellumItems::AuthHash))
                .map_err(db_err)?,
            items_key_id: row
                .try_get("", &col_name(VellumItems::ItemsKeyId))
                .map_err(db_err)?,
            duplicate_of: read_opt_id(&row, VellumItems::DuplicateOf)?.map(ItemId),
            deleted: row
                .try_get("", &col_name(VellumItems::Deleted))
                .map_err(db_err)?,
            dates: Dates::from_timestamps(timestamps)?,
            timestamps,
            shared_vault_association: self.load_shared_vault_association(item_id).await?,
            key_system_association: self.load_key_system_association(item_id).await?,
        };
        Ok(Some(item))
    }

    async fn load_shared_vault_association(
        &self,
        item_id: ItemId,
    ) -> VellumResult<Option<SharedVaultAssociation>> {
        let select = Query::select()
            .from(VellumItemSharedVaultAssociations::Table)
            .columns([
                VellumItemSharedVaultAssociations::AssociationId,
                VellumItemSharedVaultAssociations::SharedVaultId,
                VellumItemSharedVaultAssociations::LastEditedBy,
                VellumItemSharedVaultAssociations::CreatedAt,
                VellumItemSharedVaultAssociations::UpdatedAt,
            ])
            .and_where(
                Expr::col(VellumItemSharedVaultAssociations::ItemId)
                    .eq(id_value(self.backend, item_id.0)),
            )
            .limit(1)
            .to_owned();
        let Some(row) = query_one(&self.conn, &select).await? else {
            return Ok(None);
        };
        let timestamps = Timestamps::new(
            read_micros(&row, VellumItemSharedVaultAssociations::CreatedAt)?,
            read_micros(&row, VellumItemSharedVaultAssociations::UpdatedAt)?,
        )?;
        Ok(Some(SharedVaultAssociation {
            association_id: AssociationId(read_id(
                &row,
                VellumItemSharedVaultAssociations::AssociationId,
            )?),
            item_id,
            shared_vault_id: SharedVaultId(read_id(
                &row,
                VellumItemSharedVaultAssociations::SharedVaultId,
            )?),
            last_edited_by: UserId(read_id(
                &row,
                VellumItemSharedVaultAssociations::LastEditedBy,
            )?),
            timestamps,
        }))
    }

    async fn load_key_system_association(
        &self,
        item_id: ItemId,
    ) -> VellumResult<Option<KeySystemAssociation>> {
        let select = Query::select()
            .from(VellumItemKeySystemAssociations::Table)
            .columns([
                VellumItemKeySystemAssociations::AssociationId,
                VellumItemKeySystemAssociations::KeySystemId,
                VellumItemKeySystemAssociations::CreatedAt,
                VellumItemKeySystemAssociations::UpdatedAt,
            ])
            .and_where(
                Expr::col(VellumItemKeySystemAssociations::ItemId)
                    .eq(id_value(self.backend, item_id.0)),
            )
            .limit(1)
            .to_owned();
        let Some(row) = query_one(&self.conn, &select).await? else {
            return Ok(None);
        };
        let timestamps = Timestamps::new(
            read_micros(&row, VellumItemKeySystemAssociations::CreatedAt)?,
            read_micros(&row, VellumItemKeySystemAssociations::UpdatedAt)?,
        )?;
        Ok(Some(KeySystemAssociation {
            association_id: AssociationId(read_id(
                &row,
                VellumItemKeySystemAssociations::AssociationId,
            )?),
            item_id,
            key_system_id: KeySystemId(read_id(
                &row,
                VellumItemKeySystemAssociations::KeySystemId,
            )?),
            timestamps,
        }))
    }

    /// Highest sequence currently in the outbox, if any.
    pub async fn latest_event_sequence(&self) -> VellumResult<Option<i64>> {
        let select = Query::select()
            .from(VellumEventOutbox::Table)
            .expr_as(
                Func::max(Expr::col(VellumEventOutbox::Sequence)),
                Alias::new("max_seq"),
            )
            .to_owned();
        let row = query_one(&self.conn, &select).await?;
        match row {
            Some(row) => row.try_get("", "max_seq").map_err(db_err),
            None => Ok(None),
        }
    }

    /// Read outbox rows with a sequence greater than `from_sequence`.
    pub async fn get_events_since(
        &self,
        from_sequence: Option<i64>,
        limit: u32,
    ) -> VellumResult<Vec<StoredEvent>> {
        let mut select = Query::select()
            .from(VellumEventOutbox::Table)
            .columns([
                VellumEventOutbox::Sequence,
                VellumEventOutbox::Kind,
                VellumEventOutbox::PayloadJson,
                VellumEventOutbox::CreatedAt,
            ])
            .order_by(VellumEventOutbox::Sequence, Order::Asc)
            .limit(limit as u64)
            .to_owned();
        if let Some(from_sequence) = from_sequence {
            select.and_where(Expr::col(VellumEventOutbox::Sequence).gt(from_sequence));
        }
        let rows = query_all(&self.conn, &select).await?;
        let mut events = Vec::new();
        for row in rows {
            let sequence: i64 = row
                .try_get("", &col_name(VellumEventOutbox::Sequence))
                .map_err(db_err)?;
            let kind: String = row
                .try_get("", &col_name(VellumEventOutbox::Kind))
                .map_err(db_err)?;
            let payload_json: String = row
                .try_get("", &col_name(VellumEventOutbox::PayloadJson))
                .map_err(db_err)?;
            let event: DomainEvent = serde_json::from_str(&payload_json)
                .map_err(|err| VellumError::storage(err.to_string()))?;
            events.push(StoredEvent {
                sequence,
                kind,
                event,
                created_at: read_micros(&row, VellumEventOutbox::CreatedAt)?,
            });
        }
        Ok(events)
    }

    /// Polling subscription over the outbox, in sequence order. The loop
    /// ends when the receiver is dropped.
    pub async fn subscribe_events(
        &self,
        from_sequence: Option<i64>,
    ) -> VellumResult<mpsc::Receiver<StoredEvent>> {
        let (tx, rx) = mpsc::channel(256);
        let mut cursor = from_sequence;
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                if tx.is_closed() {
                    break;
                }
                let events = store
                    .get_events_since(cursor, SUBSCRIPTION_POLL_LIMIT)
                    .await
                    .unwrap_or_default();
                if !events.is_empty() {
                    cursor = events.last().map(|event| event.sequence);
                    for event in events {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                } else {
                    sleep(Duration::from_millis(SUBSCRIPTION_POLL_INTERVAL_MS)).await;
                }
            }
        });
        Ok(rx)
    }
}

#[async_trait]
impl RevisionRepository for VellumStore {
    async fn count_by_user_id(&self, user_id: UserId) -> VellumResult<u64> {
        let select = Query::select()
            .from(VellumRevisions::Table)
            .expr_as(
                Func::count(Expr::col(VellumRevisions::RevisionId)),
                Alias::new("revision_count"),
            )
            .and_where(Expr::col(VellumRevisions::UserId).eq(id_value(self.backend, user_id.0)))
            .to_owned();
        let row = query_one(&self.conn, &select).await?;
        let count: i64 = match row {
            Some(row) => row.try_get("", "revision_count").map_err(db_err)?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }

    async fn find_by_user_id(&self, input: FindRevisionsInput) -> VellumResult<Vec<Revision>> {
        let select = Query::select()
            .from(VellumRevisions::Table)
            .columns(REVISION_COLUMNS)
            .and_where(
                Expr::col(VellumRevisions::UserId).eq(id_value(self.backend, input.user_id.0)),
            )
            .order_by(VellumRevisions::CreatedAt, Order::Asc)
            .order_by(VellumRevisions::RevisionId, Order::Asc)
            .offset(input.offset)
            .limit(input.limit)
            .to_owned();
        let rows = query_all(&self.conn, &select).await?;
        rows.iter().map(read_revision).collect()
    }

    async fn find_one_by_uuid(
        &self,
        revision_id: RevisionId,
        user_id: UserId,
    ) -> VellumResult<Option<Revision>> {
        let select = Query::select()
            .from(VellumRevisions::Table)
            .columns(REVISION_COLUMNS)
            .and_where(
                Expr::col(VellumRevisions::RevisionId).eq(id_value(self.backend, revision_id.0)),
            )
            .and_where(Expr::col(VellumRevisions::UserId).eq(id_value(self.backend, user_id.0)))
            .limit(1)
            .to_owned();
        let row = query_one(&self.conn, &select).await?;
        row.as_ref().map(read_revision).transpose()
    }

    async fn insert(&self, revision: &Revision) -> VellumResult<bool> {
        self.maybe_failpoint("before_revision_insert")?;
        let insert = Query::insert()
            .into_table(VellumRevisions::Table)
            .columns(REVISION_COLUMNS)
            .values_panic([
                id_value(self.backend, revision.revision_id.0).into(),
                id_value(self.backend, revision.user_id.0).into(),
                opt_id_value(self.backend, revision.item_id.map(|id| id.0)).into(),
                revision.content.clone().into(),
                revision.content_type.clone().into(),
                revision.items_key_id.clone().into(),
                revision.enc_item_key.clone().into(),
                revision.auth_hash.clone().into(),
                revision.creation_reason.clone().into(),
                revision.created_at.as_i64().into(),
                revision.updated_at.as_i64().into(),
            ])
            .on_conflict(
                OnConflict::columns([VellumRevisions::RevisionId, VellumRevisions::UserId])
                    .do_nothing()
                    .to_owned(),
            )
            .to_owned();
        let written = exec_count(&self.conn, &insert).await?;
        Ok(written > 0)
    }

    async fn remove_one_by_uuid(
        &self,
        revision_id: RevisionId,
        user_id: UserId,
    ) -> VellumResult<()> {
        let delete = Query::delete()
            .from_table(VellumRevisions::Table)
            .and_where(
                Expr::col(VellumRevisions::RevisionId).eq(id_value(self.backend, revision_id.0)),
            )
            .and_where(Expr::col(VellumRevisions::UserId).eq(id_value(self.backend, user_id.0)))
            .to_owned();
        exec(&self.conn, &delete).await
    }

    async fn remove_by_user_id(&self, user_id: UserId) -> VellumResult<()> {
        self.maybe_failpoint("before_revision_remove_by_user")?;
        let delete = Query::delete()
            .from_table(VellumRevisions::Table)
            .and_where(Expr::col(VellumRevisions::UserId).eq(id_value(self.backend, user_id.0)))
            .to_owned();
        exec(&self.conn, &delete).await
    }
}

#[async_trait]
impl UserRepository for VellumStore {
    async fn count_all_created_between(&self, start: Micros, end: Micros) -> VellumResult<u64> {
        let select = Query::select()
            .from(VellumUsers::Table)
            .expr_as(
                Func::count(Expr::col(VellumUsers::UserId)),
                Alias::new("user_count"),
            )
            .and_where(Expr::col(VellumUsers::CreatedAt).between(start.as_i64(), end.as_i64()))
            .to_owned();
        let row = query_one(&self.conn, &select).await?;
        let count: i64 = match row {
            Some(row) => row.try_get("", "user_count").map_err(db_err)?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }

    async fn find_all_created_between(&self, input: FindUsersInput) -> VellumResult<Vec<User>> {
        let select = Query::select()
            .from(VellumUsers::Table)
            .columns([
                VellumUsers::UserId,
                VellumUsers::RolesJson,
                VellumUsers::CreatedAt,
                VellumUsers::UpdatedAt,
            ])
            .and_where(
                Expr::col(VellumUsers::CreatedAt)
                    .between(input.start.as_i64(), input.end.as_i64()),
            )
            .order_by(VellumUsers::CreatedAt, Order::Asc)
            .order_by(VellumUsers::UserId, Order::Asc)
            .offset(input.offset)
            .limit(input.limit)
            .to_owned();
        let rows = query_all(&self.conn, &select).await?;
        let mut users = Vec::new();
        for row in rows {
            let roles_json: String = row
                .try_get("", &col_name(VellumUsers::RolesJson))
                .map_err(db_err)?;
            let roles: Vec<String> = serde_json::from_str(&roles_json)
                .map_err(|err| VellumError::storage(err.to_string()))?;
            users.push(User {
                user_id: UserId(read_id(&row, VellumUsers::UserId)?),
                roles,
                created_at: read_micros(&row, VellumUsers::CreatedAt)?,
                updated_at: read_micros(&row, VellumUsers::UpdatedAt)?,
            });
        }
        Ok(users)
    }
}

#[async_trait]
impl ItemRepository for VellumStore {
    async fn save(&self, item: &Item) -> VellumResult<()> {
        let tx = self.conn.begin().await.map_err(db_err)?;

        let insert = Query::insert()
            .into_table(VellumItems::Table)
            .columns([
                VellumItems::ItemId,
                VellumItems::UserId,
                VellumItems::SessionId,
                VellumItems::Content,
                VellumItems::ContentType,
                VellumItems::EncItemKey,
                VellumItems::AuthHash,
                VellumItems::ItemsKeyId,
                VellumItems::DuplicateOf,
                VellumItems::Deleted,
                VellumItems::CreatedAtDate,
                VellumItems::UpdatedAtDate,
                VellumItems::CreatedAt,
                VellumItems::UpdatedAt,
            ])
            .values_panic([
                id_value(self.backend, item.item_id.0).into(),
                id_value(self.backend, item.user_id.0).into(),
                opt_id_value(self.backend, item.session_id.map(|id| id.0)).into(),
                item.content.clone().into(),
                item.content_type.as_str().into(),
                item.enc_item_key.clone().into(),
                item.auth_hash.clone().into(),
                item.items_key_id.clone().into(),
                opt_id_value(self.backend, item.duplicate_of.map(|id| id.0)).into(),
                item.deleted.into(),
                item.dates.created_at.to_rfc3339().into(),
                item.dates.updated_at.to_rfc3339().into(),
                item.timestamps.created_at().as_i64().into(),
                item.timestamps.updated_at().as_i64().into(),
            ])
            .on_conflict(
                OnConflict::column(VellumItems::ItemId)
                    .update_columns([
                        VellumItems::UserId,
                        VellumItems::SessionId,
                        VellumItems::Content,
                        VellumItems::ContentType,
                        VellumItems::EncItemKey,
                        VellumItems::AuthHash,
                        VellumItems::ItemsKeyId,
                        VellumItems::DuplicateOf,
                        VellumItems::Deleted,
                        VellumItems::CreatedAtDate,
                        VellumItems::UpdatedAtDate,
                        VellumItems::CreatedAt,
                        VellumItems::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .to_owned();
        exec(&tx, &insert).await?;

        self.save_shared_vault_association(&tx, item).await?;
        self.save_key_system_association(&tx, item).await?;

        tx.commit().await.map_err(db_err)
    }
}

impl VellumStore {
    async fn save_shared_vault_association(
        &self,
        tx: &sea_orm::DatabaseTransaction,
        item: &Item,
    ) -> VellumResult<()> {
        match &item.shared_vault_association {
            Some(association) => {
                let delete = Query::delete()
                    .from_table(VellumItemSharedVaultAssociations::Table)
                    .and_where(
                        Expr::col(VellumItemSharedVaultAssociations::ItemId)
                            .eq(id_value(self.backend, item.item_id.0)),
                    )
                    .and_where(
                        Expr::col(VellumItemSharedVaultAssociations::AssociationId)
                            .ne(id_value(self.backend, association.association_id.0)),
                    )
                    .to_owned();
                exec(tx, &delete).await?;

                let insert = Query::insert()
                    .into_table(VellumItemSharedVaultAssociations::Table)
                    .columns([
                        VellumItemSharedVaultAssociations::AssociationId,
                        VellumItemSharedVaultAssociations::ItemId,
                        VellumItemSharedVaultAssociations::SharedVaultId,
                        VellumItemSharedVaultAssociations::LastEditedBy,
                        VellumItemSharedVaultAssociations::CreatedAt,
                        VellumItemSharedVaultAssociations::UpdatedAt,
                    ])
                    .values_panic([
                        id_value(self.backend, association.association_id.0).into(),
                        id_value(self.backend, association.item_id.0).into(),
                        id_value(self.backend, association.shared_vault_id.0).into(),
                        id_value(self.backend, association.last_edited_by.0).into(),
                        association.timestamps.created_at().as_i64().into(),
                        association.timestamps.updated_at().as_i64().into(),
                    ])
                    .on_conflict(
                        OnConflict::column(VellumItemSharedVaultAssociations::AssociationId)
                            .update_columns([
                                VellumItemSharedVaultAssociations::SharedVaultId,
                                VellumItemSharedVaultAssociations::LastEditedBy,
                                VellumItemSharedVaultAssociations::CreatedAt,
                                VellumItemSharedVaultAssociations::UpdatedAt,
                            ])
                            .to_owned(),
                    )
                    .to_owned();
                exec(tx, &insert).await
            }
            None => {
                let delete = Query::delete()
                    .from_table(VellumItemSharedVaultAssociations::Table)
                    .and_where(
                        Expr::col(VellumItemSharedVaultAssociations::ItemId)
                            .eq(id_value(self.backend, item.item_id.0)),
                    )
                    .to_owned();
                exec(tx, &delete).await
            }
        }
    }

    async fn save_key_system_association(
        &self,
        tx: &sea_orm::DatabaseTransaction,
        item: &Item,
    ) -> VellumResult<()> {
        match &item.key_system_association {
            Some(association) => {
                let delete = Query::delete()
                    .from_table(VellumItemKeySystemAssociations::Table)
                    .and_where(
                        Expr::col(VellumItemKeySystemAssociations::ItemId)
                            .eq(id_value(self.backend, item.item_id.0)),
                    )
                    .and_where(
                        Expr::col(VellumItemKeySystemAssociations::AssociationId)
                            .ne(id_value(self.backend, association.association_id.0)),
                    )
                    .to_owned();
                exec(tx, &delete).await?;

                let insert = Query::insert()
                    .into_table(VellumItemKeySystemAssociations::Table)
                    .columns([
                        VellumItemKeySystemAssociations::AssociationId,
                        VellumItemKeySystemAssociations::ItemId,
                        VellumItemKeySystemAssociations::KeySystemId,
                        VellumItemKeySystemAssociations::CreatedAt,
                        VellumItemKeySystemAssociations::UpdatedAt,
                    ])
                    .values_panic([
                        id_value(self.backend, association.association_id.0).into(),
                        id_value(self.backend, association.item_id.0).into(),
                        id_value(self.backend, association.key_system_id.0).into(),
                        association.timestamps.created_at().as_i64().into(),
                        association.timestamps.updated_at().as_i64().into(),
                    ])
                    .on_conflict(
                        OnConflict::column(VellumItemKeySystemAssociations::AssociationId)
                            .update_columns([
                                VellumItemKeySystemAssociations::KeySystemId,
                                VellumItemKeySystemAssociations::CreatedAt,
                                VellumItemKeySystemAssociations::UpdatedAt,
                            ])
                            .to_owned(),
                    )
                    .to_owned();
                exec(tx, &insert).await
            }
            None => {
                let delete = Query::delete()
                    .from_table(VellumItemKeySystemAssociations::Table)
                    .and_where(
                        Expr::col(VellumItemKeySystemAssociations::ItemId)
                            .eq(id_value(self.backend, item.item_id.0)),
                    )
                    .to_owned();
                exec(tx, &delete).await
            }
        }
    }
}

#[async_trait]
impl TransitionStatusRepository for VellumStore {
    async fn get_status(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
    ) -> VellumResult<Option<TransitionStatus>> {
        let row = self.status_row(user_id, transition_type).await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let status: Option<String> = row
            .try_get("", &col_name(VellumTransitionStatuses::Status))
            .map_err(db_err)?;
        status.as_deref().map(TransitionStatus::parse).transpose()
    }

    async fn set_status(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
        status: TransitionStatus,
        timestamp: Micros,
    ) -> VellumResult<()> {
        let insert = Query::insert()
            .into_table(VellumTransitionStatuses::Table)
            .columns(STATUS_COLUMNS)
            .values_panic([
                id_value(self.backend, user_id.0).into(),
                transition_type.as_str().into(),
                status.as_str().into(),
                1i64.into(),
                1i64.into(),
                timestamp.as_i64().into(),
            ])
            .on_conflict(
                OnConflict::columns([
                    VellumTransitionStatuses::UserId,
                    VellumTransitionStatuses::TransitionType,
                ])
                .update_columns([
                    VellumTransitionStatuses::Status,
                    VellumTransitionStatuses::UpdatedAt,
                ])
                .to_owned(),
            )
            .to_owned();
        exec(&self.conn, &insert).await
    }

    async fn get_paging_progress(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
    ) -> VellumResult<u32> {
        self.progress_value(user_id, transition_type, VellumTransitionStatuses::PagingProgress)
            .await
    }

    async fn set_paging_progress(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
        progress: u32,
    ) -> VellumResult<()> {
        self.write_progress(
            user_id,
            transition_type,
            VellumTransitionStatuses::PagingProgress,
            progress,
        )
        .await
    }

    async fn get_integrity_progress(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
    ) -> VellumResult<u32> {
        self.progress_value(
            user_id,
            transition_type,
            VellumTransitionStatuses::IntegrityProgress,
        )
        .await
    }

    async fn set_integrity_progress(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
        progress: u32,
    ) -> VellumResult<()> {
        self.write_progress(
            user_id,
            transition_type,
            VellumTransitionStatuses::IntegrityProgress,
            progress,
        )
        .await
    }

    async fn remove(&self, user_id: UserId, transition_type: TransitionType) -> VellumResult<()> {
        let delete = Query::delete()
            .from_table(VellumTransitionStatuses::Table)
            .and_where(
                Expr::col(VellumTransitionStatuses::UserId)
                    .eq(id_value(self.backend, user_id.0)),
            )
            .and_where(
                Expr::col(VellumTransitionStatuses::TransitionType).eq(transition_type.as_str()),
            )
            .to_owned();
        exec(&self.conn, &delete).await
    }
}

impl VellumStore {
    async fn status_row(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
    ) -> VellumResult<Option<QueryResult>> {
        let select = Query::select()
            .from(VellumTransitionStatuses::Table)
            .columns(STATUS_COLUMNS)
            .and_where(
                Expr::col(VellumTransitionStatuses::UserId)
                    .eq(id_value(self.backend, user_id.0)),
            )
            .and_where(
                Expr::col(VellumTransitionStatuses::TransitionType).eq(transition_type.as_str()),
            )
            .limit(1)
            .to_owned();
        query_one(&self.conn, &select).await
    }

    async fn progress_value(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
        column: VellumTransitionStatuses,
    ) -> VellumResult<u32> {
        let row = self.status_row(user_id, transition_type).await?;
        let Some(row) = row else {
            return Ok(1);
        };
        let progress: i64 = row.try_get("", &col_name(column)).map_err(db_err)?;
        Ok(progress.max(1) as u32)
    }

    async fn write_progress(
        &self,
        user_id: UserId,
        transition_type: TransitionType,
        column: VellumTransitionStatuses,
        progress: u32,
    ) -> VellumResult<()> {
        let paging = if matches!(column, VellumTransitionStatuses::PagingProgress) {
            progress as i64
        } else {
            1i64
        };
        let integrity = if matches!(column, VellumTransitionStatuses::IntegrityProgress) {
            progress as i64
        } else {
            1i64
        };
        let insert = Query::insert()
            .into_table(VellumTransitionStatuses::Table)
            .columns(STATUS_COLUMNS)
            .values_panic([
                id_value(self.backend, user_id.0).into(),
                transition_type.as_str().into(),
                SeaValue::String(None).into(),
                paging.into(),
                integrity.into(),
                Micros::now().as_i64().into(),
            ])
            .on_conflict(
                OnConflict::columns([
                    VellumTransitionStatuses::UserId,
                    VellumTransitionStatuses::TransitionType,
                ])
                .update_columns([column, VellumTransitionStatuses::UpdatedAt])
                .to_owned(),
            )
            .to_owned();
        exec(&self.conn, &insert).await
    }
}

#[async_trait]
impl EventPublisher for VellumStore {
    async fn publish(&self, event: &DomainEvent) -> VellumResult<()> {
        self.maybe_failpoint("before_event_publish")?;
        let payload_json = serde_json::to_string(event)
            .map_err(|err| VellumError::storage(err.to_string()))?;
        let tx = self.conn.begin().await.map_err(db_err)?;

        let select = Query::select()
            .from(VellumEventOutbox::Table)
            .expr_as(
                Func::max(Expr::col(VellumEventOutbox::Sequence)),
                Alias::new("max_seq"),
            )
            .to_owned();
        let row = query_one(&tx, &select).await?;
        let next_seq = match row {
            Some(row) => {
                let max_seq: Option<i64> = row.try_get("", "max_seq").map_err(db_err)?;
                max_seq.unwrap_or(0) + 1
            }
            None => 1,
        };

        let insert = Query::insert()
            .into_table(VellumEventOutbox::Table)
            .columns([
                VellumEventOutbox::Sequence,
                VellumEventOutbox::Kind,
                VellumEventOutbox::PayloadJson,
                VellumEventOutbox::CreatedAt,
            ])
            .values_panic([
                next_seq.into(),
                event.kind().into(),
                payload_json.into(),
                Micros::now().as_i64().into(),
            ])
            .to_owned();
        exec(&tx, &insert).await?;
        tx.commit().await.map_err(db_err)
    }
}

const REVISION_COLUMNS: [VellumRevisions; 11] = [
    VellumRevisions::RevisionId,
    VellumRevisions::UserId,
    VellumRevisions::ItemId,
    VellumRevisions::Content,
    VellumRevisions::ContentType,
    VellumRevisions::ItemsKeyId,
    VellumRevisions::EncItemKey,
    VellumRevisions::AuthHash,
    VellumRevisions::CreationReason,
    VellumRevisions::CreatedAt,
    VellumRevisions::UpdatedAt,
];

const STATUS_COLUMNS: [VellumTransitionStatuses; 6] = [
    VellumTransitionStatuses::UserId,
    VellumTransitionStatuses::TransitionType,
    VellumTransitionStatuses::Status,
    VellumTransitionStatuses::PagingProgress,
    VellumTransitionStatuses::IntegrityProgress,
    VellumTransitionStatuses::UpdatedAt,
];

fn read_revision(row: &QueryResult) -> VellumResult<Revision> {
    Ok(Revision {
        revision_id: RevisionId(read_id(row, VellumRevisions::RevisionId)?),
        user_id: UserId(read_id(row, VellumRevisions::UserId)?),
        item_id: read_opt_id(row, VellumRevisions::ItemId)?.map(ItemId),
        content: row
            .try_get("", &col_name(VellumRevisions::Content))
            .map_err(db_err)?,
        content_type: row
            .try_get("", &col_name(VellumRevisions::ContentType))
            .map_err(db_err)?,
        items_key_id: row
            .try_get("", &col_name(VellumRevisions::ItemsKeyId))
            .map_err(db_err)?,
        enc_item_key: row
            .try_get("", &col_name(VellumRevisions::EncItemKey))
            .map_err(db_err)?,
        auth_hash: row
            .try_get("", &col_name(VellumRevisions::AuthHash))
            .map_err(db_err)?,
        creation_reason: row
            .try_get("", &col_name(VellumRevisions::CreationReason))
            .map_err(db_err)?,
        created_at: read_micros(row, VellumRevisions::CreatedAt)?,
        updated_at: read_micros(row, VellumRevisions::UpdatedAt)?,
    })
}

fn build_connection_url(database: &DatabaseConfig, base_dir: &Path) -> VellumResult<String> {
    match database {
        DatabaseConfig::Sqlite { .. } => {
            let path = database.sqlite_path(base_dir)?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| VellumError::storage(format!("create database dir: {err}")))?;
            }
            Ok(format!("sqlite://{}?mode=rwc", path.display()))
        }
        DatabaseConfig::Postgres { url } | DatabaseConfig::Mysql { url } => Ok(url.clone()),
    }
}

fn db_err(err: DbErr) -> VellumError {
    VellumError::storage(err.to_string())
}

fn id_value(backend: DatabaseBackend, id: Id) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => SeaValue::from(Uuid::from_bytes(id.as_bytes())),
        DatabaseBackend::MySql => SeaValue::from(id.as_vec()),
        DatabaseBackend::Sqlite => SeaValue::from(id.to_uuid_string()),
        _ => SeaValue::from(id.to_uuid_string()),
    }
}

fn none_id_value(backend: DatabaseBackend) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => SeaValue::Uuid(None),
        DatabaseBackend::MySql => SeaValue::Bytes(None),
        DatabaseBackend::Sqlite => SeaValue::String(None),
        _ => SeaValue::String(None),
    }
}

fn opt_id_value(backend: DatabaseBackend, id: Option<Id>) -> SeaValue {
    match id {
        Some(id) => id_value(backend, id),
        None => none_id_value(backend),
    }
}

fn bytes_to_id(bytes: Vec<u8>) -> Option<Id> {
    if bytes.len() == 16 {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&bytes);
        Some(Id::from_bytes(buf))
    } else {
        None
    }
}

fn read_id(row: &QueryResult, column: impl sea_query::Iden) -> VellumResult<Id> {
    let name = col_name(column);
    if let Ok(value) = row.try_get::<String>("", &name) {
        return Id::from_uuid_str(&value);
    }
    if let Ok(value) = row.try_get::<Uuid>("", &name) {
        return Ok(Id::from_bytes(*value.as_bytes()));
    }
    if let Ok(value) = row.try_get::<Vec<u8>>("", &name) {
        return bytes_to_id(value).ok_or_else(|| VellumError::storage("invalid id length"));
    }
    Err(VellumError::storage("unsupported id format"))
}

fn read_opt_id(row: &QueryResult, column: impl sea_query::Iden) -> VellumResult<Option<Id>> {
    let name = col_name(column);
    if let Ok(value) = row.try_get::<Option<String>>("", &name) {
        return value.map(|value| Id::from_uuid_str(&value)).transpose();
    }
    if let Ok(value) = row.try_get::<Option<Uuid>>("", &name) {
        return Ok(value.map(|value| Id::from_bytes(*value.as_bytes())));
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>>("", &name) {
        return Ok(value.and_then(bytes_to_id));
    }
    Ok(None)
}

fn read_micros(row: &QueryResult, column: impl sea_query::Iden) -> VellumResult<Micros> {
    let value: i64 = row.try_get("", &col_name(column)).map_err(db_err)?;
    Ok(Micros::from_i64(value))
}

fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Sqlite => stmt.build(SqliteQueryBuilder),
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        DatabaseBackend::MySql => stmt.build(MysqlQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

async fn exec<C, S>(conn: &C, stmt: &S) -> VellumResult<()>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    exec_count(conn, stmt).await.map(|_| ())
}

async fn exec_count<C, S>(conn: &C, stmt: &S) -> VellumResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let result = conn
        .execute(Statement::from_sql_and_values(backend, sql, values))
        .await
        .map_err(db_err)?;
    Ok(result.rows_affected())
}

async fn query_all<C, S>(conn: &C, stmt: &S) -> VellumResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    conn.query_all(Statement::from_sql_and_values(backend, sql, values))
        .await
        .map_err(db_err)
}

async fn query_one<C, S>(conn: &C, stmt: &S) -> VellumResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    conn.query_one(Statement::from_sql_and_values(backend, sql, values))
        .await
        .map_err(db_err)
}
