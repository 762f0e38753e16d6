use async_trait::async_trait;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::{
        deadpool::{Object, Pool},
        AsyncDieselConnectionManager,
    },
    scoped_futures::ScopedFutureExt,
    AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::{CatalogStore, Draft, Entity, EntityKind};
use crate::error::ContentError;
use crate::models::*;
use crate::schema::*;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Postgres-backed [`CatalogStore`]. Unique indexes and `ON DELETE CASCADE`
/// foreign keys in the schema are the authoritative constraint guards.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: Pool<AsyncPgConnection>,
}

impl DatabaseManager {
    pub async fn new(database_url: &str) -> Result<Self, ContentError> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(config)
            .build()
            .map_err(|e| ContentError::ConfigError {
                message: format!("Failed to create database pool: {}", e),
            })?;

        Self::run_migrations(database_url).await?;

        Ok(Self { pool })
    }

    /// Applies pending migrations over a blocking `PgConnection`;
    /// diesel_migrations has no async harness.
    pub async fn run_migrations(database_url: &str) -> Result<(), ContentError> {
        let database_url = database_url.to_string();

        let applied = tokio::task::spawn_blocking(move || {
            let mut connection = diesel::PgConnection::establish(&database_url).map_err(|e| {
                ContentError::ConfigError {
                    message: format!("Failed to establish connection for migrations: {}", e),
                }
            })?;

            connection
                .run_pending_migrations(MIGRATIONS)
                .map(|versions| versions.len())
                .map_err(|e| ContentError::ConfigError {
                    message: format!("Failed to run migrations: {}", e),
                })
        })
        .await??;

        info!("Database migrations applied ({} pending)", applied);
        Ok(())
    }

    async fn connection(&self) -> Result<Object<AsyncPgConnection>, ContentError> {
        self.pool
            .get()
            .await
            .map_err(|e| ContentError::DatabaseError {
                message: format!("Failed to get database connection: {}", e),
            })
    }
}

fn require_parent(kind: EntityKind, parent_id: Option<Uuid>) -> Result<Uuid, ContentError> {
    parent_id.ok_or_else(|| {
        ContentError::internal(format!("{} lookups require a parent id", kind.label()))
    })
}

#[async_trait]
impl CatalogStore for DatabaseManager {
    async fn exists(&self, kind: EntityKind, id: Uuid) -> Result<bool, ContentError> {
        let mut conn = self.connection().await?;

        let found = match kind {
            EntityKind::Workspace => {
                diesel::select(exists(workspaces::table.find(id)))
                    .get_result::<bool>(&mut conn)
                    .await?
            }
            EntityKind::KnowledgeBase => {
                diesel::select(exists(knowledge_bases::table.find(id)))
                    .get_result::<bool>(&mut conn)
                    .await?
            }
            EntityKind::Collection => {
                diesel::select(exists(collections::table.find(id)))
                    .get_result::<bool>(&mut conn)
                    .await?
            }
            EntityKind::Document => {
                diesel::select(exists(documents::table.find(id)))
                    .get_result::<bool>(&mut conn)
                    .await?
            }
            EntityKind::Dataset => {
                diesel::select(exists(datasets::table.find(id)))
                    .get_result::<bool>(&mut conn)
                    .await?
            }
        };

        Ok(found)
    }

    async fn name_taken(
        &self,
        kind: EntityKind,
        parent_id: Option<Uuid>,
        name: &str,
    ) -> Result<bool, ContentError> {
        let mut conn = self.connection().await?;

        let taken = match kind {
            EntityKind::Workspace => {
                diesel::select(exists(workspaces::table.filter(workspaces::name.eq(name))))
                    .get_result::<bool>(&mut conn)
                    .await?
            }
            EntityKind::KnowledgeBase => {
                let workspace_id = require_parent(kind, parent_id)?;
                diesel::select(exists(
                    knowledge_bases::table
                        .filter(knowledge_bases::workspace_id.eq(workspace_id))
                        .filter(knowledge_bases::name.eq(name)),
                ))
                .get_result::<bool>(&mut conn)
                .await?
            }
            EntityKind::Collection => {
                let knowledge_base_id = require_parent(kind, parent_id)?;
                diesel::select(exists(
                    collections::table
                        .filter(collections::knowledge_base_id.eq(knowledge_base_id))
                        .filter(collections::name.eq(name)),
                ))
                .get_result::<bool>(&mut conn)
                .await?
            }
            EntityKind::Document | EntityKind::Dataset => false,
        };

        Ok(taken)
    }

    async fn insert(&self, draft: Draft) -> Result<Entity, ContentError> {
        let mut conn = self.connection().await?;
        let kind = draft.kind();

        let entity = conn
            .transaction::<_, ContentError, _>(move |conn| {
                async move {
                    let entity = match &draft {
                        Draft::Workspace(new) => {
                            let row = diesel::insert_into(workspaces::table)
                                .values(NewWorkspaceRow::from(new))
                                .returning(WorkspaceRow::as_returning())
                                .get_result::<WorkspaceRow>(conn)
                                .await?;
                            Entity::Workspace(row.into())
                        }
                        Draft::KnowledgeBase(new) => {
                            let row = diesel::insert_into(knowledge_bases::table)
                                .values(NewKnowledgeBaseRow::from(new))
                                .returning(KnowledgeBaseRow::as_returning())
                                .get_result::<KnowledgeBaseRow>(conn)
                                .await?;
                            Entity::KnowledgeBase(row.into())
                        }
                        Draft::Collection(new) => {
                            let row = diesel::insert_into(collections::table)
                                .values(NewCollectionRow::from(new))
                                .returning(CollectionRow::as_returning())
                                .get_result::<CollectionRow>(conn)
                                .await?;
                            Entity::Collection(row.into())
                        }
                        Draft::Document(new) => {
                            let row = diesel::insert_into(documents::table)
                                .values(NewDocumentRow::from(new))
                                .returning(DocumentRow::as_returning())
                                .get_result::<DocumentRow>(conn)
                                .await?;
                            Entity::Document(row.into())
                        }
                        Draft::Dataset(new) => {
                            let row = diesel::insert_into(datasets::table)
                                .values(NewDatasetRow::from(new))
                                .returning(DatasetRow::as_returning())
                                .get_result::<DatasetRow>(conn)
                                .await?;
                            Entity::Dataset(row.into())
                        }
                    };

                    Ok(entity)
                }
                .scope_boxed()
            })
            .await?;

        debug!("Inserted {} {} into {}", kind, entity.id(), kind.table_name());
        Ok(entity)
    }

    async fn get(&self, kind: EntityKind, id: Uuid) -> Result<Option<Entity>, ContentError> {
        let mut conn = self.connection().await?;

        let entity = match kind {
            EntityKind::Workspace => workspaces::table
                .find(id)
                .select(WorkspaceRow::as_select())
                .first::<WorkspaceRow>(&mut conn)
                .await
                .optional()?
                .map(|row| Entity::Workspace(row.into())),
            EntityKind::KnowledgeBase => knowledge_bases::table
                .find(id)
                .select(KnowledgeBaseRow::as_select())
                .first::<KnowledgeBaseRow>(&mut conn)
                .await
                .optional()?
                .map(|row| Entity::KnowledgeBase(row.into())),
            EntityKind::Collection => collections::table
                .find(id)
                .select(CollectionRow::as_select())
                .first::<CollectionRow>(&mut conn)
                .await
                .optional()?
                .map(|row| Entity::Collection(row.into())),
            EntityKind::Document => documents::table
                .find(id)
                .select(DocumentRow::as_select())
                .first::<DocumentRow>(&mut conn)
                .await
                .optional()?
                .map(|row| Entity::Document(row.into())),
            EntityKind::Dataset => datasets::table
                .find(id)
                .select(DatasetRow::as_select())
                .first::<DatasetRow>(&mut conn)
                .await
                .optional()?
                .map(|row| Entity::Dataset(row.into())),
        };

        Ok(entity)
    }

    async fn list(
        &self,
        kind: EntityKind,
        parent_id: Option<Uuid>,
    ) -> Result<Vec<Entity>, ContentError> {
        let mut conn = self.connection().await?;

        let entities = match kind {
            EntityKind::Workspace => workspaces::table
                .order(workspaces::created_at.desc())
                .select(WorkspaceRow::as_select())
                .load::<WorkspaceRow>(&mut conn)
                .await?
                .into_iter()
                .map(|row| Entity::Workspace(row.into()))
                .collect(),
            EntityKind::KnowledgeBase => knowledge_bases::table
                .filter(knowledge_bases::workspace_id.eq(require_parent(kind, parent_id)?))
                .order(knowledge_bases::created_at.desc())
                .select(KnowledgeBaseRow::as_select())
                .load::<KnowledgeBaseRow>(&mut conn)
                .await?
                .into_iter()
                .map(|row| Entity::KnowledgeBase(row.into()))
                .collect(),
            EntityKind::Collection => collections::table
                .filter(collections::knowledge_base_id.eq(require_parent(kind, parent_id)?))
                .order(collections::created_at.desc())
                .select(CollectionRow::as_select())
                .load::<CollectionRow>(&mut conn)
                .await?
                .into_iter()
                .map(|row| Entity::Collection(row.into()))
                .collect(),
            EntityKind::Document => documents::table
                .filter(documents::collection_id.eq(require_parent(kind, parent_id)?))
                .order(documents::created_at.desc())
                .select(DocumentRow::as_select())
                .load::<DocumentRow>(&mut conn)
                .await?
                .into_iter()
                .map(|row| Entity::Document(row.into()))
                .collect(),
            EntityKind::Dataset => datasets::table
                .filter(datasets::workspace_id.eq(require_parent(kind, parent_id)?))
                .order(datasets::created_at.desc())
                .select(DatasetRow::as_select())
                .load::<DatasetRow>(&mut conn)
                .await?
                .into_iter()
                .map(|row| Entity::Dataset(row.into()))
                .collect(),
        };

        Ok(entities)
    }

    async fn delete(
        &self,
        kind: EntityKind,
        id: Uuid,
    ) -> Result<Option<Vec<String>>, ContentError> {
        let mut conn = self.connection().await?;

        let released = conn
            .transaction::<_, ContentError, _>(move |conn| {
                async move {
                    // Container rows of the subtree are locked top-down before any
                    // payload path is read. A child insert must take a key-share lock
                    // on its parent, so nothing new can join the subtree between the
                    // path collection and the cascade.
                    let paths = match kind {
                        EntityKind::Workspace => {
                            let locked = workspaces::table
                                .find(id)
                                .select(workspaces::id)
                                .for_update()
                                .first::<Uuid>(conn)
                                .await
                                .optional()?;
                            if locked.is_none() {
                                return Ok(None);
                            }

                            let kb_ids: Vec<Uuid> = knowledge_bases::table
                                .filter(knowledge_bases::workspace_id.eq(id))
                                .select(knowledge_bases::id)
                                .for_update()
                                .load(conn)
                                .await?;
                            let collection_ids: Vec<Uuid> = collections::table
                                .filter(collections::knowledge_base_id.eq_any(kb_ids))
                                .select(collections::id)
                                .for_update()
                                .load(conn)
                                .await?;

                            let mut paths: Vec<String> = documents::table
                                .filter(documents::collection_id.eq_any(collection_ids))
                                .select(documents::storage_path)
                                .load(conn)
                                .await?;
                            paths.extend(
                                datasets::table
                                    .filter(datasets::workspace_id.eq(id))
                                    .select(datasets::storage_path)
                                    .load::<String>(conn)
                                    .await?,
                            );

                            diesel::delete(workspaces::table.find(id))
                                .execute(conn)
                                .await?;
                            paths
                        }
                        EntityKind::KnowledgeBase => {
                            let locked = knowledge_bases::table
                                .find(id)
                                .select(knowledge_bases::id)
                                .for_update()
                                .first::<Uuid>(conn)
                                .await
                                .optional()?;
                            if locked.is_none() {
                                return Ok(None);
                            }

                            let collection_ids: Vec<Uuid> = collections::table
                                .filter(collections::knowledge_base_id.eq(id))
                                .select(collections::id)
                                .for_update()
                                .load(conn)
                                .await?;

                            let paths: Vec<String> = documents::table
                                .filter(documents::collection_id.eq_any(collection_ids))
                                .select(documents::storage_path)
                                .load(conn)
                                .await?;

                            diesel::delete(knowledge_bases::table.find(id))
                                .execute(conn)
                                .await?;
                            paths
                        }
                        EntityKind::Collection => {
                            let locked = collections::table
                                .find(id)
                                .select(collections::id)
                                .for_update()
                                .first::<Uuid>(conn)
                                .await
                                .optional()?;
                            if locked.is_none() {
                                return Ok(None);
                            }

                            let paths: Vec<String> = documents::table
                                .filter(documents::collection_id.eq(id))
                                .select(documents::storage_path)
                                .load(conn)
                                .await?;

                            diesel::delete(collections::table.find(id))
                                .execute(conn)
                                .await?;
                            paths
                        }
                        EntityKind::Document => {
                            let paths: Vec<String> = diesel::delete(documents::table.find(id))
                                .returning(documents::storage_path)
                                .get_results(conn)
                                .await?;
                            if paths.is_empty() {
                                return Ok(None);
                            }
                            paths
                        }
                        EntityKind::Dataset => {
                            let paths: Vec<String> = diesel::delete(datasets::table.find(id))
                                .returning(datasets::storage_path)
                                .get_results(conn)
                                .await?;
                            if paths.is_empty() {
                                return Ok(None);
                            }
                            paths
                        }
                    };

                    Ok(Some(paths))
                }
                .scope_boxed()
            })
            .await?;

        if let Some(paths) = &released {
            info!(
                "Deleted {} {} and released {} stored files",
                kind,
                id,
                paths.len()
            );
        }

        Ok(released)
    }

    async fn ping(&self) -> Result<(), ContentError> {
        let mut conn = self.connection().await?;
        diesel::sql_query("SELECT 1").execute(&mut conn).await?;
        Ok(())
    }
}
