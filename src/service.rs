use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{
    check_length, BlobLayout, CatalogStore, Draft, Entity, EntityKind, MAX_FILENAME_LEN,
    MAX_MIME_TYPE_LEN,
};
use crate::error::ContentError;
use crate::storage::{sanitize_filename, ByteStream, StorageBackend};

/// A file handed to a create call, fully buffered.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// What the storage backend recorded for an upload.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBlob {
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub storage_path: String,
}

/// A persisted entity type managed through [`ResourceService`].
///
/// Parent kind, name uniqueness and payload layout are read from
/// [`EntityKind`]; an implementation only supplies the typed conversions.
pub trait Resource: Sized + Send + 'static {
    type Fields: Send + Sync + 'static;

    const KIND: EntityKind;

    fn name(_fields: &Self::Fields) -> Option<&str> {
        None
    }

    /// Runs after the parent was found and before anything is written.
    fn validate(_fields: &Self::Fields, _upload: Option<&Upload>) -> Result<(), ContentError> {
        Ok(())
    }

    fn draft(
        id: Uuid,
        parent_id: Option<Uuid>,
        fields: Self::Fields,
        blob: Option<StoredBlob>,
    ) -> Result<Draft, ContentError>;

    fn from_entity(entity: Entity) -> Result<Self, ContentError>;

    fn storage_path(&self) -> Option<&str> {
        None
    }
}

pub(crate) fn unexpected_entity(expected: EntityKind, entity: &Entity) -> ContentError {
    ContentError::internal(format!(
        "Catalog returned a {} where a {} was expected",
        entity.kind(),
        expected
    ))
}

pub(crate) fn missing_parent(kind: EntityKind) -> ContentError {
    ContentError::internal(format!("{} requires a parent id", kind.label()))
}

pub(crate) fn missing_blob(kind: EntityKind) -> ContentError {
    ContentError::internal(format!("{} requires a stored payload", kind.label()))
}

/// Create/list/get/delete for one entity kind over a shared catalog and
/// blob storage.
pub struct ResourceService<R> {
    store: Arc<dyn CatalogStore>,
    storage: Arc<dyn StorageBackend>,
    _resource: PhantomData<fn() -> R>,
}

impl<R> Clone for ResourceService<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            storage: self.storage.clone(),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> ResourceService<R> {
    pub fn new(store: Arc<dyn CatalogStore>, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            store,
            storage,
            _resource: PhantomData,
        }
    }

    async fn ensure_parent(&self, parent_id: Option<Uuid>) -> Result<Option<Uuid>, ContentError> {
        match R::KIND.parent() {
            Some(parent_kind) => {
                let parent_id = parent_id.ok_or_else(|| missing_parent(R::KIND))?;
                if !self.store.exists(parent_kind, parent_id).await? {
                    return Err(parent_kind.not_found(parent_id));
                }
                Ok(Some(parent_id))
            }
            None => Ok(None),
        }
    }

    /// Fails with the parent's NotFound unless `parent_id` names an existing
    /// parent of this kind. Lets callers check the parent before reading a
    /// request body.
    pub async fn require_parent(&self, parent_id: Uuid) -> Result<(), ContentError> {
        self.ensure_parent(Some(parent_id)).await.map(|_| ())
    }

    /// Creates one entity under `parent_id`.
    ///
    /// The parent check always runs first. The name check here is only a fast
    /// path: two concurrent creates can both pass it, and the store's unique
    /// constraint decides the winner. Either guard reports the same conflict.
    pub async fn create(
        &self,
        parent_id: Option<Uuid>,
        fields: R::Fields,
        upload: Option<Upload>,
    ) -> Result<R, ContentError> {
        let kind = R::KIND;
        let parent_id = self.ensure_parent(parent_id).await?;

        R::validate(&fields, upload.as_ref())?;

        if kind.name_unique() {
            if let Some(name) = R::name(&fields) {
                if self.store.name_taken(kind, parent_id, name).await? {
                    return Err(kind.name_conflict());
                }
            }
        }

        let id = Uuid::new_v4();

        let entity = match kind.blob_layout() {
            Some(layout) => {
                let upload = upload.ok_or_else(|| {
                    ContentError::validation(format!("{} upload requires a file", kind.label()))
                })?;
                let parent_id = parent_id.ok_or_else(|| missing_parent(kind))?;
                let filename = sanitize_filename(upload.filename.as_deref(), layout.default_filename);
                check_length("Filename", &filename, MAX_FILENAME_LEN)?;
                if let Some(content_type) = upload.content_type.as_deref() {
                    check_length("Content type", content_type, MAX_MIME_TYPE_LEN)?;
                }

                // The write and the insert run detached from the request so a
                // dropped connection cannot strand a blob between the two.
                let store = self.store.clone();
                let storage = self.storage.clone();
                tokio::spawn(async move {
                    persist_with_blob::<R>(
                        store.as_ref(),
                        storage.as_ref(),
                        layout,
                        id,
                        parent_id,
                        fields,
                        filename,
                        upload,
                    )
                    .await
                })
                .await??
            }
            None => {
                let draft = R::draft(id, parent_id, fields, None)?;
                insert(self.store.as_ref(), draft).await?
            }
        };

        info!("Created {} {}", kind, id);
        R::from_entity(entity)
    }

    /// Children of `parent_id`, newest first.
    pub async fn list(&self, parent_id: Option<Uuid>) -> Result<Vec<R>, ContentError> {
        let parent_id = self.ensure_parent(parent_id).await?;

        let entities = self.store.list(R::KIND, parent_id).await?;
        debug!("Listed {} {} rows", entities.len(), R::KIND);

        entities.into_iter().map(R::from_entity).collect()
    }

    pub async fn get(&self, id: Uuid) -> Result<R, ContentError> {
        let entity = self
            .store
            .get(R::KIND, id)
            .await?
            .ok_or_else(|| R::KIND.not_found(id))?;
        R::from_entity(entity)
    }

    /// Loads the entity and opens its stored payload.
    pub async fn open(&self, id: Uuid) -> Result<(R, ByteStream), ContentError> {
        let resource = self.get(id).await?;
        let path = resource
            .storage_path()
            .ok_or_else(|| {
                ContentError::validation(format!("{} has no stored content", R::KIND.label()))
            })?
            .to_string();

        let stream = self.storage.open(&path).await?;
        Ok((resource, stream))
    }

    /// Deletes the entity with all descendants, then removes the payloads the
    /// deleted rows referenced. Payload removal is best effort.
    pub async fn delete(&self, id: Uuid) -> Result<(), ContentError> {
        let released = self
            .store
            .delete(R::KIND, id)
            .await?
            .ok_or_else(|| R::KIND.not_found(id))?;

        for path in &released {
            if let Err(e) = self.storage.delete(path).await {
                warn!("Failed to remove stored file {} for {} {}: {}", path, R::KIND, id, e);
            }
        }

        info!(
            "Deleted {} {} ({} stored files released)",
            R::KIND,
            id,
            released.len()
        );
        Ok(())
    }
}

async fn insert(store: &dyn CatalogStore, draft: Draft) -> Result<Entity, ContentError> {
    let kind = draft.kind();
    store.insert(draft).await.map_err(|e| match e {
        ContentError::Conflict { .. } if kind.name_unique() => kind.name_conflict(),
        other => other,
    })
}

async fn persist_with_blob<R: Resource>(
    store: &dyn CatalogStore,
    storage: &dyn StorageBackend,
    layout: BlobLayout,
    id: Uuid,
    parent_id: Uuid,
    fields: R::Fields,
    filename: String,
    upload: Upload,
) -> Result<Entity, ContentError> {
    let size_bytes = i64::try_from(upload.data.len())
        .map_err(|_| ContentError::validation("Upload is too large"))?;

    let relative_path = layout.relative_path(parent_id, id, &filename);
    let storage_path = storage.save(&relative_path, upload.data).await?;

    let blob = StoredBlob {
        filename,
        mime_type: upload.content_type,
        size_bytes,
        storage_path: storage_path.clone(),
    };

    let result = match R::draft(id, Some(parent_id), fields, Some(blob)) {
        Ok(draft) => insert(store, draft).await,
        Err(e) => Err(e),
    };

    if result.is_err() {
        // No row references the payload; remove it instead of leaving an orphan.
        if let Err(e) = storage.delete(&storage_path).await {
            warn!(
                "Failed to remove orphaned file {} after rejected {} insert: {}",
                storage_path,
                R::KIND,
                e
            );
        }
    }

    result
}
