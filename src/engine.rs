use std::sync::Arc;

use tracing::{info, warn};

use crate::catalog::{CatalogStore, Collection, Dataset, Document, KnowledgeBase, Workspace};
use crate::config::{AppConfig, StorageKind};
use crate::database::DatabaseManager;
use crate::error::ContentError;
use crate::memory::MemoryCatalog;
use crate::service::ResourceService;
use crate::storage::{ObjectStorage, StorageBackend};

/// Owns the catalog store and the blob storage and hands out one
/// [`ResourceService`] per entity kind.
pub struct ContentEngine {
    store: Arc<dyn CatalogStore>,
    pub workspaces: ResourceService<Workspace>,
    pub knowledge_bases: ResourceService<KnowledgeBase>,
    pub collections: ResourceService<Collection>,
    pub documents: ResourceService<Document>,
    pub datasets: ResourceService<Dataset>,
}

impl ContentEngine {
    pub async fn new(config: &AppConfig) -> Result<Self, ContentError> {
        info!("Initializing Content Engine");

        let store: Arc<dyn CatalogStore> = match config.database_url.as_deref() {
            Some(url) => Arc::new(DatabaseManager::new(url).await?),
            None => {
                warn!("DATABASE_URL not set, catalog is kept in memory and lost on restart");
                Arc::new(MemoryCatalog::new())
            }
        };

        let storage = open_storage(config)?;
        info!("Blob storage ready at {}", storage.location());
        let storage: Arc<dyn StorageBackend> = Arc::new(storage);

        info!("Content Engine initialized successfully");
        Ok(Self::with_backends(store, storage))
    }

    pub fn with_backends(store: Arc<dyn CatalogStore>, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            workspaces: ResourceService::new(store.clone(), storage.clone()),
            knowledge_bases: ResourceService::new(store.clone(), storage.clone()),
            collections: ResourceService::new(store.clone(), storage.clone()),
            documents: ResourceService::new(store.clone(), storage.clone()),
            datasets: ResourceService::new(store.clone(), storage),
            store,
        }
    }

    /// Everything in memory. Used by tests and local experiments.
    pub fn in_memory() -> Self {
        Self::with_backends(
            Arc::new(MemoryCatalog::new()),
            Arc::new(ObjectStorage::in_memory()),
        )
    }

    pub async fn health_check(&self) -> Result<(), ContentError> {
        self.store.ping().await
    }
}

fn open_storage(config: &AppConfig) -> Result<ObjectStorage, ContentError> {
    let bucket = || {
        config
            .storage_bucket
            .as_deref()
            .ok_or_else(|| ContentError::ConfigError {
                message: "STORAGE_BUCKET is required for gcs and s3 storage".to_string(),
            })
    };

    match config.storage_kind {
        StorageKind::Local => ObjectStorage::local(&config.storage_root),
        StorageKind::Memory => {
            warn!("Using in-memory blob storage, uploads are lost on restart");
            Ok(ObjectStorage::in_memory())
        }
        StorageKind::Gcs => ObjectStorage::gcs(bucket()?),
        StorageKind::S3 => ObjectStorage::s3(bucket()?),
    }
}
