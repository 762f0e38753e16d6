use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use object_store::{
    aws::AmazonS3Builder, gcp::GoogleCloudStorageBuilder, local::LocalFileSystem,
    memory::InMemory, path::Path as ObjectPath, ObjectStore, PutPayload,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ContentError;

pub type ByteStream = BoxStream<'static, Result<Bytes, ContentError>>;

/// Byte payload persistence addressed by a path relative to the backend root.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Writes `data` and returns the normalized path to record in the catalog.
    async fn save(&self, relative_path: &str, data: Bytes) -> Result<String, ContentError>;

    async fn open(&self, relative_path: &str) -> Result<ByteStream, ContentError>;

    /// Removes the payload. A missing payload is not an error.
    async fn delete(&self, relative_path: &str) -> Result<(), ContentError>;
}

/// Collapses `.`, `..` and repeated separators. `..` never climbs above the
/// root, so the result always stays inside the backend.
pub fn normalize_path(relative_path: &str) -> Result<String, ContentError> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in relative_path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(ContentError::validation(format!(
            "Storage path '{}' is empty after normalization",
            relative_path
        )));
    }

    Ok(segments.join("/"))
}

/// ASCII characters `object_store` percent-encodes inside a path segment.
fn is_encoded_by_store(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '\\' | '{' | '}' | '^' | '%' | '`' | '[' | ']' | '"' | '<' | '>' | '~' | '#' | '|'
                | '*' | '?'
        )
}

/// Keeps only the final component of a client supplied filename. ASCII
/// characters the store would percent-encode become `_` so the on-disk name
/// stays readable.
pub fn sanitize_filename(filename: Option<&str>, default: &str) -> String {
    filename
        .and_then(|name| {
            name.rsplit(['/', '\\'])
                .next()
                .map(str::trim)
                .filter(|last| !last.is_empty() && *last != "." && *last != "..")
        })
        .map(|last| {
            last.chars()
                .map(|c| if is_encoded_by_store(c) { '_' } else { c })
                .collect()
        })
        .unwrap_or_else(|| default.to_string())
}

pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    location: String,
}

impl std::fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("location", &self.location)
            .finish()
    }
}

impl ObjectStorage {
    pub fn new(store: Arc<dyn ObjectStore>, location: impl Into<String>) -> Self {
        Self {
            store,
            location: location.into(),
        }
    }

    /// Local directory backend. Writes land in a temporary file that is
    /// renamed into place, so readers never observe a partial payload.
    pub fn local(root: impl AsRef<Path>) -> Result<Self, ContentError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;

        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| ContentError::ConfigError {
                message: format!(
                    "Failed to open storage root '{}': {}",
                    root.display(),
                    e
                ),
            })?
            .with_automatic_cleanup(true);

        info!("Using local file storage rooted at {}", root.display());
        Ok(Self::new(Arc::new(store), root.display().to_string()))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory://")
    }

    pub fn gcs(bucket_name: &str) -> Result<Self, ContentError> {
        info!(
            "Initializing GCP Cloud Storage client for bucket: {}",
            bucket_name
        );

        let mut builder = GoogleCloudStorageBuilder::new().with_bucket_name(bucket_name);
        if let Ok(service_account_path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            builder = builder.with_service_account_path(service_account_path);
        }

        let store = builder.build().map_err(|e| ContentError::ConfigError {
            message: format!(
                "Failed to create GCS client for bucket '{}': {}",
                bucket_name, e
            ),
        })?;

        Ok(Self::new(Arc::new(store), format!("gs://{}", bucket_name)))
    }

    pub fn s3(bucket_name: &str) -> Result<Self, ContentError> {
        info!("Creating S3 client for bucket: {}", bucket_name);

        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket_name)
            .build()
            .map_err(|e| ContentError::ConfigError {
                message: format!("Failed to create S3 client: {}", e),
            })?;

        Ok(Self::new(Arc::new(store), format!("s3://{}", bucket_name)))
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Encodes a freshly normalized path. Segments with characters the store
    /// cannot keep verbatim come back percent-encoded.
    fn object_path(normalized: &str) -> ObjectPath {
        ObjectPath::from_iter(normalized.split('/'))
    }

    /// Reads back a path previously returned by `save`, without encoding it again.
    fn stored_object_path(normalized: &str) -> Result<ObjectPath, ContentError> {
        ObjectPath::parse(normalized).map_err(|e| {
            ContentError::validation(format!("Invalid storage path '{}': {}", normalized, e))
        })
    }
}

#[async_trait]
impl StorageBackend for ObjectStorage {
    async fn save(&self, relative_path: &str, data: Bytes) -> Result<String, ContentError> {
        let normalized = normalize_path(relative_path)?;
        let size = data.len();

        let path = Self::object_path(&normalized);

        self.store.put(&path, PutPayload::from(data)).await?;

        // The encoded form is the name the object was written under.
        let stored = path.as_ref().to_string();
        debug!("Stored {} bytes at {}/{}", size, self.location, stored);
        Ok(stored)
    }

    async fn open(&self, relative_path: &str) -> Result<ByteStream, ContentError> {
        let normalized = normalize_path(relative_path)?;

        let result = self
            .store
            .get(&Self::stored_object_path(&normalized)?)
            .await
            .map_err(|e| match e {
                object_store::Error::NotFound { .. } => ContentError::BlobNotFound {
                    path: normalized.clone(),
                },
                other => other.into(),
            })?;

        Ok(result.into_stream().map_err(ContentError::from).boxed())
    }

    async fn delete(&self, relative_path: &str) -> Result<(), ContentError> {
        let normalized = normalize_path(relative_path)?;

        match self
            .store
            .delete(&Self::stored_object_path(&normalized)?)
            .await
        {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {
                debug!("Deleted {}/{}", self.location, normalized);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Drains a [`ByteStream`] into memory.
pub async fn read_all(mut stream: ByteStream) -> Result<Vec<u8>, ContentError> {
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer)
}
