use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ContentError;

pub const DEFAULT_DOCUMENT_STATUS: &str = "ready";

/// Column widths of the relational schema.
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_FILENAME_LEN: usize = 512;
pub const MAX_MIME_TYPE_LEN: usize = 255;

/// Fails with a Validation error when `value` exceeds `max` characters.
pub fn check_length(field: &str, value: &str, max: usize) -> Result<(), ContentError> {
    if value.chars().count() > max {
        return Err(ContentError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

/// Where the payload of an uploaded entity lives inside the storage backend:
/// `{parent_segment}/{parent_id}/{child_segment}/{entity_id}/{filename}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobLayout {
    pub parent_segment: &'static str,
    pub child_segment: &'static str,
    pub default_filename: &'static str,
}

impl BlobLayout {
    pub fn relative_path(&self, parent_id: Uuid, entity_id: Uuid, filename: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.parent_segment, parent_id, self.child_segment, entity_id, filename
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Workspace,
    KnowledgeBase,
    Collection,
    Document,
    Dataset,
}

impl EntityKind {
    pub fn parent(&self) -> Option<EntityKind> {
        match self {
            EntityKind::Workspace => None,
            EntityKind::KnowledgeBase | EntityKind::Dataset => Some(EntityKind::Workspace),
            EntityKind::Collection => Some(EntityKind::KnowledgeBase),
            EntityKind::Document => Some(EntityKind::Collection),
        }
    }

    /// Kinds whose `name` must be unique among siblings (globally for workspaces).
    pub fn name_unique(&self) -> bool {
        matches!(
            self,
            EntityKind::Workspace | EntityKind::KnowledgeBase | EntityKind::Collection
        )
    }

    pub fn blob_layout(&self) -> Option<BlobLayout> {
        match self {
            EntityKind::Document => Some(BlobLayout {
                parent_segment: "collections",
                child_segment: "documents",
                default_filename: "unnamed",
            }),
            EntityKind::Dataset => Some(BlobLayout {
                parent_segment: "workspaces",
                child_segment: "datasets",
                default_filename: "dataset.csv",
            }),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Workspace => "Workspace",
            EntityKind::KnowledgeBase => "Knowledge base",
            EntityKind::Collection => "Collection",
            EntityKind::Document => "Document",
            EntityKind::Dataset => "Dataset",
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Workspace => "workspaces",
            EntityKind::KnowledgeBase => "knowledge_bases",
            EntityKind::Collection => "collections",
            EntityKind::Document => "documents",
            EntityKind::Dataset => "datasets",
        }
    }

    pub fn not_found(&self, id: Uuid) -> ContentError {
        ContentError::NotFound {
            resource: self.label(),
            id: id.to_string(),
        }
    }

    pub fn name_conflict(&self) -> ContentError {
        let scope = match self.parent() {
            Some(parent) => format!(" in this {}", parent.label().to_lowercase()),
            None => String::new(),
        };
        ContentError::Conflict {
            message: format!("{} with this name already exists{}.", self.label(), scope),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeBase {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub id: Uuid,
    pub knowledge_base_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    #[serde(skip_serializing, default)]
    pub storage_path: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    #[serde(skip_serializing, default)]
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWorkspace {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewKnowledgeBase {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCollection {
    pub id: Uuid,
    pub knowledge_base_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub storage_path: String,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct NewDataset {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub storage_path: String,
}

/// A row ready to be inserted; the store assigns `created_at`.
#[derive(Debug, Clone)]
pub enum Draft {
    Workspace(NewWorkspace),
    KnowledgeBase(NewKnowledgeBase),
    Collection(NewCollection),
    Document(NewDocument),
    Dataset(NewDataset),
}

impl Draft {
    pub fn kind(&self) -> EntityKind {
        match self {
            Draft::Workspace(_) => EntityKind::Workspace,
            Draft::KnowledgeBase(_) => EntityKind::KnowledgeBase,
            Draft::Collection(_) => EntityKind::Collection,
            Draft::Document(_) => EntityKind::Document,
            Draft::Dataset(_) => EntityKind::Dataset,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Draft::Workspace(d) => d.id,
            Draft::KnowledgeBase(d) => d.id,
            Draft::Collection(d) => d.id,
            Draft::Document(d) => d.id,
            Draft::Dataset(d) => d.id,
        }
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        match self {
            Draft::Workspace(_) => None,
            Draft::KnowledgeBase(d) => Some(d.workspace_id),
            Draft::Collection(d) => Some(d.knowledge_base_id),
            Draft::Document(d) => Some(d.collection_id),
            Draft::Dataset(d) => Some(d.workspace_id),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Draft::Workspace(d) => Some(&d.name),
            Draft::KnowledgeBase(d) => Some(&d.name),
            Draft::Collection(d) => Some(&d.name),
            Draft::Dataset(d) => Some(&d.name),
            Draft::Document(_) => None,
        }
    }

    fn payload_fields(&self) -> Option<(&str, Option<&str>)> {
        match self {
            Draft::Document(d) => Some((&d.filename, d.mime_type.as_deref())),
            Draft::Dataset(d) => Some((&d.filename, d.mime_type.as_deref())),
            _ => None,
        }
    }

    /// Checks every bounded text column against the schema widths.
    pub fn check_lengths(&self) -> Result<(), ContentError> {
        if let Some(name) = self.name() {
            check_length("Name", name, MAX_NAME_LEN)?;
        }
        if let Some((filename, mime_type)) = self.payload_fields() {
            check_length("Filename", filename, MAX_FILENAME_LEN)?;
            if let Some(mime_type) = mime_type {
                check_length("Content type", mime_type, MAX_MIME_TYPE_LEN)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Workspace(Workspace),
    KnowledgeBase(KnowledgeBase),
    Collection(Collection),
    Document(Document),
    Dataset(Dataset),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Workspace(_) => EntityKind::Workspace,
            Entity::KnowledgeBase(_) => EntityKind::KnowledgeBase,
            Entity::Collection(_) => EntityKind::Collection,
            Entity::Document(_) => EntityKind::Document,
            Entity::Dataset(_) => EntityKind::Dataset,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Entity::Workspace(e) => e.id,
            Entity::KnowledgeBase(e) => e.id,
            Entity::Collection(e) => e.id,
            Entity::Document(e) => e.id,
            Entity::Dataset(e) => e.id,
        }
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        match self {
            Entity::Workspace(_) => None,
            Entity::KnowledgeBase(e) => Some(e.workspace_id),
            Entity::Collection(e) => Some(e.knowledge_base_id),
            Entity::Document(e) => Some(e.collection_id),
            Entity::Dataset(e) => Some(e.workspace_id),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Entity::Workspace(e) => Some(&e.name),
            Entity::KnowledgeBase(e) => Some(&e.name),
            Entity::Collection(e) => Some(&e.name),
            Entity::Dataset(e) => Some(&e.name),
            Entity::Document(_) => None,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Entity::Workspace(e) => e.created_at,
            Entity::KnowledgeBase(e) => e.created_at,
            Entity::Collection(e) => e.created_at,
            Entity::Document(e) => e.created_at,
            Entity::Dataset(e) => e.created_at,
        }
    }

    pub fn storage_path(&self) -> Option<&str> {
        match self {
            Entity::Document(e) => Some(&e.storage_path),
            Entity::Dataset(e) => Some(&e.storage_path),
            _ => None,
        }
    }
}

/// Relational persistence for the content hierarchy.
///
/// Implementations enforce the same declarative constraints: children need an
/// existing parent, unique names per parent for `EntityKind::name_unique`
/// kinds, and cascading deletes from parent to descendants.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn exists(&self, kind: EntityKind, id: Uuid) -> Result<bool, ContentError>;

    async fn name_taken(
        &self,
        kind: EntityKind,
        parent_id: Option<Uuid>,
        name: &str,
    ) -> Result<bool, ContentError>;

    /// Inserts one row in a single transaction and returns it as persisted.
    async fn insert(&self, draft: Draft) -> Result<Entity, ContentError>;

    async fn get(&self, kind: EntityKind, id: Uuid) -> Result<Option<Entity>, ContentError>;

    /// Children of `parent_id`, most recently created first.
    async fn list(
        &self,
        kind: EntityKind,
        parent_id: Option<Uuid>,
    ) -> Result<Vec<Entity>, ContentError>;

    /// Deletes a row and all of its descendants. Returns the storage paths the
    /// removed rows referenced, or `None` when the row did not exist.
    async fn delete(&self, kind: EntityKind, id: Uuid)
        -> Result<Option<Vec<String>>, ContentError>;

    async fn ping(&self) -> Result<(), ContentError>;
}
