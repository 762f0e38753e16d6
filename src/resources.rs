use serde::Deserialize;
use uuid::Uuid;

use crate::catalog::{
    Collection, Dataset, Document, Draft, Entity, EntityKind, KnowledgeBase, NewCollection,
    NewDataset, NewDocument, NewKnowledgeBase, NewWorkspace, Workspace, DEFAULT_DOCUMENT_STATUS,
    MAX_NAME_LEN,
};
use crate::error::ContentError;
use crate::service::{missing_blob, missing_parent, unexpected_entity, Resource, StoredBlob, Upload};

/// Body of the workspace, knowledge base and collection create endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedFields {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NamedFields {
    pub fn new(name: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            name: name.into(),
            description: description.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatasetFields {
    pub name: String,
}

fn validate_name(kind: EntityKind, name: &str) -> Result<(), ContentError> {
    if name.trim().is_empty() {
        return Err(ContentError::validation(format!(
            "{} name must not be blank",
            kind.label()
        )));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ContentError::validation(format!(
            "{} name must be at most {} characters",
            kind.label(),
            MAX_NAME_LEN
        )));
    }
    Ok(())
}

/// Either signal is enough: a content type mentioning csv, or a `.csv` filename.
pub fn looks_like_csv(content_type: Option<&str>, filename: Option<&str>) -> bool {
    let by_type = content_type
        .map(|ct| ct.to_lowercase().contains("csv"))
        .unwrap_or(false);
    let by_name = filename
        .map(|name| name.to_lowercase().ends_with(".csv"))
        .unwrap_or(false);
    by_type || by_name
}

impl Resource for Workspace {
    type Fields = NamedFields;

    const KIND: EntityKind = EntityKind::Workspace;

    fn name(fields: &NamedFields) -> Option<&str> {
        Some(&fields.name)
    }

    fn validate(fields: &NamedFields, _upload: Option<&Upload>) -> Result<(), ContentError> {
        validate_name(Self::KIND, &fields.name)
    }

    fn draft(
        id: Uuid,
        _parent_id: Option<Uuid>,
        fields: NamedFields,
        _blob: Option<StoredBlob>,
    ) -> Result<Draft, ContentError> {
        Ok(Draft::Workspace(NewWorkspace {
            id,
            name: fields.name,
            description: fields.description,
        }))
    }

    fn from_entity(entity: Entity) -> Result<Self, ContentError> {
        match entity {
            Entity::Workspace(workspace) => Ok(workspace),
            other => Err(unexpected_entity(Self::KIND, &other)),
        }
    }
}

impl Resource for KnowledgeBase {
    type Fields = NamedFields;

    const KIND: EntityKind = EntityKind::KnowledgeBase;

    fn name(fields: &NamedFields) -> Option<&str> {
        Some(&fields.name)
    }

    fn validate(fields: &NamedFields, _upload: Option<&Upload>) -> Result<(), ContentError> {
        validate_name(Self::KIND, &fields.name)
    }

    fn draft(
        id: Uuid,
        parent_id: Option<Uuid>,
        fields: NamedFields,
        _blob: Option<StoredBlob>,
    ) -> Result<Draft, ContentError> {
        Ok(Draft::KnowledgeBase(NewKnowledgeBase {
            id,
            workspace_id: parent_id.ok_or_else(|| missing_parent(Self::KIND))?,
            name: fields.name,
            description: fields.description,
        }))
    }

    fn from_entity(entity: Entity) -> Result<Self, ContentError> {
        match entity {
            Entity::KnowledgeBase(knowledge_base) => Ok(knowledge_base),
            other => Err(unexpected_entity(Self::KIND, &other)),
        }
    }
}

impl Resource for Collection {
    type Fields = NamedFields;

    const KIND: EntityKind = EntityKind::Collection;

    fn name(fields: &NamedFields) -> Option<&str> {
        Some(&fields.name)
    }

    fn validate(fields: &NamedFields, _upload: Option<&Upload>) -> Result<(), ContentError> {
        validate_name(Self::KIND, &fields.name)
    }

    fn draft(
        id: Uuid,
        parent_id: Option<Uuid>,
        fields: NamedFields,
        _blob: Option<StoredBlob>,
    ) -> Result<Draft, ContentError> {
        Ok(Draft::Collection(NewCollection {
            id,
            knowledge_base_id: parent_id.ok_or_else(|| missing_parent(Self::KIND))?,
            name: fields.name,
            description: fields.description,
        }))
    }

    fn from_entity(entity: Entity) -> Result<Self, ContentError> {
        match entity {
            Entity::Collection(collection) => Ok(collection),
            other => Err(unexpected_entity(Self::KIND, &other)),
        }
    }
}

impl Resource for Document {
    type Fields = ();

    const KIND: EntityKind = EntityKind::Document;

    fn draft(
        id: Uuid,
        parent_id: Option<Uuid>,
        _fields: (),
        blob: Option<StoredBlob>,
    ) -> Result<Draft, ContentError> {
        let blob = blob.ok_or_else(|| missing_blob(Self::KIND))?;
        Ok(Draft::Document(NewDocument {
            id,
            collection_id: parent_id.ok_or_else(|| missing_parent(Self::KIND))?,
            filename: blob.filename,
            mime_type: blob.mime_type,
            size_bytes: blob.size_bytes,
            storage_path: blob.storage_path,
            status: DEFAULT_DOCUMENT_STATUS.to_string(),
        }))
    }

    fn from_entity(entity: Entity) -> Result<Self, ContentError> {
        match entity {
            Entity::Document(document) => Ok(document),
            other => Err(unexpected_entity(Self::KIND, &other)),
        }
    }

    fn storage_path(&self) -> Option<&str> {
        Some(&self.storage_path)
    }
}

impl Resource for Dataset {
    type Fields = DatasetFields;

    const KIND: EntityKind = EntityKind::Dataset;

    fn name(fields: &DatasetFields) -> Option<&str> {
        Some(&fields.name)
    }

    fn validate(fields: &DatasetFields, upload: Option<&Upload>) -> Result<(), ContentError> {
        validate_name(Self::KIND, &fields.name)?;

        let upload = upload.ok_or_else(|| ContentError::validation("Dataset upload requires a file"))?;
        if !looks_like_csv(upload.content_type.as_deref(), upload.filename.as_deref()) {
            return Err(ContentError::validation(
                "Uploaded file does not look like a CSV (content-type or extension mismatch).",
            ));
        }
        Ok(())
    }

    fn draft(
        id: Uuid,
        parent_id: Option<Uuid>,
        fields: DatasetFields,
        blob: Option<StoredBlob>,
    ) -> Result<Draft, ContentError> {
        let blob = blob.ok_or_else(|| missing_blob(Self::KIND))?;
        Ok(Draft::Dataset(NewDataset {
            id,
            workspace_id: parent_id.ok_or_else(|| missing_parent(Self::KIND))?,
            name: fields.name,
            filename: blob.filename,
            mime_type: blob.mime_type,
            size_bytes: blob.size_bytes,
            storage_path: blob.storage_path,
        }))
    }

    fn from_entity(entity: Entity) -> Result<Self, ContentError> {
        match entity {
            Entity::Dataset(dataset) => Ok(dataset),
            other => Err(unexpected_entity(Self::KIND, &other)),
        }
    }

    fn storage_path(&self) -> Option<&str> {
        Some(&self.storage_path)
    }
}
