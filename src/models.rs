use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::catalog::{
    Collection, Dataset, Document, KnowledgeBase, NewCollection, NewDataset, NewDocument,
    NewKnowledgeBase, NewWorkspace, Workspace,
};
use crate::schema::{collections, datasets, documents, knowledge_bases, workspaces};

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = workspaces)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WorkspaceRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = workspaces)]
pub struct NewWorkspaceRow<'a> {
    pub id: &'a Uuid,
    pub name: &'a str,
    pub description: Option<&'a str>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = knowledge_bases)]
#[diesel(belongs_to(WorkspaceRow, foreign_key = workspace_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct KnowledgeBaseRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = knowledge_bases)]
pub struct NewKnowledgeBaseRow<'a> {
    pub id: &'a Uuid,
    pub workspace_id: &'a Uuid,
    pub name: &'a str,
    pub description: Option<&'a str>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = collections)]
#[diesel(belongs_to(KnowledgeBaseRow, foreign_key = knowledge_base_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CollectionRow {
    pub id: Uuid,
    pub knowledge_base_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = collections)]
pub struct NewCollectionRow<'a> {
    pub id: &'a Uuid,
    pub knowledge_base_id: &'a Uuid,
    pub name: &'a str,
    pub description: Option<&'a str>,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(CollectionRow, foreign_key = collection_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DocumentRow {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub storage_path: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocumentRow<'a> {
    pub id: &'a Uuid,
    pub collection_id: &'a Uuid,
    pub filename: &'a str,
    pub mime_type: Option<&'a str>,
    pub size_bytes: i64,
    pub storage_path: &'a str,
    pub status: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(table_name = datasets)]
#[diesel(belongs_to(WorkspaceRow, foreign_key = workspace_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DatasetRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable)]
#[diesel(table_name = datasets)]
pub struct NewDatasetRow<'a> {
    pub id: &'a Uuid,
    pub workspace_id: &'a Uuid,
    pub name: &'a str,
    pub filename: &'a str,
    pub mime_type: Option<&'a str>,
    pub size_bytes: i64,
    pub storage_path: &'a str,
}

impl<'a> From<&'a NewWorkspace> for NewWorkspaceRow<'a> {
    fn from(new: &'a NewWorkspace) -> Self {
        NewWorkspaceRow {
            id: &new.id,
            name: &new.name,
            description: new.description.as_deref(),
        }
    }
}

impl<'a> From<&'a NewKnowledgeBase> for NewKnowledgeBaseRow<'a> {
    fn from(new: &'a NewKnowledgeBase) -> Self {
        NewKnowledgeBaseRow {
            id: &new.id,
            workspace_id: &new.workspace_id,
            name: &new.name,
            description: new.description.as_deref(),
        }
    }
}

impl<'a> From<&'a NewCollection> for NewCollectionRow<'a> {
    fn from(new: &'a NewCollection) -> Self {
        NewCollectionRow {
            id: &new.id,
            knowledge_base_id: &new.knowledge_base_id,
            name: &new.name,
            description: new.description.as_deref(),
        }
    }
}

impl<'a> From<&'a NewDocument> for NewDocumentRow<'a> {
    fn from(new: &'a NewDocument) -> Self {
        NewDocumentRow {
            id: &new.id,
            collection_id: &new.collection_id,
            filename: &new.filename,
            mime_type: new.mime_type.as_deref(),
            size_bytes: new.size_bytes,
            storage_path: &new.storage_path,
            status: &new.status,
        }
    }
}

impl<'a> From<&'a NewDataset> for NewDatasetRow<'a> {
    fn from(new: &'a NewDataset) -> Self {
        NewDatasetRow {
            id: &new.id,
            workspace_id: &new.workspace_id,
            name: &new.name,
            filename: &new.filename,
            mime_type: new.mime_type.as_deref(),
            size_bytes: new.size_bytes,
            storage_path: &new.storage_path,
        }
    }
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Workspace {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

impl From<KnowledgeBaseRow> for KnowledgeBase {
    fn from(row: KnowledgeBaseRow) -> Self {
        KnowledgeBase {
            id: row.id,
            workspace_id: row.workspace_id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

impl From<CollectionRow> for Collection {
    fn from(row: CollectionRow) -> Self {
        Collection {
            id: row.id,
            knowledge_base_id: row.knowledge_base_id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document {
            id: row.id,
            collection_id: row.collection_id,
            filename: row.filename,
            mime_type: row.mime_type,
            size_bytes: row.size_bytes,
            storage_path: row.storage_path,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

impl From<DatasetRow> for Dataset {
    fn from(row: DatasetRow) -> Self {
        Dataset {
            id: row.id,
            workspace_id: row.workspace_id,
            name: row.name,
            filename: row.filename,
            mime_type: row.mime_type,
            size_bytes: row.size_bytes,
            storage_path: row.storage_path,
            created_at: row.created_at,
        }
    }
}
