use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::{
    CatalogStore, Collection, Dataset, Document, Draft, Entity, EntityKind, KnowledgeBase,
    Workspace,
};
use crate::error::ContentError;

struct StoredEntity {
    entity: Entity,
    seq: u64,
}

#[derive(Default)]
struct Tables {
    rows: HashMap<Uuid, StoredEntity>,
    next_seq: u64,
    last_created_at: Option<DateTime<Utc>>,
}

impl Tables {
    fn find(&self, kind: EntityKind, id: Uuid) -> Option<&Entity> {
        self.rows
            .get(&id)
            .map(|stored| &stored.entity)
            .filter(|entity| entity.kind() == kind)
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let created_at = match self.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_created_at = Some(created_at);
        created_at
    }

    fn descendants(&self, root: &Entity) -> Vec<Uuid> {
        let mut removed = vec![root.id()];
        let mut frontier = vec![(root.kind(), root.id())];

        while let Some((parent_kind, parent_id)) = frontier.pop() {
            for stored in self.rows.values() {
                let child = &stored.entity;
                if child.kind().parent() == Some(parent_kind) && child.parent_id() == Some(parent_id)
                {
                    removed.push(child.id());
                    frontier.push((child.kind(), child.id()));
                }
            }
        }

        removed
    }
}

/// In-process [`CatalogStore`] holding every row behind one lock. It enforces
/// the same constraints as the Postgres schema at insert time.
#[derive(Default)]
pub struct MemoryCatalog {
    tables: RwLock<Tables>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn materialize(draft: Draft, created_at: DateTime<Utc>) -> Entity {
    match draft {
        Draft::Workspace(new) => Entity::Workspace(Workspace {
            id: new.id,
            name: new.name,
            description: new.description,
            created_at,
        }),
        Draft::KnowledgeBase(new) => Entity::KnowledgeBase(KnowledgeBase {
            id: new.id,
            workspace_id: new.workspace_id,
            name: new.name,
            description: new.description,
            created_at,
        }),
        Draft::Collection(new) => Entity::Collection(Collection {
            id: new.id,
            knowledge_base_id: new.knowledge_base_id,
            name: new.name,
            description: new.description,
            created_at,
        }),
        Draft::Document(new) => Entity::Document(Document {
            id: new.id,
            collection_id: new.collection_id,
            filename: new.filename,
            mime_type: new.mime_type,
            size_bytes: new.size_bytes,
            storage_path: new.storage_path,
            status: new.status,
            created_at,
        }),
        Draft::Dataset(new) => Entity::Dataset(Dataset {
            id: new.id,
            workspace_id: new.workspace_id,
            name: new.name,
            filename: new.filename,
            mime_type: new.mime_type,
            size_bytes: new.size_bytes,
            storage_path: new.storage_path,
            created_at,
        }),
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn exists(&self, kind: EntityKind, id: Uuid) -> Result<bool, ContentError> {
        Ok(self.tables.read().find(kind, id).is_some())
    }

    async fn name_taken(
        &self,
        kind: EntityKind,
        parent_id: Option<Uuid>,
        name: &str,
    ) -> Result<bool, ContentError> {
        if !kind.name_unique() {
            return Ok(false);
        }

        let tables = self.tables.read();
        Ok(tables.rows.values().any(|stored| {
            stored.entity.kind() == kind
                && stored.entity.parent_id() == parent_id
                && stored.entity.name() == Some(name)
        }))
    }

    async fn insert(&self, draft: Draft) -> Result<Entity, ContentError> {
        let kind = draft.kind();
        draft.check_lengths()?;

        let mut tables = self.tables.write();

        if tables.rows.contains_key(&draft.id()) {
            return Err(ContentError::Conflict {
                message: format!("Unique constraint violated: {}_pkey", kind.table_name()),
            });
        }

        if let (Some(parent_kind), Some(parent_id)) = (kind.parent(), draft.parent_id()) {
            if tables.find(parent_kind, parent_id).is_none() {
                return Err(parent_kind.not_found(parent_id));
            }
        }

        if kind.name_unique() {
            let duplicate = tables.rows.values().any(|stored| {
                stored.entity.kind() == kind
                    && stored.entity.parent_id() == draft.parent_id()
                    && stored.entity.name() == draft.name()
            });
            if duplicate {
                return Err(ContentError::Conflict {
                    message: format!("Unique constraint violated: {}_name_key", kind.table_name()),
                });
            }
        }

        let created_at = tables.next_timestamp();
        let seq = tables.next_seq;
        tables.next_seq += 1;

        let entity = materialize(draft, created_at);
        tables.rows.insert(
            entity.id(),
            StoredEntity {
                entity: entity.clone(),
                seq,
            },
        );

        debug!("Inserted {} {} into memory catalog", kind, entity.id());
        Ok(entity)
    }

    async fn get(&self, kind: EntityKind, id: Uuid) -> Result<Option<Entity>, ContentError> {
        Ok(self.tables.read().find(kind, id).cloned())
    }

    async fn list(
        &self,
        kind: EntityKind,
        parent_id: Option<Uuid>,
    ) -> Result<Vec<Entity>, ContentError> {
        let tables = self.tables.read();

        let mut matching: Vec<&StoredEntity> = tables
            .rows
            .values()
            .filter(|stored| stored.entity.kind() == kind && stored.entity.parent_id() == parent_id)
            .collect();
        matching.sort_by(|a, b| {
            b.entity
                .created_at()
                .cmp(&a.entity.created_at())
                .then(b.seq.cmp(&a.seq))
        });

        Ok(matching.into_iter().map(|stored| stored.entity.clone()).collect())
    }

    async fn delete(
        &self,
        kind: EntityKind,
        id: Uuid,
    ) -> Result<Option<Vec<String>>, ContentError> {
        let mut tables = self.tables.write();

        let Some(root) = tables.find(kind, id).cloned() else {
            return Ok(None);
        };

        let mut released = Vec::new();
        for removed_id in tables.descendants(&root) {
            if let Some(stored) = tables.rows.remove(&removed_id) {
                if let Some(path) = stored.entity.storage_path() {
                    released.push(path.to_string());
                }
            }
        }

        Ok(Some(released))
    }

    async fn ping(&self) -> Result<(), ContentError> {
        Ok(())
    }
}
