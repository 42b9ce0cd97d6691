//! In-process document store.
//!
//! Mirrors the MongoDB semantics the seeder relies on (unique `_id`, unique
//! indexes, insertion order) without a server. Each `insert_many` call is
//! all-or-nothing: a batch with any duplicate is rejected before anything is
//! written.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use bson::{Bson, Document};
use tokio::sync::Mutex;

use crate::database::{DocumentStore, document_id};
use crate::errors::StoreError;
use crate::models::RecordId;

#[derive(Debug, Default)]
struct MemoryCollection {
    documents: Vec<Document>,
    unique_fields: Vec<String>,
}

impl MemoryCollection {
    fn position(&self, collection: &str, id: RecordId) -> Result<Option<usize>, StoreError> {
        for (i, document) in self.documents.iter().enumerate() {
            if document_id(collection, document)? == id {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// The first unique field `document` shares with a stored document other than `id`.
    fn unique_clash(
        &self,
        collection: &str,
        document: &Document,
        id: RecordId,
    ) -> Result<Option<String>, StoreError> {
        for field in &self.unique_fields {
            let Some(value) = document.get(field) else {
                continue;
            };
            for stored in &self.documents {
                if document_id(collection, stored)? != id && stored.get(field) == Some(value) {
                    return Ok(Some(field.clone()));
                }
            }
        }
        Ok(None)
    }
}

/// Thread-safe in-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, MemoryCollection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a collection's documents in insertion order.
    pub async fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .lock()
            .await
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collections.lock().await.keys().cloned().collect())
    }

    async fn create_collection(&self, name: &str) -> Result<bool, StoreError> {
        let mut collections = self.collections.lock().await;
        if collections.contains_key(name) {
            return Ok(false);
        }
        collections.insert(name.to_string(), MemoryCollection::default());
        Ok(true)
    }

    async fn drop_collection(&self, name: &str) -> Result<(), StoreError> {
        self.collections.lock().await.remove(name);
        Ok(())
    }

    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().await;
        let coll = collections.entry(collection.to_string()).or_default();
        if !coll.unique_fields.iter().any(|f| f == field) {
            coll.unique_fields.push(field.to_string());
        }
        Ok(())
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().await;
        let coll = collections.entry(collection.to_string()).or_default();

        let mut batch_ids = HashSet::new();
        let mut conflicts = Vec::new();
        let mut batch_values: Vec<(usize, &Bson)> = Vec::new();

        for document in &documents {
            let id = document_id(collection, document)?;
            if !batch_ids.insert(id) || coll.position(collection, id)?.is_some() {
                conflicts.push((id, None));
                continue;
            }

            let mut clash = coll.unique_clash(collection, document, id)?;
            for (field_index, field) in coll.unique_fields.iter().enumerate() {
                if let Some(value) = document.get(field) {
                    if clash.is_none() && batch_values.contains(&(field_index, value)) {
                        clash = Some(field.clone());
                    }
                    batch_values.push((field_index, value));
                }
            }

            if let Some(field) = clash {
                conflicts.push((id, Some(field)));
            }
        }

        if let Some(err) = StoreError::from_conflicts(collection, conflicts) {
            return Err(err);
        }

        coll.documents.extend(documents);
        Ok(())
    }

    async fn upsert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().await;
        let coll = collections.entry(collection.to_string()).or_default();

        for document in documents {
            let id = document_id(collection, &document)?;
            if let Some(field) = coll.unique_clash(collection, &document, id)? {
                return Err(StoreError::DuplicateField {
                    collection: collection.to_string(),
                    field,
                    ids: vec![id],
                });
            }
            match coll.position(collection, id)? {
                Some(i) => coll.documents[i] = document,
                None => coll.documents.push(document),
            }
        }

        Ok(())
    }

    async fn existing_ids(
        &self,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<Vec<RecordId>, StoreError> {
        let collections = self.collections.lock().await;
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let stored = coll
            .documents
            .iter()
            .map(|document| document_id(collection, document))
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(ids.iter().copied().filter(|id| stored.contains(id)).collect())
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: RecordId,
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.lock().await;
        let Some(coll) = collections.get(collection) else {
            return Ok(None);
        };
        Ok(coll
            .position(collection, id)?
            .map(|i| coll.documents[i].clone()))
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let collections = self.collections.lock().await;
        Ok(collections
            .get(collection)
            .map_or(0, |c| c.documents.len() as u64))
    }
}
