use std::collections::HashSet;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::error::{ErrorKind, InsertManyError, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::StoreError;
use crate::models::{Record, RecordId};

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;
/// Server error code returned by `create` when the collection already exists.
const NAMESPACE_EXISTS: i32 = 48;

/// The document database the seeder writes to.
///
/// Every operation is scoped to the database selected when the store was
/// built. Documents carry their identifier in `_id`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Round-trips a no-op command to check the server is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn collection_names(&self) -> Result<Vec<String>, StoreError>;

    /// Creates the collection. Returns `false` if it already existed.
    async fn create_collection(&self, name: &str) -> Result<bool, StoreError>;

    /// Drops the collection and its indexes. Dropping a missing collection is not an error.
    async fn drop_collection(&self, name: &str) -> Result<(), StoreError>;

    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError>;

    /// Inserts documents in order. A colliding `_id` or unique field fails
    /// with [`StoreError::DuplicateKey`].
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<(), StoreError>;

    /// Replaces each document by `_id`, inserting the ones that are missing.
    async fn upsert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<(), StoreError>;

    /// Returns the subset of `ids` present in the collection, in input order.
    async fn existing_ids(
        &self,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<Vec<RecordId>, StoreError>;

    async fn find_by_id(
        &self,
        collection: &str,
        id: RecordId,
    ) -> Result<Option<Document>, StoreError>;

    async fn count(&self, collection: &str) -> Result<u64, StoreError>;
}

/// Serializes records into documents for their collection.
pub fn to_documents<R: Record>(records: &[R]) -> Result<Vec<Document>, StoreError> {
    records
        .iter()
        .map(|record| bson::to_document(record).map_err(StoreError::from))
        .collect()
}

/// Reads the `_id` of a stored document.
pub fn document_id(collection: &str, document: &Document) -> Result<RecordId, StoreError> {
    document
        .get_object_id("_id")
        .map(RecordId::from)
        .map_err(|_| StoreError::MissingId {
            collection: collection.to_string(),
        })
}

/// Loads a typed record by id from its collection.
pub async fn find_record<R, S>(store: &S, id: RecordId) -> Result<Option<R>, StoreError>
where
    R: Record + DeserializeOwned,
    S: DocumentStore + ?Sized,
{
    match store.find_by_id(R::COLLECTION, id).await? {
        Some(document) => Ok(Some(bson::from_document(document)?)),
        None => Ok(None),
    }
}

/// MongoDB-backed document store bound to one database.
#[derive(Clone)]
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Builds a client from `options` and selects `database`.
    ///
    /// The driver connects lazily; call [`DocumentStore::ping`] to fail early
    /// on an unreachable server.
    pub fn connect(options: ClientOptions, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_options(options)?;
        Ok(Self::new(client.database(database)))
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection::<Document>(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn collection_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.database.list_collection_names().await?)
    }

    async fn create_collection(&self, name: &str) -> Result<bool, StoreError> {
        match self.database.create_collection(name).await {
            Ok(()) => Ok(true),
            Err(err) if is_namespace_exists(command_code(&err)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn drop_collection(&self, name: &str) -> Result<(), StoreError> {
        self.collection(name).drop().await?;
        Ok(())
    }

    async fn ensure_unique_index(&self, collection: &str, field: &str) -> Result<(), StoreError> {
        let mut keys = Document::new();
        keys.insert(field, 1);

        let index = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build();

        let result = self.collection(collection).create_index(index).await?;
        debug!("Index {} ready on {}", result.index_name, collection);
        Ok(())
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<(), StoreError> {
        if documents.is_empty() {
            return Ok(());
        }

        let ids = documents
            .iter()
            .map(|document| document_id(collection, document))
            .collect::<Result<Vec<_>, _>>()?;

        match self.collection(collection).insert_many(documents).await {
            Ok(result) => {
                debug!("Inserted {} documents into {}", result.inserted_ids.len(), collection);
                Ok(())
            }
            Err(err) => {
                let conflicts = write_conflicts(&err)
                    .into_iter()
                    .filter_map(|(i, field)| ids.get(i).map(|id| (*id, field)))
                    .collect();
                Err(StoreError::from_conflicts(collection, conflicts).unwrap_or_else(|| err.into()))
            }
        }
    }

    async fn upsert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<(), StoreError> {
        let coll = self.collection(collection);

        for document in documents {
            let id = document_id(collection, &document)?;
            if let Err(err) = coll.replace_one(doc! { "_id": id }, document).upsert(true).await {
                let conflicts = write_conflicts(&err)
                    .into_iter()
                    .map(|(_, field)| (id, field))
                    .collect();
                return Err(
                    StoreError::from_conflicts(collection, conflicts).unwrap_or_else(|| err.into())
                );
            }
        }

        Ok(())
    }

    async fn existing_ids(
        &self,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<Vec<RecordId>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let wanted: Vec<Bson> = ids.iter().copied().map(Bson::from).collect();
        let documents: Vec<Document> = self
            .collection(collection)
            .find(doc! { "_id": { "$in": wanted } })
            .projection(doc! { "_id": 1 })
            .await?
            .try_collect()
            .await?;

        let found = documents
            .iter()
            .map(|document| document_id(collection, document))
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(ids.iter().copied().filter(|id| found.contains(id)).collect())
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: RecordId,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self.collection(collection).find_one(doc! { "_id": id }).await?)
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        Ok(self.collection(collection).count_documents(doc! {}).await?)
    }
}

fn command_code(err: &mongodb::error::Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

fn is_namespace_exists(code: Option<i32>) -> bool {
    code == Some(NAMESPACE_EXISTS)
}

/// Documents rejected for a duplicate key, as (batch position, clashing field).
fn write_conflicts(err: &mongodb::error::Error) -> Vec<(usize, Option<String>)> {
    match err.kind.as_ref() {
        ErrorKind::InsertMany(InsertManyError {
            write_errors: Some(write_errors),
            ..
        }) => duplicate_conflicts(
            write_errors
                .iter()
                .map(|e| (e.index, e.code, e.message.as_str())),
        ),
        ErrorKind::Write(WriteFailure::WriteError(e)) => {
            duplicate_conflicts([(0, e.code, e.message.as_str())])
        }
        _ => Vec::new(),
    }
}

/// Keeps the duplicate key errors among (position, code, message) write errors.
fn duplicate_conflicts<'a>(
    errors: impl IntoIterator<Item = (usize, i32, &'a str)>,
) -> Vec<(usize, Option<String>)> {
    errors
        .into_iter()
        .filter(|(_, code, _)| *code == DUPLICATE_KEY)
        .map(|(index, _, message)| (index, duplicate_key_field(message)))
        .collect()
}

/// Field behind an E11000 message such as
/// `E11000 duplicate key error collection: users.customers index: username_1 dup key: { ... }`.
///
/// `None` means the `_id` index, or a message without an index name.
fn duplicate_key_field(message: &str) -> Option<String> {
    let (_, rest) = message.split_once("index: ")?;
    let index = rest.split_whitespace().next()?;
    if index == "_id_" {
        return None;
    }
    let field = index
        .strip_suffix("_-1")
        .or_else(|| index.strip_suffix("_1"))
        .unwrap_or(index);
    Some(field.to_string())
}
