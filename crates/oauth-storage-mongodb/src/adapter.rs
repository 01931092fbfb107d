// MongoAdapter: the document adapter seam implemented over MongoDB.
//
// Collections map one-to-one to adapter collections and filters become BSON
// query documents. Every driver failure is surfaced as a backend error.

use async_trait::async_trait;
use mongodb::bson::Document;
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};

use oauth_storage_core::config::ConnectionOptions;
use oauth_storage_core::db::adapter::{Adapter, AdapterResult, WhereClause};
use oauth_storage_core::error::StorageError;

use crate::query;

/// MongoDB document adapter.
#[derive(Debug, Clone)]
pub struct MongoAdapter {
    db: Database,
}

impl MongoAdapter {
    /// Create a new adapter from an existing database handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new adapter by connecting to a MongoDB URI.
    pub async fn connect(uri: &str, db_name: &str) -> AdapterResult<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| StorageError::backend(format!("MongoDB connection failed: {e}")))?;
        Ok(Self {
            db: client.database(db_name),
        })
    }

    /// Connect from a host/port/database descriptor.
    pub async fn connect_with(options: &ConnectionOptions) -> AdapterResult<Self> {
        options.validate()?;
        let uri = format!("mongodb://{}:{}", options.host, options.port);
        tracing::debug!(host = %options.host, port = options.port, database = %options.database, "connecting to MongoDB");
        Self::connect(&uri, &options.database).await
    }

    /// Get a reference to the underlying database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Get a raw collection handle by name.
    pub fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }
}

#[async_trait]
impl Adapter for MongoAdapter {
    async fn find_one(
        &self,
        collection: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        let filter = query::build_filter(where_clauses);

        let result = self
            .collection(collection)
            .find_one(filter)
            .await
            .map_err(|e| StorageError::backend(format!("MongoDB find_one failed: {e}")))?;

        Ok(result.map(|doc| query::doc_to_json(&doc)))
    }

    async fn insert_one(&self, collection: &str, data: serde_json::Value) -> AdapterResult<()> {
        let doc = query::build_insert_doc(&data);

        self.collection(collection)
            .insert_one(doc)
            .await
            .map_err(|e| StorageError::backend(format!("MongoDB insert failed: {e}")))?;

        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<u64> {
        let filter = query::build_filter(where_clauses);
        let update = query::build_update_doc(&data);

        let result = self
            .collection(collection)
            .update_one(filter, update)
            .await
            .map_err(|e| StorageError::backend(format!("MongoDB update failed: {e}")))?;

        Ok(result.matched_count)
    }

    async fn delete_many(
        &self,
        collection: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<u64> {
        let filter = query::build_filter(where_clauses);

        let result = self
            .collection(collection)
            .delete_many(filter)
            .await
            .map_err(|e| StorageError::backend(format!("MongoDB delete failed: {e}")))?;

        Ok(result.deleted_count)
    }

    async fn ensure_unique_index(&self, collection: &str, fields: &[&str]) -> AdapterResult<()> {
        let index_model = IndexModel::builder()
            .keys(query::build_index_keys(fields))
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.collection(collection)
            .create_index(index_model)
            .await
            .map_err(|e| StorageError::backend(format!("MongoDB create_index failed: {e}")))?;

        Ok(())
    }
}
