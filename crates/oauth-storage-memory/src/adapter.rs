// In-memory document adapter: HashMap-based collections implementing the core Adapter trait.
//
// Stores documents in `HashMap<String, Vec<serde_json::Value>>` keyed by
// collection name. Thread-safe via `tokio::sync::RwLock`. Unique indexes are
// enforced on insert the way a document database would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use oauth_storage_core::db::adapter::{Adapter, AdapterResult, Operator, WhereClause};
use oauth_storage_core::error::StorageError;

/// Type alias for the in-memory store.
type Store = HashMap<String, Vec<serde_json::Value>>;

/// In-memory document adapter.
///
/// Clones share the same underlying collections. Data is lost when the last
/// clone is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    store: Arc<RwLock<Store>>,
    unique_indexes: Arc<RwLock<HashMap<String, Vec<Vec<String>>>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryAdapter {
    /// Create a new empty in-memory adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all data (for debugging/testing).
    pub async fn snapshot(&self) -> Store {
        self.store.read().await.clone()
    }

    /// Clear all data. Indexes are kept.
    pub async fn clear(&self) {
        self.store.write().await.clear();
    }

    /// Number of documents in a collection.
    pub async fn collection_len(&self, collection: &str) -> usize {
        self.store
            .read()
            .await
            .get(collection)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Simulate an outage: while set, every operation fails with a backend error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> AdapterResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::backend("memory adapter is unavailable"));
        }
        Ok(())
    }
}

/// Check if a document matches every clause.
fn matches_where(record: &serde_json::Value, clauses: &[WhereClause]) -> bool {
    clauses.iter().all(|clause| {
        let field_val = record
            .get(&clause.field)
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        match_operator(&field_val, &clause.value, clause.operator)
    })
}

/// Match a single operator condition.
fn match_operator(field_val: &serde_json::Value, target: &serde_json::Value, op: Operator) -> bool {
    match op {
        Operator::Eq => field_val == target,
        Operator::Lt => compare_json(field_val, target).is_some_and(|c| c.is_lt()),
    }
}

/// Compare two JSON values numerically/lexicographically.
fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (serde_json::Value::Number(an), serde_json::Value::Number(bn)) => {
            an.as_f64()?.partial_cmp(&bn.as_f64()?)
        }
        (serde_json::Value::String(a_s), serde_json::Value::String(b_s)) => Some(a_s.cmp(b_s)),
        _ => None,
    }
}

/// Merge update data into an existing document.
fn merge_update(record: &mut serde_json::Value, data: &serde_json::Value) {
    if let (Some(rec_obj), Some(data_obj)) = (record.as_object_mut(), data.as_object()) {
        for (k, v) in data_obj {
            rec_obj.insert(k.clone(), v.clone());
        }
    }
}

fn index_key(record: &serde_json::Value, fields: &[String]) -> Vec<serde_json::Value> {
    fields
        .iter()
        .map(|f| record.get(f).cloned().unwrap_or(serde_json::Value::Null))
        .collect()
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn find_one(
        &self,
        collection: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>> {
        self.check_available()?;
        let store = self.store.read().await;
        Ok(store
            .get(collection)
            .and_then(|recs| recs.iter().find(|r| matches_where(r, where_clauses)).cloned()))
    }

    async fn insert_one(&self, collection: &str, data: serde_json::Value) -> AdapterResult<()> {
        self.check_available()?;
        if !data.is_object() {
            return Err(StorageError::invalid_argument("documents must be JSON objects"));
        }

        let indexes = self.unique_indexes.read().await;
        let mut store = self.store.write().await;
        let records = store.entry(collection.to_string()).or_default();

        for fields in indexes.get(collection).into_iter().flatten() {
            let key = index_key(&data, fields);
            if records.iter().any(|r| index_key(r, fields) == key) {
                return Err(StorageError::backend(format!(
                    "duplicate key in {collection} on ({})",
                    fields.join(", ")
                )));
            }
        }

        records.push(data);
        Ok(())
    }

    async fn update_one(
        &self,
        collection: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<u64> {
        self.check_available()?;
        let mut store = self.store.write().await;
        let found = store
            .get_mut(collection)
            .and_then(|recs| recs.iter_mut().find(|r| matches_where(r, where_clauses)));

        match found {
            Some(record) => {
                merge_update(record, &data);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(
        &self,
        collection: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<u64> {
        self.check_available()?;
        let mut store = self.store.write().await;
        let Some(recs) = store.get_mut(collection) else {
            return Ok(0);
        };

        let before = recs.len();
        recs.retain(|r| !matches_where(r, where_clauses));
        Ok((before - recs.len()) as u64)
    }

    async fn ensure_unique_index(&self, collection: &str, fields: &[&str]) -> AdapterResult<()> {
        self.check_available()?;
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let mut indexes = self.unique_indexes.write().await;
        let entry = indexes.entry(collection.to_string()).or_default();
        if !entry.contains(&fields) {
            tracing::debug!(collection, fields = ?fields, "unique index registered");
            entry.push(fields);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_and_find_one() {
        let adapter = MemoryAdapter::new();
        adapter
            .insert_one("clients", json!({"app_id": "c1", "scope": "read"}))
            .await
            .unwrap();

        let found = adapter
            .find_one("clients", &[WhereClause::eq("app_id", "c1")])
            .await
            .unwrap();
        assert_eq!(found.unwrap()["scope"], "read");
    }

    #[tokio::test]
    async fn test_find_one_not_found() {
        let adapter = MemoryAdapter::new();
        let found = adapter
            .find_one("clients", &[WhereClause::eq("app_id", "nope")])
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_null_filter_matches_missing_field() {
        let adapter = MemoryAdapter::new();
        adapter
            .insert_one("keys", json!({"public_key": "global"}))
            .await
            .unwrap();
        adapter
            .insert_one("keys", json!({"app_id": "c1", "public_key": "mine"}))
            .await
            .unwrap();

        let global = adapter
            .find_one("keys", &[WhereClause::eq_opt("app_id", None)])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(global["public_key"], "global");
    }

    #[tokio::test]
    async fn test_update_one_merges_fields() {
        let adapter = MemoryAdapter::new();
        adapter
            .insert_one("users", json!({"username": "u", "password": "a", "extra": 1}))
            .await
            .unwrap();

        let matched = adapter
            .update_one(
                "users",
                &[WhereClause::eq("username", "u")],
                json!({"password": "b"}),
            )
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let user = adapter
            .find_one("users", &[WhereClause::eq("username", "u")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user["password"], "b");
        assert_eq!(user["extra"], 1);
    }

    #[tokio::test]
    async fn test_update_one_no_match() {
        let adapter = MemoryAdapter::new();
        let matched = adapter
            .update_one("users", &[WhereClause::eq("username", "x")], json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(matched, 0);
    }

    #[tokio::test]
    async fn test_delete_many_reports_count() {
        let adapter = MemoryAdapter::new();
        for expires in [10, 20, 30] {
            adapter
                .insert_one("tokens", json!({"expires": expires}))
                .await
                .unwrap();
        }

        let deleted = adapter
            .delete_many("tokens", &[WhereClause::lt("expires", 25)])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(adapter.collection_len("tokens").await, 1);

        let deleted = adapter
            .delete_many("missing", &[WhereClause::eq("a", 1)])
            .await
            .unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicates() {
        let adapter = MemoryAdapter::new();
        adapter
            .ensure_unique_index("tokens", &["refresh_token"])
            .await
            .unwrap();
        adapter
            .insert_one("tokens", json!({"refresh_token": "r1"}))
            .await
            .unwrap();

        let err = adapter
            .insert_one("tokens", json!({"refresh_token": "r1"}))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unavailable_surfaces_backend_error() {
        let adapter = MemoryAdapter::new();
        adapter.set_unavailable(true);
        let err = adapter
            .find_one("clients", &[WhereClause::eq("app_id", "c1")])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));

        adapter.set_unavailable(false);
        assert!(adapter
            .find_one("clients", &[WhereClause::eq("app_id", "c1")])
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_clear_and_snapshot() {
        let adapter = MemoryAdapter::new();
        adapter.insert_one("a", json!({"x": 1})).await.unwrap();
        assert_eq!(adapter.snapshot().await.len(), 1);
        adapter.clear().await;
        assert!(adapter.snapshot().await.is_empty());
    }
}
