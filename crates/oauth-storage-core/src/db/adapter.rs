// Document adapter trait: the driver seam under the document backend.
//
// A driver exposes named collections of JSON documents with natural-key
// filters. The backend does all entity logic on top of these few primitives,
// so MongoDB and the in-memory driver behave identically.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, StorageError>;

// ─── Where Clause ────────────────────────────────────────────────

/// Comparison operators for filter clauses. Natural-key lookups use `Eq`;
/// `Lt` exists for expiry sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Eq,
    Lt,
}

/// A single filter condition. Clauses in a slice are AND-ed together.
///
/// An `Eq` clause against `null` matches documents where the field is null
/// or absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    pub field: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub operator: Operator,
}

impl WhereClause {
    /// Simple equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            operator: Operator::Eq,
        }
    }

    /// Equality on an optional value; `None` matches null or missing fields.
    pub fn eq_opt(field: impl Into<String>, value: Option<&str>) -> Self {
        Self::eq(
            field,
            value.map_or(serde_json::Value::Null, serde_json::Value::from),
        )
    }

    pub fn lt(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            operator: Operator::Lt,
        }
    }
}

// ─── Adapter Trait ───────────────────────────────────────────────

/// The document adapter trait.
///
/// Works in `serde_json::Value` so drivers stay schema-agnostic; the document
/// backend converts between typed records and values.
#[async_trait]
pub trait Adapter: Send + Sync + fmt::Debug {
    /// Find the first document matching all clauses.
    async fn find_one(
        &self,
        collection: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<Option<serde_json::Value>>;

    /// Insert a new document.
    async fn insert_one(&self, collection: &str, data: serde_json::Value) -> AdapterResult<()>;

    /// Set the given fields on the first matching document, leaving other
    /// fields untouched. Returns the number of documents matched (0 or 1).
    async fn update_one(
        &self,
        collection: &str,
        where_clauses: &[WhereClause],
        data: serde_json::Value,
    ) -> AdapterResult<u64>;

    /// Delete every matching document. Returns the number actually removed.
    async fn delete_many(
        &self,
        collection: &str,
        where_clauses: &[WhereClause],
    ) -> AdapterResult<u64>;

    /// Ensure a unique index over `fields` exists on the collection.
    async fn ensure_unique_index(&self, collection: &str, fields: &[&str]) -> AdapterResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_opt_none_is_null() {
        let clause = WhereClause::eq_opt("app_id", None);
        assert_eq!(clause.value, serde_json::Value::Null);
        assert_eq!(clause.operator, Operator::Eq);
    }

    #[test]
    fn test_lt_clause() {
        let clause = WhereClause::lt("expires", 100);
        assert_eq!(clause.operator, Operator::Lt);
        assert_eq!(clause.value, serde_json::json!(100));
    }

    #[test]
    fn test_operator_defaults_to_eq_when_deserialized() {
        let clause: WhereClause =
            serde_json::from_value(serde_json::json!({"field": "app_id", "value": "a"})).unwrap();
        assert_eq!(clause.operator, Operator::Eq);
    }
}
