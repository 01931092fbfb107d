// BSON translation for the document adapter.
//
// Filters, insert documents and `$set` updates are built from the JSON the
// storage layer works in. The `id` field maps to Mongo's `_id`.

use mongodb::bson::{doc, Bson, Document};
use oauth_storage_core::db::adapter::{Operator, WhereClause};

/// Filter document for AND-ed clauses. Flat unless a field repeats, in which
/// case the conditions go under `$and`.
pub fn build_filter(clauses: &[WhereClause]) -> Document {
    let conditions: Vec<Document> = clauses.iter().map(match_clause_to_doc).collect();

    let mut seen = std::collections::HashSet::new();
    let distinct_fields = clauses.iter().all(|c| seen.insert(c.field.as_str()));

    if distinct_fields {
        let mut filter = Document::new();
        for (k, v) in conditions.into_iter().flatten() {
            filter.insert(k, v);
        }
        filter
    } else {
        doc! { "$and": conditions }
    }
}

fn match_clause_to_doc(clause: &WhereClause) -> Document {
    let field = if clause.field == "id" { "_id" } else { &clause.field };
    let value = json_to_bson(&clause.value);
    match clause.operator {
        Operator::Eq => doc! { field: value },
        Operator::Lt => doc! { field: { "$lt": value } },
    }
}

/// JSON to BSON. Integers stay `Int64` so `expires` compares numerically.
pub fn json_to_bson(v: &serde_json::Value) -> Bson {
    use serde_json::Value;
    match v {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Bson::Int64(i),
            (None, Some(f)) => Bson::Double(f),
            (None, None) => Bson::String(n.to_string()),
        },
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_bson(v)))
                .collect(),
        ),
    }
}

/// BSON to JSON. Dates become Unix seconds to match the `expires` fields;
/// types the entity records never hold map to null.
pub fn bson_to_json(b: &Bson) -> serde_json::Value {
    use serde_json::Value;
    match b {
        Bson::Boolean(b) => Value::from(*b),
        Bson::Int32(i) => Value::from(*i),
        Bson::Int64(i) => Value::from(*i),
        Bson::Double(f) => Value::from(*f),
        Bson::String(s) => Value::from(s.as_str()),
        Bson::ObjectId(oid) => Value::from(oid.to_hex()),
        Bson::DateTime(dt) => Value::from(dt.timestamp_millis() / 1000),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => doc_to_json(doc),
        _ => Value::Null,
    }
}

/// Stored document to JSON, renaming `_id` to `id`.
pub fn doc_to_json(doc: &Document) -> serde_json::Value {
    serde_json::Value::Object(
        doc.iter()
            .map(|(k, v)| (rename_key(k, "_id", "id"), bson_to_json(v)))
            .collect(),
    )
}

/// Entity JSON to a document ready for insert, renaming `id` to `_id`.
/// Null fields are kept so that null-matching filters find them.
pub fn build_insert_doc(data: &serde_json::Value) -> Document {
    data.as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| (rename_key(k, "id", "_id"), json_to_bson(v)))
                .collect()
        })
        .unwrap_or_default()
}

pub fn build_update_doc(data: &serde_json::Value) -> Document {
    doc! { "$set": build_insert_doc(data) }
}

/// Ascending compound index over `fields`.
pub fn build_index_keys(fields: &[&str]) -> Document {
    fields.iter().map(|f| (f.to_string(), Bson::Int32(1))).collect()
}

fn rename_key(key: &str, from: &str, to: &str) -> String {
    if key == from { to.to_string() } else { key.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_empty() {
        assert_eq!(build_filter(&[]), doc! {});
    }

    #[test]
    fn test_build_filter_eq() {
        let filter = build_filter(&[WhereClause::eq("app_id", "c1")]);
        assert_eq!(filter, doc! { "app_id": "c1" });
    }

    #[test]
    fn test_build_filter_natural_key_pair() {
        let filter = build_filter(&[
            WhereClause::eq("app_id", "c1"),
            WhereClause::eq("subject", "s1"),
        ]);
        assert_eq!(filter, doc! { "app_id": "c1", "subject": "s1" });
    }

    #[test]
    fn test_build_filter_null_matches_global() {
        let filter = build_filter(&[WhereClause::eq_opt("app_id", None)]);
        assert_eq!(filter, doc! { "app_id": Bson::Null });
    }

    #[test]
    fn test_build_filter_lt() {
        let filter = build_filter(&[WhereClause::lt("expires", 100)]);
        assert_eq!(filter, doc! { "expires": { "$lt": 100_i64 } });
    }

    #[test]
    fn test_build_filter_repeated_field_uses_and() {
        let filter = build_filter(&[
            WhereClause::lt("expires", 100),
            WhereClause::eq("expires", 50),
        ]);
        assert_eq!(
            filter,
            doc! { "$and": [ { "expires": { "$lt": 100_i64 } }, { "expires": 50_i64 } ] }
        );
    }

    #[test]
    fn test_build_filter_id_mapping() {
        let filter = build_filter(&[WhereClause::eq("id", "u1")]);
        assert_eq!(filter, doc! { "_id": "u1" });
    }

    #[test]
    fn test_json_to_bson_scalars() {
        assert_eq!(json_to_bson(&serde_json::json!("hello")), Bson::String("hello".into()));
        assert_eq!(json_to_bson(&serde_json::json!(42)), Bson::Int64(42));
        assert_eq!(json_to_bson(&serde_json::Value::Null), Bson::Null);
    }

    #[test]
    fn test_build_insert_doc_keeps_nulls() {
        let data = serde_json::json!({"access_token": "t", "scope": null});
        let doc = build_insert_doc(&data);
        assert_eq!(doc.get("scope"), Some(&Bson::Null));
        assert!(doc.contains_key("access_token"));
    }

    #[test]
    fn test_build_update_doc() {
        let doc = build_update_doc(&serde_json::json!({"scope": "read"}));
        assert_eq!(doc, doc! { "$set": { "scope": "read" } });
    }

    #[test]
    fn test_doc_to_json_id_mapping() {
        let doc = doc! { "_id": "x1", "app_id": "c1", "expires": 5_i64 };
        let json = doc_to_json(&doc);
        assert_eq!(json["id"], "x1");
        assert_eq!(json["app_id"], "c1");
        assert_eq!(json["expires"], 5);
        assert!(json.get("_id").is_none());
    }

    #[test]
    fn test_build_index_keys() {
        assert_eq!(
            build_index_keys(&["app_id", "subject"]),
            doc! { "app_id": 1, "subject": 1 }
        );
    }
}
