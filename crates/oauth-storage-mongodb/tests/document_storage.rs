// Integration tests for DocumentStorage driven by the in-memory adapter.
//
// Covers the shared conformance suite plus behavior specific to the document
// backend: partial merges, single-record upserts, refresh token inserts,
// configurable collection names, pruning and outage handling.

use oauth_storage_core::config::{DocumentConfig, Entity};
use oauth_storage_core::db::adapter::{Adapter, WhereClause};
use oauth_storage_core::db::capabilities::{
    AccessTokenStorage, AuthorizationCodeStorage, ClientStorage, PublicKeyStorage,
    RefreshTokenStorage, ScopeStorage, UserCredentialsStorage,
};
use oauth_storage_core::db::models::{Client, ScopeType, User};
use oauth_storage_core::error::StorageError;
use oauth_storage_memory::MemoryAdapter;
use oauth_storage_mongodb::DocumentStorage;
use oauth_storage_test_utils::conformance::{access_token, authorization_code, refresh_token};
use oauth_storage_test_utils::run_conformance;

fn setup() -> DocumentStorage<MemoryAdapter> {
    DocumentStorage::new(MemoryAdapter::new())
}

#[tokio::test]
async fn test_conformance_suite() {
    let storage = setup();
    let stats = run_conformance(&storage, "document")
        .await
        .expect("conformance suite failed");
    assert_eq!(stats.test_count, 11);
}

// ─── Upserts ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_repeated_set_keeps_one_document() {
    let storage = setup();
    storage
        .set_client_details(&Client::new("c1").with_secret("a"))
        .await
        .unwrap();
    storage
        .set_client_details(&Client::new("c1").with_secret("b"))
        .await
        .unwrap();

    assert_eq!(storage.adapter().collection_len("oauth_apps").await, 1);
    let client = storage.get_client_details("c1").await.unwrap().unwrap();
    assert_eq!(client.app_secret.as_deref(), Some("b"));
}

#[tokio::test]
async fn test_update_keeps_fields_outside_the_entity() {
    let storage = setup();
    storage
        .set_user(&User {
            username: "alice".into(),
            password: "one".into(),
            first_name: None,
            last_name: None,
        })
        .await
        .unwrap();

    // A field written by hand through the adapter.
    storage
        .adapter()
        .update_one(
            "oauth_users",
            &[WhereClause::eq("username", "alice")],
            serde_json::json!({"email": "alice@example.com"}),
        )
        .await
        .unwrap();

    storage
        .set_user(&User {
            username: "alice".into(),
            password: "two".into(),
            first_name: Some("Alice".into()),
            last_name: None,
        })
        .await
        .unwrap();

    let raw = storage
        .adapter()
        .find_one("oauth_users", &[WhereClause::eq("username", "alice")])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw["password"], "two");
    assert_eq!(raw["email"], "alice@example.com");
}

#[tokio::test]
async fn test_refresh_tokens_are_inserted_fresh() {
    let storage = setup();
    storage
        .set_refresh_token(&refresh_token("r1", "c1"))
        .await
        .unwrap();
    storage
        .set_refresh_token(&refresh_token("r1", "c2"))
        .await
        .unwrap();
    assert_eq!(
        storage.adapter().collection_len("oauth_refresh_tokens").await,
        2
    );

    // Both copies go on revoke.
    assert!(storage.unset_refresh_token("r1").await.unwrap());
    assert!(storage.get_refresh_token("r1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_token_reuse_rejected_with_indexes() {
    let storage = setup();
    storage.ensure_indexes().await.unwrap();
    storage
        .set_refresh_token(&refresh_token("r1", "c1"))
        .await
        .unwrap();

    let err = storage
        .set_refresh_token(&refresh_token("r1", "c1"))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Backend(ref msg) if msg.contains("duplicate key")));
}

#[tokio::test]
async fn test_indexes_do_not_break_upserts() {
    let storage = setup();
    storage.ensure_indexes().await.unwrap();
    storage
        .set_keys(None, "pub1", "priv1", None)
        .await
        .unwrap();
    storage
        .set_keys(None, "pub2", "priv2", Some("RS512"))
        .await
        .unwrap();
    storage
        .set_scope("a b", None, ScopeType::Supported)
        .await
        .unwrap();
    storage
        .set_scope("a b c", None, ScopeType::Supported)
        .await
        .unwrap();

    assert_eq!(
        storage.get_public_key(None).await.unwrap().as_deref(),
        Some("pub2")
    );
    assert!(storage.scope_exists("c").await.unwrap());
    assert_eq!(storage.adapter().collection_len("oauth_keys").await, 1);
    assert_eq!(storage.adapter().collection_len("oauth_scopes").await, 1);
}

// ─── Configuration ───────────────────────────────────────────────

#[tokio::test]
async fn test_custom_collection_names() {
    let config = DocumentConfig::from_value(serde_json::json!({
        "access_token_table": "tokens",
        "unrelated": true,
    }))
    .unwrap();
    let storage = DocumentStorage::with_config(MemoryAdapter::new(), config);

    storage
        .set_access_token(&access_token("t1", "c1"))
        .await
        .unwrap();

    assert_eq!(storage.config().table(Entity::AccessToken), "tokens");
    assert_eq!(storage.adapter().collection_len("tokens").await, 1);
    assert_eq!(storage.adapter().collection_len("oauth_access_tokens").await, 0);
}

// ─── Expiry ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_records_do_not_expire_on_their_own() {
    let storage = setup();
    let mut stale = access_token("old", "c1");
    stale.expires = 1;
    storage.set_access_token(&stale).await.unwrap();

    assert_eq!(storage.get_access_token("old").await.unwrap(), Some(stale));
}

#[tokio::test]
async fn test_prune_expired() {
    let storage = setup();
    let mut stale_access = access_token("old-access", "c1");
    stale_access.expires = 100;
    let mut stale_code = authorization_code("old-code", "c1");
    stale_code.expires = 100;

    storage.set_access_token(&stale_access).await.unwrap();
    storage
        .set_access_token(&access_token("fresh", "c1"))
        .await
        .unwrap();
    storage.set_authorization_code(&stale_code).await.unwrap();

    let removed = storage.prune_expired(200).await.unwrap();
    assert_eq!(removed, 2);
    assert!(storage.get_access_token("old-access").await.unwrap().is_none());
    assert!(storage.get_access_token("fresh").await.unwrap().is_some());
}

// ─── Failures ────────────────────────────────────────────────────

#[tokio::test]
async fn test_outage_is_not_reported_as_missing() {
    let storage = setup();
    storage
        .set_client_details(&Client::new("c1"))
        .await
        .unwrap();

    storage.adapter().set_unavailable(true);
    let err = storage.get_client_details("c1").await.unwrap_err();
    assert!(matches!(err, StorageError::Backend(_)));

    let err = storage
        .check_restricted_grant_type("c1", "implicit")
        .await
        .unwrap_err();
    assert!(err.is_transient());
}
