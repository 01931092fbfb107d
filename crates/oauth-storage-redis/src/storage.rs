// Key-value backend: every storage capability over flat, prefixed keys.
//
// Each record is one JSON string under `prefix + natural key`. Writes replace
// the whole value. Tokens and codes are written with SETEX using the seconds
// left until their `expires`, so the store drops them on its own.
//
// The instance cache holds what this instance wrote and is consulted before
// the remote store. Remote reads never fill it. It belongs to one
// `RedisStorage` and is never shared.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use oauth_storage_core::config::{ConnectionOptions, Entity, KeyValueConfig};
use oauth_storage_core::db::capabilities::{
    AccessTokenStorage, AuthorizationCodeStorage, ClientCredentialsStorage, ClientStorage,
    JtiStorage, JwtBearerStorage, PublicKeyStorage, RefreshTokenStorage, ScopeStorage,
    UserCredentialsStorage,
};
use oauth_storage_core::db::models::{
    now, scope_is_subset, AccessToken, AuthorizationCode, Client, ClientKeyLookup, Jti,
    RefreshToken, ScopeType, SigningKey, User, DEFAULT_ENCRYPTION_ALGORITHM,
};
use oauth_storage_core::error::{StorageError, StorageResult};

use crate::connection::{KeyValueConnection, RedisConnection};

const BACKEND: &str = "redis";

/// Natural-key suffix of records that apply to every client.
const GLOBAL: &str = "global";

/// JWT-bearer key record, one per client.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JwtRecord {
    key: String,
    #[serde(default)]
    subject: Option<String>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    raw: String,
    expires: Option<i64>,
}

impl CacheEntry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires.is_some_and(|exp| exp <= now)
    }
}

/// Key-value backend over any [`KeyValueConnection`].
#[derive(Debug)]
pub struct RedisStorage<C: KeyValueConnection> {
    conn: C,
    config: KeyValueConfig,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl<C: KeyValueConnection> RedisStorage<C> {
    /// Create a backend with the default key prefixes.
    pub fn new(conn: C) -> Self {
        Self::with_config(conn, KeyValueConfig::default())
    }

    pub fn with_config(conn: C, config: KeyValueConfig) -> Self {
        Self {
            conn,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn config(&self) -> &KeyValueConfig {
        &self.config
    }

    /// Keys currently held in this instance's cache, sorted.
    pub async fn cached_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cache.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Drop everything from this instance's cache. The remote store is untouched.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    fn key(&self, entity: Entity, natural_key: &str) -> String {
        self.config.key(entity, natural_key)
    }

    fn scope_key(&self, scope_type: ScopeType, app_id: Option<&str>) -> String {
        self.key(
            Entity::Scope,
            &format!("{scope_type}:{}", app_id.unwrap_or(GLOBAL)),
        )
    }

    async fn cached(&self, key: &str) -> Option<String> {
        let now = now();
        {
            let cache = self.cache.read().await;
            match cache.get(key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.raw.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired locally: the remote key is gone too.
        self.cache.write().await.remove(key);
        None
    }

    async fn get_value<T: DeserializeOwned + Send>(&self, key: &str) -> StorageResult<Option<T>> {
        let raw = match self.cached(key).await {
            Some(raw) => {
                tracing::debug!(key, "cache hit");
                Some(raw)
            }
            None => {
                tracing::debug!(key, "GET");
                self.conn.get(key).await?
            }
        };
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Cache then write through; a failed remote write drops the cache entry.
    /// With `expires`, the remote key gets the seconds remaining as its TTL;
    /// an expiry not in the future is rejected before anything is written.
    async fn set_value<T: Serialize + Sync>(
        &self,
        key: String,
        value: &T,
        expires: Option<i64>,
    ) -> StorageResult<()> {
        let ttl = match expires {
            Some(expires) => Some(remaining_ttl(&key, expires, now())?),
            None => None,
        };
        let raw = serde_json::to_string(value)?;

        self.cache.write().await.insert(
            key.clone(),
            CacheEntry {
                raw: raw.clone(),
                expires,
            },
        );

        let written = match ttl {
            Some(ttl) => {
                tracing::debug!(key = %key, ttl, "SETEX");
                self.conn.set_ex(&key, &raw, ttl).await
            }
            None => {
                tracing::debug!(key = %key, "SET");
                self.conn.set(&key, &raw).await
            }
        };
        if written.is_err() {
            // The remote never took the value, so the cache must not serve it.
            self.cache.write().await.remove(&key);
        }
        written
    }

    /// `true` only if the remote store actually held the key.
    async fn expire_value(&self, key: &str) -> StorageResult<bool> {
        self.cache.write().await.remove(key);
        tracing::debug!(key, "DEL");
        self.conn.del(key).await
    }

    /// Per-client signing key, else the global one.
    async fn find_signing_key(&self, app_id: Option<&str>) -> StorageResult<Option<SigningKey>> {
        if let Some(app_id) = app_id {
            let key = self
                .get_value(&self.key(Entity::SigningKey, app_id))
                .await?;
            if key.is_some() {
                return Ok(key);
            }
        }
        self.get_value(&self.key(Entity::SigningKey, GLOBAL)).await
    }
}

fn remaining_ttl(key: &str, expires: i64, now: i64) -> StorageResult<u64> {
    match u64::try_from(expires - now) {
        Ok(ttl) if ttl > 0 => Ok(ttl),
        _ => {
            tracing::warn!(key, expires, now, "rejected write with an expiry in the past");
            Err(StorageError::invalid_argument(format!(
                "expiry {expires} for {key} is not in the future"
            )))
        }
    }
}

impl RedisStorage<RedisConnection> {
    /// Connect from a host/port/database descriptor.
    pub async fn connect(options: &ConnectionOptions, config: KeyValueConfig) -> StorageResult<Self> {
        Ok(Self::with_config(
            RedisConnection::connect(options).await?,
            config,
        ))
    }

    /// Connect from an untyped descriptor such as a config file section.
    /// Anything but a mapping is an invalid argument.
    pub async fn connect_value(
        descriptor: serde_json::Value,
        config: KeyValueConfig,
    ) -> StorageResult<Self> {
        let options = ConnectionOptions::from_value(descriptor, &default_connection())?;
        Self::connect(&options, config).await
    }
}

/// Connection defaults for a local Redis.
pub fn default_connection() -> ConnectionOptions {
    ConnectionOptions::new("localhost", 6379, "0")
}

// ─── Clients ─────────────────────────────────────────────────────

#[async_trait]
impl<C: KeyValueConnection> ClientCredentialsStorage for RedisStorage<C> {
    async fn check_client_credentials(
        &self,
        app_id: &str,
        app_secret: Option<&str>,
    ) -> StorageResult<bool> {
        Ok(self
            .get_client_details(app_id)
            .await?
            .is_some_and(|client| client.secret_matches(app_secret)))
    }

    async fn is_public_client(&self, app_id: &str) -> StorageResult<bool> {
        Ok(self
            .get_client_details(app_id)
            .await?
            .is_some_and(|client| client.is_public()))
    }
}

#[async_trait]
impl<C: KeyValueConnection> ClientStorage for RedisStorage<C> {
    async fn get_client_details(&self, app_id: &str) -> StorageResult<Option<Client>> {
        self.get_value(&self.key(Entity::Client, app_id)).await
    }

    async fn set_client_details(&self, client: &Client) -> StorageResult<()> {
        self.set_value(self.key(Entity::Client, &client.app_id), client, None)
            .await
    }
}

// ─── Tokens and codes ────────────────────────────────────────────

#[async_trait]
impl<C: KeyValueConnection> AccessTokenStorage for RedisStorage<C> {
    async fn get_access_token(&self, access_token: &str) -> StorageResult<Option<AccessToken>> {
        self.get_value(&self.key(Entity::AccessToken, access_token))
            .await
    }

    async fn set_access_token(&self, token: &AccessToken) -> StorageResult<()> {
        self.set_value(
            self.key(Entity::AccessToken, &token.access_token),
            token,
            Some(token.expires),
        )
        .await
    }

    async fn unset_access_token(&self, access_token: &str) -> StorageResult<bool> {
        self.expire_value(&self.key(Entity::AccessToken, access_token))
            .await
    }
}

#[async_trait]
impl<C: KeyValueConnection> RefreshTokenStorage for RedisStorage<C> {
    async fn get_refresh_token(&self, refresh_token: &str) -> StorageResult<Option<RefreshToken>> {
        self.get_value(&self.key(Entity::RefreshToken, refresh_token))
            .await
    }

    async fn set_refresh_token(&self, token: &RefreshToken) -> StorageResult<()> {
        self.set_value(
            self.key(Entity::RefreshToken, &token.refresh_token),
            token,
            Some(token.expires),
        )
        .await
    }

    async fn unset_refresh_token(&self, refresh_token: &str) -> StorageResult<bool> {
        self.expire_value(&self.key(Entity::RefreshToken, refresh_token))
            .await
    }
}

#[async_trait]
impl<C: KeyValueConnection> AuthorizationCodeStorage for RedisStorage<C> {
    async fn get_authorization_code(&self, code: &str) -> StorageResult<Option<AuthorizationCode>> {
        self.get_value(&self.key(Entity::AuthorizationCode, code))
            .await
    }

    async fn set_authorization_code(&self, code: &AuthorizationCode) -> StorageResult<()> {
        self.set_value(
            self.key(Entity::AuthorizationCode, &code.authorization_code),
            code,
            Some(code.expires),
        )
        .await
    }

    async fn expire_authorization_code(&self, code: &str) -> StorageResult<bool> {
        self.expire_value(&self.key(Entity::AuthorizationCode, code))
            .await
    }
}

// ─── Users ───────────────────────────────────────────────────────

#[async_trait]
impl<C: KeyValueConnection> UserCredentialsStorage for RedisStorage<C> {
    async fn get_user(&self, username: &str) -> StorageResult<Option<User>> {
        self.get_value(&self.key(Entity::User, username)).await
    }

    async fn set_user(&self, user: &User) -> StorageResult<()> {
        self.set_value(self.key(Entity::User, &user.username), user, None)
            .await
    }
}

// ─── Keys ────────────────────────────────────────────────────────

#[async_trait]
impl<C: KeyValueConnection> PublicKeyStorage for RedisStorage<C> {
    async fn get_public_key(&self, app_id: Option<&str>) -> StorageResult<Option<String>> {
        Ok(self.find_signing_key(app_id).await?.map(|k| k.public_key))
    }

    async fn get_private_key(&self, app_id: Option<&str>) -> StorageResult<Option<String>> {
        Ok(self.find_signing_key(app_id).await?.map(|k| k.private_key))
    }

    async fn get_encryption_algorithm(&self, app_id: Option<&str>) -> StorageResult<String> {
        Ok(self
            .find_signing_key(app_id)
            .await?
            .map_or_else(|| DEFAULT_ENCRYPTION_ALGORITHM.to_string(), |k| {
                k.algorithm().to_string()
            }))
    }

    async fn set_keys(
        &self,
        app_id: Option<&str>,
        public_key: &str,
        private_key: &str,
        encryption_algorithm: Option<&str>,
    ) -> StorageResult<()> {
        let record = SigningKey {
            app_id: app_id.map(str::to_string),
            public_key: public_key.to_string(),
            private_key: private_key.to_string(),
            encryption_algorithm: encryption_algorithm.map(str::to_string),
        };
        self.set_value(
            self.key(Entity::SigningKey, app_id.unwrap_or(GLOBAL)),
            &record,
            None,
        )
        .await
    }
}

#[async_trait]
impl<C: KeyValueConnection> JwtBearerStorage for RedisStorage<C> {
    async fn get_client_key(&self, app_id: &str, subject: &str) -> StorageResult<ClientKeyLookup> {
        let record: Option<JwtRecord> = self.get_value(&self.key(Entity::ClientKey, app_id)).await?;
        Ok(match record {
            None => ClientKeyLookup::NotFound,
            Some(record) if record.subject.as_deref() == Some(subject) => {
                ClientKeyLookup::Key(record.key)
            }
            Some(_) => ClientKeyLookup::SubjectMismatch,
        })
    }

    async fn set_client_key(
        &self,
        app_id: &str,
        key: &str,
        subject: Option<&str>,
    ) -> StorageResult<()> {
        let record = JwtRecord {
            key: key.to_string(),
            subject: subject.map(str::to_string),
        };
        self.set_value(self.key(Entity::ClientKey, app_id), &record, None)
            .await
    }
}

// ─── Scopes ──────────────────────────────────────────────────────

#[async_trait]
impl<C: KeyValueConnection> ScopeStorage for RedisStorage<C> {
    async fn scope_exists(&self, scope: &str) -> StorageResult<bool> {
        let supported: String = self
            .get_value(&self.scope_key(ScopeType::Supported, None))
            .await?
            .unwrap_or_default();
        Ok(scope_is_subset(scope, &supported))
    }

    async fn get_default_scope(&self, app_id: Option<&str>) -> StorageResult<Option<String>> {
        if let Some(app_id) = app_id {
            let scope: Option<String> = self
                .get_value(&self.scope_key(ScopeType::Default, Some(app_id)))
                .await?;
            if scope.as_deref().is_some_and(|s| !s.is_empty()) {
                return Ok(scope);
            }
        }
        self.get_value(&self.scope_key(ScopeType::Default, None))
            .await
    }

    async fn set_scope(
        &self,
        scope: &str,
        app_id: Option<&str>,
        scope_type: ScopeType,
    ) -> StorageResult<()> {
        self.set_value(self.scope_key(scope_type, app_id), &scope, None)
            .await
    }
}

// ─── Replay protection ───────────────────────────────────────────

#[async_trait]
impl<C: KeyValueConnection> JtiStorage for RedisStorage<C> {
    async fn get_jti(
        &self,
        _app_id: &str,
        _subject: &str,
        _audience: &str,
        _expiration: i64,
        _jti: &str,
    ) -> StorageResult<Option<Jti>> {
        tracing::warn!("get_jti called on a backend without replay protection");
        Err(StorageError::unimplemented("get_jti", BACKEND))
    }

    async fn set_jti(&self, _jti: &Jti) -> StorageResult<()> {
        tracing::warn!("set_jti called on a backend without replay protection");
        Err(StorageError::unimplemented("set_jti", BACKEND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::InMemoryConnection;

    #[test]
    fn test_remaining_ttl() {
        assert_eq!(remaining_ttl("k", 1_100, 1_000).unwrap(), 100);
        assert!(matches!(
            remaining_ttl("k", 1_000, 1_000),
            Err(StorageError::InvalidArgument(_))
        ));
        assert!(remaining_ttl("k", 900, 1_000).is_err());
    }

    #[test]
    fn test_scope_keys() {
        let storage = RedisStorage::new(InMemoryConnection::new());
        assert_eq!(
            storage.scope_key(ScopeType::Supported, None),
            "oauth_scopes:supported:global"
        );
        assert_eq!(
            storage.scope_key(ScopeType::Default, Some("c1")),
            "oauth_scopes:default:c1"
        );
    }

    #[test]
    fn test_jwt_record_shape() {
        let record = JwtRecord {
            key: "pem".into(),
            subject: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"key": "pem", "subject": null}));
    }

    #[test]
    fn test_default_connection() {
        let options = default_connection();
        assert_eq!(options.port, 6379);
        assert_eq!(options.database, "0");
    }

    #[tokio::test]
    async fn test_expired_cache_entry_is_dropped() {
        let storage = RedisStorage::new(InMemoryConnection::new());
        storage.cache.write().await.insert(
            "stale".into(),
            CacheEntry {
                raw: "\"x\"".into(),
                expires: Some(1),
            },
        );
        assert!(storage.get_value::<String>("stale").await.unwrap().is_none());
        assert!(storage.cached_keys().await.is_empty());
    }
}
