// Document-store backend: every storage capability over named collections.
//
// Reads are a single natural-key query; a missing document is `None`, never
// an error. Writes look the natural key up first and then either `$set` the
// fields on the existing document or insert a new one, so repeated sets never
// duplicate a record. Deletes report whether anything was actually removed.
// Nothing here expires on its own: use `prune_expired` to drop stale tokens.

use async_trait::async_trait;
use mongodb::bson::Document;
use mongodb::{Collection, Database};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use oauth_storage_core::config::{ConnectionOptions, DocumentConfig, Entity};
use oauth_storage_core::db::adapter::{Adapter, WhereClause};
use oauth_storage_core::db::capabilities::{
    AccessTokenStorage, AuthorizationCodeStorage, ClientCredentialsStorage, ClientStorage,
    JtiStorage, JwtBearerStorage, PublicKeyStorage, RefreshTokenStorage, ScopeStorage,
    UserCredentialsStorage,
};
use oauth_storage_core::db::models::{
    scope_is_subset, AccessToken, AuthorizationCode, Client, ClientKey, ClientKeyLookup, Jti,
    RefreshToken, ScopeType, SigningKey, User, DEFAULT_ENCRYPTION_ALGORITHM,
};
use oauth_storage_core::error::{StorageError, StorageResult};

use crate::adapter::MongoAdapter;

const BACKEND: &str = "mongodb";

/// Document-store backend over any [`Adapter`].
#[derive(Debug, Clone)]
pub struct DocumentStorage<A: Adapter> {
    adapter: A,
    config: DocumentConfig,
}

/// The document backend on a live MongoDB database.
pub type MongoStorage = DocumentStorage<MongoAdapter>;

/// Stored shape of a scope entry. `app_id == None` is the global entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScopeRecord {
    #[serde(rename = "type")]
    scope_type: ScopeType,
    #[serde(default)]
    app_id: Option<String>,
    scope: String,
}

impl<A: Adapter> DocumentStorage<A> {
    /// Create a backend with the default collection names.
    pub fn new(adapter: A) -> Self {
        Self::with_config(adapter, DocumentConfig::default())
    }

    pub fn with_config(adapter: A, config: DocumentConfig) -> Self {
        Self { adapter, config }
    }

    /// The underlying adapter, for operations outside the storage contract.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    fn table(&self, entity: Entity) -> &str {
        self.config.table(entity)
    }

    async fn find<T: DeserializeOwned + Send>(
        &self,
        entity: Entity,
        clauses: &[WhereClause],
    ) -> StorageResult<Option<T>> {
        let table = self.table(entity);
        tracing::debug!(collection = table, "find_one");
        match self.adapter.find_one(table, clauses).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// Lookup-then-branch write keyed on `clauses`.
    async fn upsert<T: Serialize + Sync>(
        &self,
        entity: Entity,
        clauses: &[WhereClause],
        record: &T,
    ) -> StorageResult<()> {
        let table = self.table(entity);
        let data = serde_json::to_value(record)?;

        if self.adapter.find_one(table, clauses).await?.is_some() {
            let mut fields = data.clone();
            if let Some(obj) = fields.as_object_mut() {
                for clause in clauses {
                    obj.remove(&clause.field);
                }
            }
            let matched = self.adapter.update_one(table, clauses, fields).await?;
            if matched > 0 {
                tracing::debug!(collection = table, "updated existing document");
                return Ok(());
            }
            // Removed between lookup and update: fall through and insert.
        }

        tracing::debug!(collection = table, "inserted new document");
        self.adapter.insert_one(table, data).await
    }

    async fn insert<T: Serialize + Sync>(&self, entity: Entity, record: &T) -> StorageResult<()> {
        let table = self.table(entity);
        tracing::debug!(collection = table, "insert_one");
        self.adapter
            .insert_one(table, serde_json::to_value(record)?)
            .await
    }

    async fn remove(&self, entity: Entity, clauses: &[WhereClause]) -> StorageResult<bool> {
        let table = self.table(entity);
        let deleted = self.adapter.delete_many(table, clauses).await?;
        tracing::debug!(collection = table, deleted, "delete_many");
        Ok(deleted > 0)
    }

    /// Per-client signing key, else the global one.
    async fn find_signing_key(&self, app_id: Option<&str>) -> StorageResult<Option<SigningKey>> {
        if let Some(app_id) = app_id {
            let key = self
                .find(Entity::SigningKey, &[WhereClause::eq("app_id", app_id)])
                .await?;
            if key.is_some() {
                return Ok(key);
            }
        }
        self.find(Entity::SigningKey, &[WhereClause::eq_opt("app_id", None)])
            .await
    }

    async fn find_scope(
        &self,
        scope_type: ScopeType,
        app_id: Option<&str>,
    ) -> StorageResult<Option<String>> {
        let record: Option<ScopeRecord> = self
            .find(Entity::Scope, &scope_clauses(scope_type, app_id))
            .await?;
        Ok(record.map(|r| r.scope))
    }

    /// Create unique indexes on every natural key.
    pub async fn ensure_indexes(&self) -> StorageResult<()> {
        let indexes: [(Entity, &[&str]); 8] = [
            (Entity::Client, &["app_id"]),
            (Entity::AccessToken, &["access_token"]),
            (Entity::RefreshToken, &["refresh_token"]),
            (Entity::AuthorizationCode, &["authorization_code"]),
            (Entity::User, &["username"]),
            (Entity::SigningKey, &["app_id"]),
            (Entity::ClientKey, &["app_id", "subject"]),
            (Entity::Scope, &["type", "app_id"]),
        ];
        for (entity, fields) in indexes {
            self.adapter
                .ensure_unique_index(self.table(entity), fields)
                .await?;
        }
        tracing::info!("document storage indexes ensured");
        Ok(())
    }

    /// Delete tokens and codes whose `expires` is before `now`.
    /// Returns how many records were removed.
    pub async fn prune_expired(&self, now: i64) -> StorageResult<u64> {
        let mut total = 0;
        for entity in [
            Entity::AccessToken,
            Entity::RefreshToken,
            Entity::AuthorizationCode,
        ] {
            total += self
                .adapter
                .delete_many(self.table(entity), &[WhereClause::lt("expires", now)])
                .await?;
        }
        tracing::info!(removed = total, "pruned expired records");
        Ok(total)
    }
}

fn scope_clauses(scope_type: ScopeType, app_id: Option<&str>) -> [WhereClause; 2] {
    [
        WhereClause::eq("type", scope_type.as_str()),
        WhereClause::eq_opt("app_id", app_id),
    ]
}

impl DocumentStorage<MongoAdapter> {
    /// Wrap an already-connected database.
    pub fn from_database(db: Database, config: DocumentConfig) -> Self {
        Self::with_config(MongoAdapter::new(db), config)
    }

    /// Connect from a host/port/database descriptor.
    pub async fn connect(options: &ConnectionOptions, config: DocumentConfig) -> StorageResult<Self> {
        Ok(Self::with_config(
            MongoAdapter::connect_with(options).await?,
            config,
        ))
    }

    /// Connect from an untyped descriptor such as a config file section.
    /// Anything but a mapping is an invalid argument.
    pub async fn connect_value(
        descriptor: serde_json::Value,
        config: DocumentConfig,
    ) -> StorageResult<Self> {
        let options = ConnectionOptions::from_value(descriptor, &default_connection())?;
        Self::connect(&options, config).await
    }

    /// Raw collection handle for an entity family.
    pub fn collection(&self, entity: Entity) -> Collection<Document> {
        self.adapter.collection(self.table(entity))
    }
}

/// Connection defaults for a local MongoDB.
pub fn default_connection() -> ConnectionOptions {
    ConnectionOptions::new("localhost", 27017, "oauth2")
}

// ─── Clients ─────────────────────────────────────────────────────

#[async_trait]
impl<A: Adapter> ClientCredentialsStorage for DocumentStorage<A> {
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
impl<A: Adapter> ClientStorage for DocumentStorage<A> {
    async fn get_client_details(&self, app_id: &str) -> StorageResult<Option<Client>> {
        self.find(Entity::Client, &[WhereClause::eq("app_id", app_id)])
            .await
    }

    async fn set_client_details(&self, client: &Client) -> StorageResult<()> {
        self.upsert(
            Entity::Client,
            &[WhereClause::eq("app_id", client.app_id.as_str())],
            client,
        )
        .await
    }
}

// ─── Tokens and codes ────────────────────────────────────────────

#[async_trait]
impl<A: Adapter> AccessTokenStorage for DocumentStorage<A> {
    async fn get_access_token(&self, access_token: &str) -> StorageResult<Option<AccessToken>> {
        self.find(
            Entity::AccessToken,
            &[WhereClause::eq("access_token", access_token)],
        )
        .await
    }

    async fn set_access_token(&self, token: &AccessToken) -> StorageResult<()> {
        self.upsert(
            Entity::AccessToken,
            &[WhereClause::eq("access_token", token.access_token.as_str())],
            token,
        )
        .await
    }

    async fn unset_access_token(&self, access_token: &str) -> StorageResult<bool> {
        self.remove(
            Entity::AccessToken,
            &[WhereClause::eq("access_token", access_token)],
        )
        .await
    }
}

#[async_trait]
impl<A: Adapter> RefreshTokenStorage for DocumentStorage<A> {
    async fn get_refresh_token(&self, refresh_token: &str) -> StorageResult<Option<RefreshToken>> {
        self.find(
            Entity::RefreshToken,
            &[WhereClause::eq("refresh_token", refresh_token)],
        )
        .await
    }

    async fn set_refresh_token(&self, token: &RefreshToken) -> StorageResult<()> {
        self.insert(Entity::RefreshToken, token).await
    }

    async fn unset_refresh_token(&self, refresh_token: &str) -> StorageResult<bool> {
        self.remove(
            Entity::RefreshToken,
            &[WhereClause::eq("refresh_token", refresh_token)],
        )
        .await
    }
}

#[async_trait]
impl<A: Adapter> AuthorizationCodeStorage for DocumentStorage<A> {
    async fn get_authorization_code(&self, code: &str) -> StorageResult<Option<AuthorizationCode>> {
        self.find(
            Entity::AuthorizationCode,
            &[WhereClause::eq("authorization_code", code)],
        )
        .await
    }

    async fn set_authorization_code(&self, code: &AuthorizationCode) -> StorageResult<()> {
        self.upsert(
            Entity::AuthorizationCode,
            &[WhereClause::eq(
                "authorization_code",
                code.authorization_code.as_str(),
            )],
            code,
        )
        .await
    }

    async fn expire_authorization_code(&self, code: &str) -> StorageResult<bool> {
        self.remove(
            Entity::AuthorizationCode,
            &[WhereClause::eq("authorization_code", code)],
        )
        .await
    }
}

// ─── Users ───────────────────────────────────────────────────────

#[async_trait]
impl<A: Adapter> UserCredentialsStorage for DocumentStorage<A> {
    async fn get_user(&self, username: &str) -> StorageResult<Option<User>> {
        self.find(Entity::User, &[WhereClause::eq("username", username)])
            .await
    }

    async fn set_user(&self, user: &User) -> StorageResult<()> {
        self.upsert(
            Entity::User,
            &[WhereClause::eq("username", user.username.as_str())],
            user,
        )
        .await
    }
}

// ─── Keys ────────────────────────────────────────────────────────

#[async_trait]
impl<A: Adapter> PublicKeyStorage for DocumentStorage<A> {
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
        self.upsert(
            Entity::SigningKey,
            &[WhereClause::eq_opt("app_id", app_id)],
            &record,
        )
        .await
    }
}

#[async_trait]
impl<A: Adapter> JwtBearerStorage for DocumentStorage<A> {
    async fn get_client_key(&self, app_id: &str, subject: &str) -> StorageResult<ClientKeyLookup> {
        let exact: Option<ClientKey> = self
            .find(
                Entity::ClientKey,
                &[
                    WhereClause::eq("app_id", app_id),
                    WhereClause::eq("subject", subject),
                ],
            )
            .await?;
        if let Some(record) = exact {
            return Ok(ClientKeyLookup::Key(record.key));
        }

        let any: Option<ClientKey> = self
            .find(Entity::ClientKey, &[WhereClause::eq("app_id", app_id)])
            .await?;
        Ok(match any {
            Some(_) => ClientKeyLookup::SubjectMismatch,
            None => ClientKeyLookup::NotFound,
        })
    }

    async fn set_client_key(
        &self,
        app_id: &str,
        key: &str,
        subject: Option<&str>,
    ) -> StorageResult<()> {
        let record = ClientKey {
            app_id: Some(app_id.to_string()),
            subject: subject.map(str::to_string),
            key: key.to_string(),
        };
        self.upsert(
            Entity::ClientKey,
            &[
                WhereClause::eq("app_id", app_id),
                WhereClause::eq_opt("subject", subject),
            ],
            &record,
        )
        .await
    }
}

// ─── Scopes ──────────────────────────────────────────────────────

#[async_trait]
impl<A: Adapter> ScopeStorage for DocumentStorage<A> {
    async fn scope_exists(&self, scope: &str) -> StorageResult<bool> {
        let supported = self
            .find_scope(ScopeType::Supported, None)
            .await?
            .unwrap_or_default();
        Ok(scope_is_subset(scope, &supported))
    }

    async fn get_default_scope(&self, app_id: Option<&str>) -> StorageResult<Option<String>> {
        if let Some(app_id) = app_id {
            let scope = self.find_scope(ScopeType::Default, Some(app_id)).await?;
            if scope.as_deref().is_some_and(|s| !s.is_empty()) {
                return Ok(scope);
            }
        }
        self.find_scope(ScopeType::Default, None).await
    }

    async fn set_scope(
        &self,
        scope: &str,
        app_id: Option<&str>,
        scope_type: ScopeType,
    ) -> StorageResult<()> {
        let record = ScopeRecord {
            scope_type,
            app_id: app_id.map(str::to_string),
            scope: scope.to_string(),
        };
        self.upsert(Entity::Scope, &scope_clauses(scope_type, app_id), &record)
            .await
    }
}

// ─── Replay protection ───────────────────────────────────────────

#[async_trait]
impl<A: Adapter> JtiStorage for DocumentStorage<A> {
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
