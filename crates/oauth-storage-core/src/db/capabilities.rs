// Storage capability traits.
//
// One trait per entity family. A backend implements whichever subset it
// supports and grant logic depends only on the trait it needs. Missing records
// come back as `None` / `false`; `Err` is reserved for real failures.

use async_trait::async_trait;

use crate::db::models::{
    AccessToken, AuthorizationCode, Client, ClientKeyLookup, Jti, RefreshToken, ScopeType, User,
    UserDetails,
};
use crate::error::StorageResult;

/// Client authentication.
#[async_trait]
pub trait ClientCredentialsStorage: Send + Sync {
    /// `false` when the client is unknown or the secret does not match.
    async fn check_client_credentials(
        &self,
        app_id: &str,
        app_secret: Option<&str>,
    ) -> StorageResult<bool>;

    /// `false` when the client is unknown.
    async fn is_public_client(&self, app_id: &str) -> StorageResult<bool>;
}

/// Client registration records.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    async fn get_client_details(&self, app_id: &str) -> StorageResult<Option<Client>>;

    /// Upsert keyed on `client.app_id`.
    async fn set_client_details(&self, client: &Client) -> StorageResult<()>;

    /// `true` when the client has no grant type list or the list contains
    /// `grant_type`. An unknown client is unrestricted.
    async fn check_restricted_grant_type(
        &self,
        app_id: &str,
        grant_type: &str,
    ) -> StorageResult<bool> {
        Ok(self
            .get_client_details(app_id)
            .await?
            .map_or(true, |client| client.allows_grant_type(grant_type)))
    }

    /// The client's registered scope, `None` if the client or its scope is missing.
    async fn get_client_scope(&self, app_id: &str) -> StorageResult<Option<String>> {
        Ok(self
            .get_client_details(app_id)
            .await?
            .and_then(|client| client.scope))
    }
}

#[async_trait]
pub trait AccessTokenStorage: Send + Sync {
    async fn get_access_token(&self, access_token: &str) -> StorageResult<Option<AccessToken>>;

    /// Overwrites an existing record with the same token value.
    async fn set_access_token(&self, token: &AccessToken) -> StorageResult<()>;

    /// `true` iff a record existed and was removed.
    async fn unset_access_token(&self, access_token: &str) -> StorageResult<bool>;
}

#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    async fn get_refresh_token(&self, refresh_token: &str)
        -> StorageResult<Option<RefreshToken>>;

    /// Always writes a fresh record. Reusing a refresh token value is a caller error.
    async fn set_refresh_token(&self, token: &RefreshToken) -> StorageResult<()>;

    /// `true` iff a record existed and was removed.
    async fn unset_refresh_token(&self, refresh_token: &str) -> StorageResult<bool>;
}

#[async_trait]
pub trait AuthorizationCodeStorage: Send + Sync {
    async fn get_authorization_code(&self, code: &str)
        -> StorageResult<Option<AuthorizationCode>>;

    async fn set_authorization_code(&self, code: &AuthorizationCode) -> StorageResult<()>;

    /// Erase a code after it has been exchanged. `true` iff a record was removed.
    async fn expire_authorization_code(&self, code: &str) -> StorageResult<bool>;
}

/// Resource owner password credentials.
#[async_trait]
pub trait UserCredentialsStorage: Send + Sync {
    async fn check_user_credentials(&self, username: &str, password: &str)
        -> StorageResult<bool> {
        Ok(self
            .get_user(username)
            .await?
            .is_some_and(|user| user.password == password))
    }

    /// The user with `user_id` set to the username.
    async fn get_user_details(&self, username: &str) -> StorageResult<Option<UserDetails>> {
        Ok(self.get_user(username).await?.map(UserDetails::from))
    }

    async fn get_user(&self, username: &str) -> StorageResult<Option<User>>;

    /// Upsert keyed on `user.username`.
    async fn set_user(&self, user: &User) -> StorageResult<()>;
}

/// Server signing keys. A lookup for a client without its own record falls
/// back to the global record (`app_id == None`).
#[async_trait]
pub trait PublicKeyStorage: Send + Sync {
    async fn get_public_key(&self, app_id: Option<&str>) -> StorageResult<Option<String>>;

    async fn get_private_key(&self, app_id: Option<&str>) -> StorageResult<Option<String>>;

    /// Never not-found: falls back to [`DEFAULT_ENCRYPTION_ALGORITHM`].
    ///
    /// [`DEFAULT_ENCRYPTION_ALGORITHM`]: crate::db::models::DEFAULT_ENCRYPTION_ALGORITHM
    async fn get_encryption_algorithm(&self, app_id: Option<&str>) -> StorageResult<String>;

    /// Upsert the per-client record, or the global one when `app_id` is `None`.
    async fn set_keys(
        &self,
        app_id: Option<&str>,
        public_key: &str,
        private_key: &str,
        encryption_algorithm: Option<&str>,
    ) -> StorageResult<()>;
}

/// Keys used to verify JWT-bearer assertions.
#[async_trait]
pub trait JwtBearerStorage: Send + Sync {
    async fn get_client_key(&self, app_id: &str, subject: &str) -> StorageResult<ClientKeyLookup>;

    async fn set_client_key(
        &self,
        app_id: &str,
        key: &str,
        subject: Option<&str>,
    ) -> StorageResult<()>;
}

/// Scope validation and defaults.
#[async_trait]
pub trait ScopeStorage: Send + Sync {
    /// Whether every space-separated scope is in the global supported set.
    async fn scope_exists(&self, scope: &str) -> StorageResult<bool>;

    /// The client's default scope, else the global default.
    /// The client's default scope, or the global one when the client has
    /// none or an empty one.
    async fn get_default_scope(&self, app_id: Option<&str>) -> StorageResult<Option<String>>;

    async fn set_scope(
        &self,
        scope: &str,
        app_id: Option<&str>,
        scope_type: ScopeType,
    ) -> StorageResult<()>;
}

/// JWT assertion replay protection. Optional: callers must expect
/// [`StorageError::Unimplemented`](crate::error::StorageError::Unimplemented).
#[async_trait]
pub trait JtiStorage: Send + Sync {
    async fn get_jti(
        &self,
        app_id: &str,
        subject: &str,
        audience: &str,
        expiration: i64,
        jti: &str,
    ) -> StorageResult<Option<Jti>>;

    async fn set_jti(&self, jti: &Jti) -> StorageResult<()>;
}
